use std::fmt;

/// Generation lifecycle of one conversation view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing in flight; a send is allowed.
    #[default]
    Idle,
    /// Request issued, no response yet.
    Awaiting,
    /// Response open, events being applied.
    Streaming,
    /// Stop requested; the transport is being torn down.
    Cancelling,
    /// The last generation failed. A send is allowed.
    Errored,
}

impl SessionState {
    pub const ALL: [SessionState; 5] = [
        Self::Idle,
        Self::Awaiting,
        Self::Streaming,
        Self::Cancelling,
        Self::Errored,
    ];

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Awaiting)
                | (Errored, Awaiting)
                | (Errored, Idle)
                | (Awaiting, Streaming)
                | (Awaiting, Cancelling)
                | (Awaiting, Errored)
                | (Awaiting, Idle)
                | (Streaming, Cancelling)
                | (Streaming, Errored)
                | (Streaming, Idle)
                | (Cancelling, Idle)
        )
    }

    /// True while a session owns the view.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Awaiting | Self::Streaming | Self::Cancelling)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Awaiting => "awaiting",
            Self::Streaming => "streaming",
            Self::Cancelling => "cancelling",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::{self, *};

    #[test]
    fn test_transition_table() {
        let allowed = [
            (Idle, Awaiting),
            (Errored, Awaiting),
            (Errored, Idle),
            (Awaiting, Streaming),
            (Awaiting, Cancelling),
            (Awaiting, Errored),
            (Awaiting, Idle),
            (Streaming, Cancelling),
            (Streaming, Errored),
            (Streaming, Idle),
            (Cancelling, Idle),
        ];

        for from in SessionState::ALL {
            for to in SessionState::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_busy_states() {
        assert!(!Idle.is_busy());
        assert!(!Errored.is_busy());
        assert!(Awaiting.is_busy());
        assert!(Streaming.is_busy());
        assert!(Cancelling.is_busy());
    }
}
