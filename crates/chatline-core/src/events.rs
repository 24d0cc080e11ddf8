use crate::models::{ConversationSummary, Message, SessionState};

/// Capacity of the view's event feed. A subscriber that falls further
/// behind than this gets `RecvError::Lagged` and should re-read the snapshot.
pub const EVENT_FEED_CAPACITY: usize = 256;

/// Events emitted by the chat view for decoupled rendering.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    MessageAppended {
        message: Message,
    },
    /// Content of an existing message was replaced as a whole.
    MessageUpdated {
        id: String,
        content: String,
        is_streaming: bool,
    },
    /// The whole transcript was swapped (conversation load, new chat).
    MessagesReplaced {
        conversation_id: Option<String>,
        messages: Vec<Message>,
    },
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// A conversation created by the last generation became the selected one.
    ConversationAdopted {
        conversation_id: String,
    },
    ConversationsRefreshed {
        conversations: Vec<ConversationSummary>,
    },
    /// Server-reported error inside an otherwise healthy stream.
    StreamErrorReported {
        detail: String,
    },
}
