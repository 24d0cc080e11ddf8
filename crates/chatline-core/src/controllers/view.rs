use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::events::ChatEvent;
use crate::models::{Message, SendOptions, SessionState};

/// The one in-flight generation of a view.
#[derive(Debug)]
pub(crate) struct ActiveSession {
    pub id: u64,
    pub cancel: CancellationToken,
    pub target_message_id: String,
    /// Everything received so far; written into the target as a whole.
    pub buffer: String,
    /// Conversation the request was sent against.
    pub conversation_id: Option<String>,
    /// Id the server assigned to a conversation this session created.
    pub new_conversation_id: Option<String>,
}

/// State of one conversation view, always accessed under the controller lock.
#[derive(Debug, Default)]
pub struct ConversationView {
    pub(crate) conversation_id: Option<String>,
    pub(crate) messages: Vec<Message>,
    pub(crate) state: SessionState,
    pub(crate) active: Option<ActiveSession>,
    pub(crate) last_error: Option<String>,
    pub(crate) last_options: SendOptions,
    /// Bumped by every operation that replaces the transcript, so a
    /// conversation load that finishes late can tell it was superseded.
    pub(crate) load_seq: u64,
}

/// Read-only copy of a view for rendering and inspection.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewSnapshot {
    pub conversation_id: Option<String>,
    pub messages: Vec<Message>,
    pub state: SessionState,
    pub last_error: Option<String>,
}

impl ConversationView {
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            conversation_id: self.conversation_id.clone(),
            messages: self.messages.clone(),
            state: self.state,
            last_error: self.last_error.clone(),
        }
    }

    pub(crate) fn is_current(&self, session_id: u64) -> bool {
        self.active.as_ref().is_some_and(|s| s.id == session_id)
    }

    /// Move to `to` if the transition table allows it.
    pub(crate) fn transition(&mut self, to: SessionState, events: &broadcast::Sender<ChatEvent>) -> bool {
        let from = self.state;
        if from == to {
            return true;
        }
        if !from.can_transition_to(to) {
            warn!(%from, %to, "Ignoring invalid session state transition");
            return false;
        }
        self.state = to;
        let _ = events.send(ChatEvent::StateChanged { from, to });
        true
    }

    pub(crate) fn push(&mut self, message: Message, events: &broadcast::Sender<ChatEvent>) {
        self.messages.push(message.clone());
        let _ = events.send(ChatEvent::MessageAppended { message });
    }

    /// Replace the content of `id` in one step.
    pub(crate) fn set_content(
        &mut self,
        id: &str,
        content: String,
        events: &broadcast::Sender<ChatEvent>,
    ) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            message.content = content.clone();
            let _ = events.send(ChatEvent::MessageUpdated {
                id: id.to_string(),
                content,
                is_streaming: message.is_streaming,
            });
        }
    }

    pub(crate) fn finish_streaming(&mut self, id: &str, events: &broadcast::Sender<ChatEvent>) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id)
            && message.is_streaming
        {
            message.is_streaming = false;
            let _ = events.send(ChatEvent::MessageUpdated {
                id: id.to_string(),
                content: message.content.clone(),
                is_streaming: false,
            });
        }
    }

    /// Swap the whole transcript.
    pub(crate) fn replace(
        &mut self,
        conversation_id: Option<String>,
        messages: Vec<Message>,
        events: &broadcast::Sender<ChatEvent>,
    ) {
        self.load_seq += 1;
        self.conversation_id = conversation_id.clone();
        self.messages = messages.clone();
        self.last_error = None;
        if self.state == SessionState::Errored {
            self.transition(SessionState::Idle, events);
        }
        let _ = events.send(ChatEvent::MessagesReplaced {
            conversation_id,
            messages,
        });
    }
}
