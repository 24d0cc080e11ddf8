use std::cmp::Reverse;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::view::ConversationView;
use crate::events::ChatEvent;
use crate::models::{ConversationSummary, Message, Role, Turn};
use crate::repositories::{ConversationStore, StoreResult};

/// Keeps the local picture of the conversation list in line with the store
/// and turns persisted turns into transcript messages.
#[derive(Clone)]
pub struct ConversationReconciler {
    store: Arc<dyn ConversationStore>,
    summaries: Arc<Mutex<Vec<ConversationSummary>>>,
    events: broadcast::Sender<ChatEvent>,
}

impl ConversationReconciler {
    pub fn new(store: Arc<dyn ConversationStore>, events: broadcast::Sender<ChatEvent>) -> Self {
        Self {
            store,
            summaries: Arc::new(Mutex::new(Vec::new())),
            events,
        }
    }

    /// Flatten turns into messages: `<id>-user`, then `<id>-ai` when the
    /// turn has a non-empty reply.
    pub fn expand(turns: &[Turn]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(turns.len() * 2);
        for turn in turns {
            messages.push(Message {
                id: format!("{}-user", turn.id),
                role: Role::User,
                content: turn.user.clone(),
                is_streaming: false,
                created_at: turn.created_at,
            });

            if let Some(reply) = turn.assistant.as_deref().filter(|r| !r.is_empty()) {
                messages.push(Message {
                    id: format!("{}-ai", turn.id),
                    role: Role::Assistant,
                    content: reply.to_string(),
                    is_streaming: false,
                    created_at: turn.created_at,
                });
            }
        }
        messages
    }

    /// Select a conversation the server just created, keeping the streamed
    /// messages as they are. Only applies to a view with nothing selected.
    pub fn adopt_new_conversation_id(&self, view: &mut ConversationView, id: &str) -> bool {
        if view.conversation_id.is_some() {
            debug!(conv_id = %id, "View already has a conversation, not adopting");
            return false;
        }

        info!(conv_id = %id, "Adopting newly created conversation");
        view.conversation_id = Some(id.to_string());
        let _ = self.events.send(ChatEvent::ConversationAdopted {
            conversation_id: id.to_string(),
        });
        true
    }

    /// Re-fetch the summary list, most recent first.
    pub async fn refresh_list(&self) -> StoreResult<Vec<ConversationSummary>> {
        let mut list = self.store.list().await?;
        list.sort_by_key(|c| Reverse(c.updated_at));

        *self.summaries.lock() = list.clone();
        debug!(count = list.len(), "Conversation list refreshed");
        let _ = self.events.send(ChatEvent::ConversationsRefreshed {
            conversations: list.clone(),
        });
        Ok(list)
    }

    /// Summaries as of the last refresh.
    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.summaries.lock().clone()
    }

    pub async fn load_messages(&self, id: &str) -> StoreResult<Vec<Message>> {
        let turns = self.store.fetch_turns(id).await?;
        Ok(Self::expand(&turns))
    }

    pub async fn rename(&self, id: &str, title: &str) -> StoreResult<String> {
        self.store.rename(id, title).await
    }

    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        self.store.delete(id).await
    }

    pub async fn delete_all(&self) -> StoreResult<()> {
        self.store.delete_all().await
    }
}
