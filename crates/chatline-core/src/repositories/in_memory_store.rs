use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::conversation_store::ConversationStore;
use super::error::{StoreError, StoreResult};
use crate::models::{ConversationSummary, Turn};
use crate::stream::BoxFuture;

#[derive(Clone)]
struct StoredConversation {
    summary: ConversationSummary,
    turns: Vec<Turn>,
}

/// In-memory conversation store
/// Useful for testing and offline development
#[derive(Clone, Default)]
pub struct InMemoryConversationStore {
    conversations: Arc<Mutex<HashMap<String, StoredConversation>>>,
    list_calls: Arc<AtomicUsize>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, summary: ConversationSummary, turns: Vec<Turn>) {
        self.conversations
            .lock()
            .insert(summary.id.clone(), StoredConversation { summary, turns });
    }

    /// How many times the summary list was requested.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn list(&self) -> BoxFuture<'static, StoreResult<Vec<ConversationSummary>>> {
        let conversations = self.conversations.clone();
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        Box::pin(async move {
            let store = conversations.lock();
            let mut result: Vec<ConversationSummary> =
                store.values().map(|c| c.summary.clone()).collect();

            // Sort by updated_at descending
            result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

            Ok(result)
        })
    }

    fn fetch_turns(&self, id: &str) -> BoxFuture<'static, StoreResult<Vec<Turn>>> {
        let conversations = self.conversations.clone();
        let id = id.to_string();

        Box::pin(async move {
            let store = conversations.lock();
            store
                .get(&id)
                .map(|c| c.turns.clone())
                .ok_or(StoreError::NotFound { id })
        })
    }

    fn rename(&self, id: &str, title: &str) -> BoxFuture<'static, StoreResult<String>> {
        let conversations = self.conversations.clone();
        let id = id.to_string();
        let title = title.trim().to_string();

        Box::pin(async move {
            let mut store = conversations.lock();
            let conversation = store.get_mut(&id).ok_or(StoreError::NotFound { id })?;
            conversation.summary.title = title.clone();
            Ok(title)
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, StoreResult<()>> {
        let conversations = self.conversations.clone();
        let id = id.to_string();

        Box::pin(async move {
            conversations
                .lock()
                .remove(&id)
                .map(|_| ())
                .ok_or(StoreError::NotFound { id })
        })
    }

    fn delete_all(&self) -> BoxFuture<'static, StoreResult<()>> {
        let conversations = self.conversations.clone();

        Box::pin(async move {
            conversations.lock().clear();
            Ok(())
        })
    }
}
