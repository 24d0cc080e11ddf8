use super::error::StoreResult;
use crate::models::{ConversationSummary, Turn};
use crate::stream::BoxFuture;

/// Remotely persisted conversations, as seen by the client.
pub trait ConversationStore: Send + Sync + 'static {
    /// Summary list for the sidebar (no turn history).
    fn list(&self) -> BoxFuture<'static, StoreResult<Vec<ConversationSummary>>>;

    /// Turn history of one conversation, oldest first.
    fn fetch_turns(&self, id: &str) -> BoxFuture<'static, StoreResult<Vec<Turn>>>;

    /// Returns the title the server settled on.
    fn rename(&self, id: &str, title: &str) -> BoxFuture<'static, StoreResult<String>>;

    fn delete(&self, id: &str) -> BoxFuture<'static, StoreResult<()>>;

    fn delete_all(&self) -> BoxFuture<'static, StoreResult<()>>;
}
