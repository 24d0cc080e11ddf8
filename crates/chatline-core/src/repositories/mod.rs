pub mod conversation_store;
pub mod error;
pub mod in_memory_store;
pub mod remote_store;

pub use conversation_store::ConversationStore;
pub use error::{StoreError, StoreResult};
pub use in_memory_store::InMemoryConversationStore;
pub use remote_store::RemoteConversationStore;
