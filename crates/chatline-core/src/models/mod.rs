pub mod conversation;
pub mod message;
pub mod service;
pub mod session_state;

pub use conversation::{ConversationDetail, ConversationSummary, Turn};
pub use message::{Message, Role};
pub use service::{SendOptions, ServiceSelector};
pub use session_state::SessionState;
