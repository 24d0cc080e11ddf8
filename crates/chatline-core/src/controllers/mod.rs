pub mod conversation_reconciler;
pub mod stream_controller;
pub mod view;

pub use conversation_reconciler::ConversationReconciler;
pub use stream_controller::{
    FAILURE_NOTICE, RejectReason, StartOutcome, StreamSessionController, StreamTask,
};
pub use view::{ConversationView, ViewSnapshot};
