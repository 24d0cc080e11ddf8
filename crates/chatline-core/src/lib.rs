//! Streaming response consumer: decodes the generation stream, drives one
//! session per conversation view and reconciles it with the stored list.

pub mod controllers;
pub mod events;
pub mod models;
pub mod repositories;
pub mod stream;

pub use controllers::{
    ConversationReconciler, ConversationView, FAILURE_NOTICE, RejectReason, StartOutcome,
    StreamSessionController, StreamTask, ViewSnapshot,
};
pub use events::ChatEvent;
pub use models::{
    ConversationSummary, Message, Role, SendOptions, ServiceSelector, SessionState, Turn,
};
pub use repositories::{
    ConversationStore, InMemoryConversationStore, RemoteConversationStore, StoreError,
    StoreResult,
};
pub use stream::{FrameDecoder, StreamEvent, StreamTransport, TransportError};
