//! Client side of the chat backend: configuration, the session context that
//! owns the bearer token, and the authenticated HTTP client.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod jwt;
pub mod session;
pub mod token_store;

pub use config::{ClientConfig, Endpoints};
pub use error::{ClientError, ClientResult};
pub use http::ApiClient;
pub use jwt::UserProfile;
pub use session::{LogoutReason, SessionContext, SessionEvent};
pub use token_store::{FileTokenStore, InMemoryTokenStore, TokenStore};
