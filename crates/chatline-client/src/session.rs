use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::error::ClientResult;
use crate::jwt::{self, UserProfile};
use crate::token_store::TokenStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user asked to sign out.
    UserRequested,
    /// The backend answered 401 to some request.
    Unauthorized,
}

/// Authentication lifecycle notifications.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    LoggedIn { user: Option<UserProfile> },
    LoggedOut { reason: LogoutReason },
}

/// Explicit authentication context shared by the HTTP client and the stream
/// controller. Replaces process-wide token state: whoever needs the token or
/// wants to hear about logouts gets a handle to this object.
pub struct SessionContext {
    store: Arc<dyn TokenStore>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionContext {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self { store, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn token(&self) -> Option<String> {
        self.store.token()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some_and(|t| !jwt::is_token_expired(&t))
    }

    /// Profile derived from the current token's claims.
    pub fn current_user(&self) -> Option<UserProfile> {
        let token = self.token()?;
        let claims = jwt::parse_claims(&token)?;
        Some(UserProfile::from_claims(&claims))
    }

    pub fn set_token(&self, token: &str) -> ClientResult<()> {
        self.store.set_token(token)?;
        let user = self.current_user();
        info!(user = ?user.as_ref().map(|u| &u.name), "Signed in");
        let _ = self.events.send(SessionEvent::LoggedIn { user });
        Ok(())
    }

    pub fn logout(&self) -> ClientResult<()> {
        self.store.clear()?;
        let _ = self.events.send(SessionEvent::LoggedOut {
            reason: LogoutReason::UserRequested,
        });
        Ok(())
    }

    /// Drop the token after the backend rejected it. Never fails: a storage
    /// error is logged and the logout is still published.
    pub fn force_logout(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = ?e, "Failed to clear stored token after 401");
        }
        warn!("Session rejected by server, logging out");
        let _ = self.events.send(SessionEvent::LoggedOut {
            reason: LogoutReason::Unauthorized,
        });
    }
}
