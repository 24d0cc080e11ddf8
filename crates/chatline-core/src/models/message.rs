use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One bubble of the transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    fn local_id() -> String {
        format!("local-{}", uuid::Uuid::new_v4())
    }

    /// Optimistic user entry, shown before the server has seen it.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Self::local_id(),
            role: Role::User,
            content: content.into(),
            is_streaming: false,
            created_at: None,
        }
    }

    /// Empty assistant entry that a stream session grows in place.
    pub fn assistant_placeholder() -> Self {
        Self {
            id: Self::local_id(),
            role: Role::Assistant,
            content: String::new(),
            is_streaming: true,
            created_at: None,
        }
    }

    /// Finished assistant entry produced locally (e.g. a failure notice).
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Self::local_id(),
            role: Role::Assistant,
            content: content.into(),
            is_streaming: false,
            created_at: None,
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}
