use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::ClientResult;

const SESSION_FILE: &str = "session.json";

/// Persistent home of the bearer token.
///
/// Reads are synchronous because they happen on every outgoing request;
/// implementations cache the value in memory and write through on change.
pub trait TokenStore: Send + Sync + 'static {
    fn token(&self) -> Option<String>;

    fn set_token(&self, token: &str) -> ClientResult<()>;

    fn clear(&self) -> ClientResult<()>;
}

/// Token store that lives only as long as the process. Useful for tests.
#[derive(Default)]
pub struct InMemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl TokenStore for InMemoryTokenStore {
    fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn set_token(&self, token: &str) -> ClientResult<()> {
        *self.token.write() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> ClientResult<()> {
        *self.token.write() = None;
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    token: Option<String>,
}

/// JSON file-backed token store at `<config_dir>/chatline/session.json`.
pub struct FileTokenStore {
    file_path: PathBuf,
    cached: RwLock<Option<String>>,
}

impl FileTokenStore {
    pub fn new() -> ClientResult<Self> {
        Ok(Self::with_path(ClientConfig::app_dir()?.join(SESSION_FILE)))
    }

    /// Create a store with a custom path (for testing)
    pub fn with_path(file_path: PathBuf) -> Self {
        let cached = read_session(&file_path);
        Self {
            file_path,
            cached: RwLock::new(cached),
        }
    }

    fn write(&self, token: Option<&str>) -> ClientResult<()> {
        let data = SessionFile {
            token: token.map(str::to_string),
        };
        let json = serde_json::to_string_pretty(&data)?;

        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write atomically using temp file + rename
        let temp_path = self
            .file_path
            .with_extension(format!("json.{}.tmp", std::process::id()));
        std::fs::write(&temp_path, json)?;
        std::fs::rename(&temp_path, &self.file_path)?;
        Ok(())
    }
}

fn read_session(path: &Path) -> Option<String> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = ?e, "Failed to read session file");
            return None;
        }
    };

    match serde_json::from_str::<SessionFile>(&contents) {
        Ok(file) => file.token.filter(|t| !t.is_empty()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring corrupt session file");
            None
        }
    }
}

impl TokenStore for FileTokenStore {
    fn token(&self) -> Option<String> {
        self.cached.read().clone()
    }

    fn set_token(&self, token: &str) -> ClientResult<()> {
        self.write(Some(token))?;
        *self.cached.write() = Some(token.to_string());
        debug!(path = %self.file_path.display(), "Session token stored");
        Ok(())
    }

    fn clear(&self) -> ClientResult<()> {
        // Drop the in-memory copy first so a failed write still logs the user out.
        *self.cached.write() = None;
        if self.file_path.exists() {
            self.write(None)?;
        }
        Ok(())
    }
}
