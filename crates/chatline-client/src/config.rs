use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

const APP_DIR: &str = "chatline";
const CONFIG_FILE: &str = "config.json";
const BASE_URL_ENV: &str = "CHATLINE_API_BASE_URL";

fn default_base_url() -> String {
    "http://0.0.0.0:45001".to_string()
}

fn default_idle_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Backend route table. Paths are relative to `api_base_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub login: String,
    pub signup: String,
    pub forgot_password: String,
    pub reset_password: String,
    pub change_password: String,
    pub stream: String,
    pub conversations: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/auth/login-json".to_string(),
            signup: "/auth/signup".to_string(),
            forgot_password: "/auth/forget-password".to_string(),
            reset_password: "/auth/verify-otp-reset-password".to_string(),
            change_password: "/auth/reset-password".to_string(),
            stream: "/chat/run_pipeline/stream".to_string(),
            conversations: "/chat/conversations".to_string(),
        }
    }
}

impl Endpoints {
    pub fn conversation(&self, id: &str) -> String {
        format!("{}/{}", self.conversations, encode_segment(id))
    }

    pub fn rename_conversation(&self, id: &str) -> String {
        format!("{}/rename", self.conversation(id))
    }
}

fn encode_segment(segment: &str) -> String {
    percent_encoding::utf8_percent_encode(segment, percent_encoding::NON_ALPHANUMERIC).to_string()
}

/// Client settings, persisted as JSON next to the session file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub endpoints: Endpoints,
    /// Longest silence tolerated between two reads of a generation stream.
    /// `0` disables the idle timeout.
    #[serde(default = "default_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_base_url(),
            endpoints: Endpoints::default(),
            stream_idle_timeout_secs: default_idle_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl ClientConfig {
    /// Directory holding the config and session files (`<config_dir>/chatline`).
    pub fn app_dir() -> ClientResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| ClientError::Config {
                message: "Could not determine config directory".to_string(),
            })
    }

    /// Load from the default location, falling back to defaults on first run.
    /// `CHATLINE_API_BASE_URL` overrides the stored base URL.
    pub fn load() -> ClientResult<Self> {
        let path = Self::app_dir()?.join(CONFIG_FILE);
        let mut config = Self::load_from(&path)?;
        if let Ok(url) = std::env::var(BASE_URL_ENV)
            && !url.trim().is_empty()
        {
            debug!(url = %url, "Using API base URL from environment");
            config.api_base_url = url;
        }
        Ok(config)
    }

    pub fn load_from(path: &Path) -> ClientResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Config file is not valid JSON");
            ClientError::Config {
                message: format!("{}: {}", path.display(), e),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClientResult<()> {
        let url = self.api_base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ClientError::Config {
                message: format!("api_base_url must be an http(s) URL, got '{}'", url),
            });
        }
        Ok(())
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }

    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        (self.stream_idle_timeout_secs > 0).then(|| Duration::from_secs(self.stream_idle_timeout_secs))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_backend_routes() {
        let config = ClientConfig::default();
        assert_eq!(config.api_base_url, "http://0.0.0.0:45001");
        assert_eq!(config.endpoints.stream, "/chat/run_pipeline/stream");
        assert_eq!(config.stream_idle_timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_conversation_paths_encode_id() {
        let endpoints = Endpoints::default();
        assert_eq!(endpoints.conversation("abc"), "/chat/conversations/abc");
        assert_eq!(
            endpoints.rename_conversation("a/b"),
            "/chat/conversations/a%2Fb/rename"
        );
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let config = ClientConfig {
            api_base_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.url("/chat"), "http://localhost:8000/chat");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"api_base_url":"https://chat.example.com","stream_idle_timeout_secs":0}"#,
        )
        .unwrap();

        let config = ClientConfig::load_from(&path).unwrap();
        assert_eq!(config.api_base_url, "https://chat.example.com");
        assert_eq!(config.stream_idle_timeout(), None);
        assert_eq!(config.endpoints, Endpoints::default());
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"api_base_url":"ftp://nope"}"#).unwrap();

        assert!(matches!(
            ClientConfig::load_from(&path),
            Err(ClientError::Config { .. })
        ));
    }
}
