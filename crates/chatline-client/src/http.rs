use std::sync::Arc;

use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::session::SessionContext;

const MAX_DETAIL_LEN: usize = 500;

/// Authenticated HTTP client for the chat backend.
///
/// Every request built through [`ApiClient::request`] carries the current
/// bearer token. Every response passes through one check: a 401 clears the
/// session and publishes a logout, any other non-2xx becomes
/// [`ClientError::Status`] with the server's `detail` message.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    session: Arc<SessionContext>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: Arc<SessionContext>) -> ClientResult<Self> {
        config.validate()?;
        // No overall timeout: generation streams stay open for as long as the
        // model keeps talking. Stalls are handled by the stream idle timeout.
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            http,
            config: Arc::new(config),
            session,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Start a request against `path` with the bearer token attached.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.config.url(path));
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and apply the shared status handling.
    pub async fn send(&self, builder: RequestBuilder) -> ClientResult<Response> {
        let response = builder.send().await?;
        self.check_status(response).await
    }

    async fn check_status(&self, response: Response) -> ClientResult<Response> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            debug!(url = %response.url(), "Request rejected with 401");
            self.session.force_logout();
            return Err(ClientError::Unauthorized);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = extract_detail(&body, status);
            warn!(status = %status, detail = %detail, "Request failed");
            return Err(ClientError::Status { status, detail });
        }

        Ok(response)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let response = self.send(self.request(Method::GET, path)).await?;
        Ok(response.json().await?)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(self.request(Method::POST, path).json(body))
            .await?;
        Ok(response.json().await?)
    }

    /// POST whose response body is irrelevant.
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ClientResult<()> {
        self.send(self.request(Method::POST, path).json(body))
            .await?;
        Ok(())
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(self.request(Method::PUT, path).json(body))
            .await?;
        Ok(response.json().await?)
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ClientResult<()> {
        self.send(self.request(Method::PUT, path).json(body))
            .await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> ClientResult<()> {
        self.send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    /// Open a chunked event-stream response. The caller owns the body.
    pub async fn open_stream<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<Response> {
        let builder = self
            .request(Method::POST, path)
            .header(ACCEPT, "text/event-stream")
            .json(body);
        self.send(builder).await
    }
}

/// Pull a human-readable message out of an error body. The backend reports
/// failures as `{"detail": ...}` where `detail` is a string or a list of
/// validation errors.
fn extract_detail(body: &str, status: StatusCode) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").cloned())
        .map(|d| match d {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .unwrap_or_else(|| body.trim().to_string());

    if detail.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string();
    }

    if detail.chars().count() > MAX_DETAIL_LEN {
        detail.chars().take(MAX_DETAIL_LEN).collect()
    } else {
        detail
    }
}
