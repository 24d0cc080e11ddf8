use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use chatline_client::{ApiClient, ClientError};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Raw response body, chunked as it arrives.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Stream read failed: {0}")]
    Read(String),

    #[error("No data received for {0:?}")]
    IdleTimeout(Duration),
}

/// Body of the generation request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StreamRequest {
    pub user_query: String,
    pub service_name: String,
    pub conversation_id: Option<String>,
}

/// Opens generation streams. The HTTP client is the production
/// implementation; tests substitute scripted transports.
pub trait StreamTransport: Send + Sync + 'static {
    /// Resolves once the response headers are in and the status is 2xx.
    fn open(&self, request: StreamRequest) -> BoxFuture<'static, Result<ByteStream, TransportError>>;
}

impl StreamTransport for ApiClient {
    fn open(&self, request: StreamRequest) -> BoxFuture<'static, Result<ByteStream, TransportError>> {
        let client = self.clone();

        Box::pin(async move {
            let path = client.config().endpoints.stream.clone();
            debug!(
                service = %request.service_name,
                conversation_id = ?request.conversation_id,
                "Opening generation stream"
            );
            let response = client.open_stream(&path, &request).await?;

            let body: ByteStream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| TransportError::Read(e.to_string())))
                .boxed();
            Ok(body)
        })
    }
}

/// Fail a body that goes silent for longer than `limit` between chunks.
pub fn with_idle_timeout(mut body: ByteStream, limit: Duration) -> ByteStream {
    async_stream::stream! {
        loop {
            match tokio::time::timeout(limit, body.next()).await {
                Ok(Some(chunk)) => yield chunk,
                Ok(None) => break,
                Err(_) => {
                    yield Err(TransportError::IdleTimeout(limit));
                    break;
                }
            }
        }
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_idle_timeout_ends_silent_body() {
        let body: ByteStream = stream::iter(vec![Ok(Bytes::from_static(b"data: {}\n\n"))])
            .chain(stream::pending())
            .boxed();
        let mut body = with_idle_timeout(body, Duration::from_millis(20));

        assert!(matches!(body.next().await, Some(Ok(_))));
        assert!(matches!(
            body.next().await,
            Some(Err(TransportError::IdleTimeout(_)))
        ));
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_idle_timeout_passes_closed_body_through() {
        let body: ByteStream = stream::iter(vec![Ok(Bytes::from_static(b"abc"))]).boxed();
        let chunks: Vec<_> = with_idle_timeout(body, Duration::from_secs(1))
            .collect()
            .await;
        assert_eq!(chunks.len(), 1);
    }
}
