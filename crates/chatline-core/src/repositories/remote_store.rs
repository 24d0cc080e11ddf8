use chatline_client::{ApiClient, ClientError};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::conversation_store::ConversationStore;
use super::error::{StoreError, StoreResult};
use crate::models::{ConversationDetail, ConversationSummary, Turn};
use crate::stream::BoxFuture;

#[derive(Serialize)]
struct RenameRequest<'a> {
    title: &'a str,
}

#[derive(Deserialize)]
struct RenameResponse {
    #[serde(default)]
    title: Option<String>,
}

/// Conversation store backed by the chat REST API.
#[derive(Clone)]
pub struct RemoteConversationStore {
    client: ApiClient,
}

impl RemoteConversationStore {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

fn not_found_as(id: &str, err: ClientError) -> StoreError {
    match err.status() {
        Some(StatusCode::NOT_FOUND) => StoreError::NotFound { id: id.to_string() },
        _ => StoreError::Client(err),
    }
}

impl ConversationStore for RemoteConversationStore {
    fn list(&self) -> BoxFuture<'static, StoreResult<Vec<ConversationSummary>>> {
        let client = self.client.clone();

        Box::pin(async move {
            let path = client.config().endpoints.conversations.clone();
            let list: Vec<ConversationSummary> = client.get_json(&path).await?;
            debug!(count = list.len(), "Fetched conversation list");
            Ok(list)
        })
    }

    fn fetch_turns(&self, id: &str) -> BoxFuture<'static, StoreResult<Vec<Turn>>> {
        let client = self.client.clone();
        let id = id.to_string();

        Box::pin(async move {
            let path = client.config().endpoints.conversation(&id);
            let detail: ConversationDetail = client
                .get_json(&path)
                .await
                .map_err(|e| not_found_as(&id, e))?;
            Ok(detail.messages)
        })
    }

    fn rename(&self, id: &str, title: &str) -> BoxFuture<'static, StoreResult<String>> {
        let client = self.client.clone();
        let id = id.to_string();
        let title = title.to_string();

        Box::pin(async move {
            let path = client.config().endpoints.rename_conversation(&id);
            let response: RenameResponse = client
                .put_json(&path, &RenameRequest { title: &title })
                .await
                .map_err(|e| not_found_as(&id, e))?;
            Ok(response.title.unwrap_or(title))
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, StoreResult<()>> {
        let client = self.client.clone();
        let id = id.to_string();

        Box::pin(async move {
            let path = client.config().endpoints.conversation(&id);
            client
                .delete(&path)
                .await
                .map_err(|e| not_found_as(&id, e))
        })
    }

    fn delete_all(&self) -> BoxFuture<'static, StoreResult<()>> {
        let client = self.client.clone();

        Box::pin(async move {
            let path = client.config().endpoints.conversations.clone();
            client.delete(&path).await?;
            Ok(())
        })
    }
}
