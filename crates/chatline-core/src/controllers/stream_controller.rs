use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chatline_client::ApiClient;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::conversation_reconciler::ConversationReconciler;
use super::view::{ActiveSession, ConversationView, ViewSnapshot};
use crate::events::{ChatEvent, EVENT_FEED_CAPACITY};
use crate::models::{ConversationSummary, Message, SendOptions, SessionState};
use crate::repositories::{ConversationStore, RemoteConversationStore, StoreError, StoreResult};
use crate::stream::{
    BoxFuture, ByteStream, StreamEvent, StreamRequest, StreamTransport, TransportError,
    decode_stream, with_idle_timeout,
};

/// Shown in place of a reply when the generation request failed.
pub const FAILURE_NOTICE: &str = "Error: Failed to generate response.";

/// Why `start` did not begin a session. Nothing in the view was changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// A session is already in flight; stop it first.
    SessionActive,
    EmptyPrompt,
    /// Regenerate target has no user message before it.
    NoPrecedingUserMessage,
    /// Regenerate target is not in the view.
    UnknownMessage,
}

/// Handle to a spawned stream driver.
#[derive(Debug)]
pub struct StreamTask {
    pub session_id: u64,
    handle: JoinHandle<()>,
}

impl StreamTask {
    /// Wait until the driver has finished (completed, failed or been stopped).
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            warn!(session_id = self.session_id, error = %e, "Stream driver task failed");
        }
    }
}

#[derive(Debug)]
pub enum StartOutcome {
    Started(StreamTask),
    Rejected(RejectReason),
}

impl StartOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }

    pub fn into_task(self) -> Option<StreamTask> {
        match self {
            Self::Started(task) => Some(task),
            Self::Rejected(_) => None,
        }
    }
}

struct Shared {
    view: Mutex<ConversationView>,
    transport: Arc<dyn StreamTransport>,
    reconciler: ConversationReconciler,
    events: broadcast::Sender<ChatEvent>,
    idle_timeout: Option<Duration>,
    next_session: AtomicU64,
}

/// Drives generation requests for one conversation view and keeps its
/// transcript consistent with them.
///
/// At most one session is in flight. Every mutation of the view happens
/// under one lock, and a driver only touches the view while its session is
/// still the current one, so a stopped or superseded stream can never write
/// into the transcript again.
#[derive(Clone)]
pub struct StreamSessionController {
    shared: Arc<Shared>,
}

impl StreamSessionController {
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        store: Arc<dyn ConversationStore>,
        idle_timeout: Option<Duration>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_FEED_CAPACITY);
        let reconciler = ConversationReconciler::new(store, events.clone());

        Self {
            shared: Arc::new(Shared {
                view: Mutex::new(ConversationView::default()),
                transport,
                reconciler,
                events,
                idle_timeout,
                next_session: AtomicU64::new(0),
            }),
        }
    }

    /// Controller talking to the chat API for both streams and conversations.
    pub fn from_client(client: ApiClient) -> Self {
        let idle_timeout = client.config().stream_idle_timeout();
        let store = RemoteConversationStore::new(client.clone());
        Self::new(Arc::new(client), Arc::new(store), idle_timeout)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.shared.events.subscribe()
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.shared.view.lock().snapshot()
    }

    pub fn state(&self) -> SessionState {
        self.shared.view.lock().state
    }

    pub fn reconciler(&self) -> &ConversationReconciler {
        &self.shared.reconciler
    }

    /// Send `prompt` into the currently selected conversation (or a new one).
    pub fn send(&self, prompt: &str, options: SendOptions) -> StartOutcome {
        let mut view = self.shared.view.lock();
        let target = view.conversation_id.clone();
        self.begin(&mut view, prompt, options, target)
    }

    /// Begin a generation session. Must be called within a tokio runtime.
    pub fn start(
        &self,
        prompt: &str,
        options: SendOptions,
        target_conversation_id: Option<String>,
    ) -> StartOutcome {
        let mut view = self.shared.view.lock();
        self.begin(&mut view, prompt, options, target_conversation_id)
    }

    /// Ask again with the user message that preceded `message_id`. The new
    /// exchange is appended; the old one stays.
    pub fn regenerate(&self, message_id: &str) -> StartOutcome {
        let mut view = self.shared.view.lock();
        if view.active.is_some() {
            return StartOutcome::Rejected(RejectReason::SessionActive);
        }

        let Some(index) = view.messages.iter().position(|m| m.id == message_id) else {
            return StartOutcome::Rejected(RejectReason::UnknownMessage);
        };
        let Some(prompt) = view.messages[..index]
            .iter()
            .rev()
            .find(|m| m.is_user())
            .map(|m| m.content.clone())
        else {
            return StartOutcome::Rejected(RejectReason::NoPrecedingUserMessage);
        };

        debug!(message_id, "Regenerating response");
        let options = view.last_options;
        let target = view.conversation_id.clone();
        self.begin(&mut view, &prompt, options, target)
    }

    fn begin(
        &self,
        view: &mut ConversationView,
        prompt: &str,
        options: SendOptions,
        target: Option<String>,
    ) -> StartOutcome {
        if view.active.is_some() || view.state.is_busy() {
            debug!(state = %view.state, "Rejecting start while a session is active");
            return StartOutcome::Rejected(RejectReason::SessionActive);
        }
        if prompt.trim().is_empty() {
            return StartOutcome::Rejected(RejectReason::EmptyPrompt);
        }

        let shared = &self.shared;
        let session_id = shared.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let placeholder = Message::assistant_placeholder();
        let target_message_id = placeholder.id.clone();

        // A conversation load still in flight must not overwrite this exchange.
        view.load_seq += 1;
        view.last_error = None;
        view.last_options = options;
        view.push(Message::user(prompt), &shared.events);
        view.push(placeholder, &shared.events);
        view.transition(SessionState::Awaiting, &shared.events);
        view.active = Some(ActiveSession {
            id: session_id,
            cancel: cancel.clone(),
            target_message_id,
            buffer: String::new(),
            conversation_id: target.clone(),
            new_conversation_id: None,
        });

        let request = StreamRequest {
            user_query: prompt.to_string(),
            service_name: options.service.service_name().to_string(),
            conversation_id: target,
        };
        info!(
            session_id,
            service = %options.service,
            conv_id = ?request.conversation_id,
            "Starting stream session"
        );

        let open = shared.transport.open(request);
        let handle = tokio::spawn(drive(shared.clone(), session_id, cancel, open));
        StartOutcome::Started(StreamTask { session_id, handle })
    }

    /// Cancel the in-flight session, keeping whatever content it produced.
    /// Returns with the view idle; calling it with nothing in flight is a no-op.
    pub fn stop(&self) {
        let shared = &self.shared;
        let mut view = shared.view.lock();
        let Some(session) = view.active.take() else {
            return;
        };

        session.cancel.cancel();
        view.finish_streaming(&session.target_message_id, &shared.events);
        view.transition(SessionState::Cancelling, &shared.events);
        view.transition(SessionState::Idle, &shared.events);
        info!(session_id = session.id, "Stream session stopped");
    }

    /// Show the persisted history of `id`. Any in-flight session is stopped.
    /// The selection only moves to `id` once its history has arrived; on
    /// failure the transcript stays empty and the previous selection is kept.
    pub async fn load_conversation(&self, id: &str) -> StoreResult<()> {
        self.stop();
        let seq = {
            let mut view = self.shared.view.lock();
            let current = view.conversation_id.clone();
            view.replace(current, Vec::new(), &self.shared.events);
            view.load_seq
        };

        let messages = match self.shared.reconciler.load_messages(id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(conv_id = %id, error = %e, "Failed to load conversation");
                return Err(e);
            }
        };

        let mut view = self.shared.view.lock();
        if view.load_seq != seq {
            debug!(conv_id = %id, "Discarding superseded conversation load");
            return Ok(());
        }
        debug!(conv_id = %id, count = messages.len(), "Conversation loaded");
        view.replace(Some(id.to_string()), messages, &self.shared.events);
        Ok(())
    }

    /// Empty view with no conversation selected; the next send creates one.
    pub fn new_conversation(&self) {
        self.stop();
        self.shared
            .view
            .lock()
            .replace(None, Vec::new(), &self.shared.events);
    }

    pub async fn refresh_conversations(&self) -> StoreResult<Vec<ConversationSummary>> {
        self.shared.reconciler.refresh_list().await
    }

    pub async fn rename_conversation(&self, id: &str, title: &str) -> StoreResult<String> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::InvalidData {
                message: "Title cannot be empty".to_string(),
            });
        }

        let renamed = self.shared.reconciler.rename(id, title).await?;
        self.refresh_quietly().await;
        Ok(renamed)
    }

    /// Delete `id`; the view is reset when it was showing that conversation.
    pub async fn delete_conversation(&self, id: &str) -> StoreResult<()> {
        self.shared.reconciler.delete(id).await?;

        let is_current = self.shared.view.lock().conversation_id.as_deref() == Some(id);
        if is_current {
            self.new_conversation();
        }
        self.refresh_quietly().await;
        Ok(())
    }

    pub async fn delete_all_conversations(&self) -> StoreResult<()> {
        self.shared.reconciler.delete_all().await?;
        self.new_conversation();
        self.refresh_quietly().await;
        Ok(())
    }

    async fn refresh_quietly(&self) {
        self.shared.refresh_quietly().await;
    }
}

impl Shared {
    async fn refresh_quietly(&self) {
        if let Err(e) = self.reconciler.refresh_list().await {
            warn!(error = %e, "Failed to refresh conversation list");
        }
    }

    /// Apply one decoded event. Returns false once the session is no longer
    /// the current one.
    fn apply(&self, session_id: u64, event: StreamEvent) -> bool {
        let mut guard = self.view.lock();
        let view = &mut *guard;
        if !view.is_current(session_id) {
            return false;
        }
        if view.state == SessionState::Awaiting {
            view.transition(SessionState::Streaming, &self.events);
        }
        let Some(session) = view.active.as_mut() else {
            return false;
        };

        match event {
            StreamEvent::Content { text } => {
                session.buffer.push_str(&text);
                let content = session.buffer.clone();
                let target = session.target_message_id.clone();
                view.set_content(&target, content, &self.events);
            }
            StreamEvent::Metadata {
                conversation_id: Some(id),
            } => {
                if session.conversation_id.is_none() && session.new_conversation_id.is_none() {
                    debug!(session_id, conv_id = %id, "Server assigned conversation id");
                    session.new_conversation_id = Some(id);
                }
            }
            StreamEvent::Metadata {
                conversation_id: None,
            } => {}
            StreamEvent::Error { detail } => {
                warn!(session_id, detail = %detail, "Server reported a stream error");
                view.last_error = Some(detail.clone());
                let _ = self.events.send(ChatEvent::StreamErrorReported { detail });
            }
        }
        true
    }

    fn mark_streaming(&self, session_id: u64) {
        let mut view = self.view.lock();
        if view.is_current(session_id) && view.state == SessionState::Awaiting {
            view.transition(SessionState::Streaming, &self.events);
        }
    }

    /// Clean end of the response body.
    async fn complete(&self, session_id: u64) {
        {
            let mut view = self.view.lock();
            if !view.is_current(session_id) {
                return;
            }
            let Some(session) = view.active.take() else {
                return;
            };

            view.finish_streaming(&session.target_message_id, &self.events);
            view.transition(SessionState::Idle, &self.events);
            if let Some(new_id) = session.new_conversation_id.as_deref() {
                self.reconciler.adopt_new_conversation_id(&mut view, new_id);
            }
            info!(session_id, chars = session.buffer.len(), "Stream session completed");
        }

        self.refresh_quietly().await;
    }

    fn fail(&self, session_id: u64, error: &TransportError) {
        let mut view = self.view.lock();
        if !view.is_current(session_id) {
            debug!(session_id, error = %error, "Ignoring failure of a stopped session");
            return;
        }
        let Some(session) = view.active.take() else {
            return;
        };

        warn!(session_id, error = %error, "Stream session failed");
        view.finish_streaming(&session.target_message_id, &self.events);
        view.push(Message::assistant(FAILURE_NOTICE), &self.events);
        view.last_error = Some(error.to_string());
        view.transition(SessionState::Errored, &self.events);
    }
}

async fn drive(
    shared: Arc<Shared>,
    session_id: u64,
    cancel: CancellationToken,
    open: BoxFuture<'static, Result<ByteStream, TransportError>>,
) {
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        opened = open_within(open, shared.idle_timeout) => opened,
    };

    let body = match opened {
        Ok(body) => body,
        Err(e) => {
            shared.fail(session_id, &e);
            return;
        }
    };
    shared.mark_streaming(session_id);

    let body = match shared.idle_timeout {
        Some(limit) => with_idle_timeout(body, limit),
        None => body,
    };
    let mut events = decode_stream(body);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                if !shared.apply(session_id, event) {
                    return;
                }
            }
            Some(Err(e)) => {
                shared.fail(session_id, &e);
                return;
            }
            None => break,
        }
    }

    shared.complete(session_id).await;
}

async fn open_within<F, T>(open: F, limit: Option<Duration>) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, open)
            .await
            .unwrap_or(Err(TransportError::IdleTimeout(limit))),
        None => open.await,
    }
}
