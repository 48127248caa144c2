use std::sync::{Arc, Mutex};

use {
    courier_api::{
        CallbackQuery, Message, Method, Update, UpdateKind, UpdateType, methods::SendMessage,
    },
    courier_client::{Client, RequestInfo},
    tokio_util::sync::CancellationToken,
};

use crate::error::{Error, Result};

/// Per-update handle passed to handlers.
///
/// Clones share the same update and request log. Calls made through
/// [`Context::send`] are recorded as [`RequestInfo`]s.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    update: Update,
    client: Client,
    cancel: CancellationToken,
    requests: Mutex<Vec<RequestInfo>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("update_id", &self.inner.update.update_id)
            .field("update_type", &self.update_type())
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(update: Update, client: Client, cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                update,
                client,
                cancel,
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn update(&self) -> &Update {
        &self.inner.update
    }

    pub fn update_id(&self) -> i64 {
        self.inner.update.update_id
    }

    pub fn update_type(&self) -> UpdateType {
        self.inner.update.update_type()
    }

    pub fn message(&self) -> Option<&Message> {
        self.inner.update.message()
    }

    pub fn callback_query(&self) -> Option<&CallbackQuery> {
        match &self.inner.update.kind {
            UpdateKind::CallbackQuery(query) => Some(query),
            _ => None,
        }
    }

    /// Command name without the leading `/` or `@mention`.
    pub fn command(&self) -> Option<&str> {
        self.message()?.command().map(|token| token.name)
    }

    /// Text following the command token, trimmed at the start.
    pub fn command_args(&self) -> Option<&str> {
        self.message()?.command().map(|token| token.args)
    }

    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    /// Cancelled when the dispatcher shuts down. Long-running handlers should
    /// select on it.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    pub async fn send<M: Method>(&self, method: &M) -> courier_client::Result<M::Output> {
        let (result, info) = self.inner.client.send_traced(method).await;
        self.record(info);
        result
    }

    pub async fn send_raw(
        &self,
        method: &str,
        body: &impl serde::Serialize,
    ) -> courier_client::Result<serde_json::Value> {
        let (result, info) = self.inner.client.send_raw_traced(method, body).await;
        self.record(info);
        result
    }

    /// Send a text message to the chat the update came from, in the same
    /// topic thread.
    pub async fn reply(&self, text: impl Into<String>) -> Result<Message> {
        let origin = self
            .message()
            .or_else(|| self.callback_query().and_then(|q| q.message.as_ref()))
            .ok_or_else(|| {
                Error::message(format!(
                    "update {} ({}) has no chat to reply to",
                    self.update_id(),
                    self.update_type()
                ))
            })?;

        let mut request = SendMessage::new(origin.chat.id, text);
        request.message_thread_id = origin.message_thread_id;
        Ok(self.send(&request).await?)
    }

    /// Snapshot of the calls made through this context so far.
    pub fn requests(&self) -> Vec<RequestInfo> {
        self.inner
            .requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record(&self, info: RequestInfo) {
        self.inner
            .requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(info);
    }
}
