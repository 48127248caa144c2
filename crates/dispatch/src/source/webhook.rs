use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        body::Bytes,
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::post,
    },
    courier_api::{InputFile, RawUpdate, Update, UpdateError, UpdateType, methods::SetWebhook},
    courier_client::Client,
    secrecy::{ExposeSecret, Secret},
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use courier_metrics::{counter, dispatch as dispatch_metrics, webhook as webhook_metrics};

use crate::error::{ConfigError, Error, Result};

/// Header carrying the shared secret on every delivery.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Webhook receiver settings.
#[derive(Debug, Clone)]
pub struct Webhook {
    /// Public base URL the service calls, e.g. `https://bot.example.com:8443`.
    /// When it has no path, [`Webhook::handle_path`] is appended.
    pub url: String,
    /// Path the listener serves.
    pub path: String,
    pub listen_addr: SocketAddr,
    pub secret_token: Option<Secret<String>>,
    /// Self-signed certificate to upload with the registration.
    pub certificate: Option<InputFile>,
    pub ip_address: Option<String>,
    pub max_connections: Option<u32>,
    pub drop_pending_updates: bool,
    /// How long shutdown waits for in-flight deliveries.
    pub shutdown_grace: Duration,
}

impl Webhook {
    pub fn new(url: impl Into<String>, listen_addr: SocketAddr) -> Self {
        Self {
            url: url.into(),
            path: "/".to_string(),
            listen_addr,
            secret_token: None,
            certificate: None,
            ip_address: None,
            max_connections: None,
            drop_pending_updates: false,
            shutdown_grace: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn secret_token(mut self, secret: impl Into<String>) -> Self {
        self.secret_token = Some(Secret::new(secret.into()));
        self
    }

    /// The served path, always starting with `/`.
    pub fn handle_path(&self) -> String {
        if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        }
    }

    /// The URL registered with the service. Default ports are dropped.
    pub fn webhook_url(&self) -> std::result::Result<String, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidWebhookUrl {
            url: self.url.clone(),
            reason,
        };
        let mut url = url::Url::parse(&self.url).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
        }
        if url.path() == "/" {
            url.set_path(&self.handle_path());
        }
        Ok(url.to_string())
    }

    pub(crate) fn router(&self, queue: mpsc::Sender<Update>) -> Router {
        let state = Arc::new(WebhookState {
            queue,
            secret_token: self.secret_token.clone(),
        });
        Router::new()
            .route(&self.handle_path(), post(deliver))
            .with_state(state)
    }

    /// Register the webhook, then serve deliveries until `cancel` fires.
    ///
    /// The socket is bound before registering so the service never calls an
    /// address nobody listens on.
    pub(crate) async fn receive(
        &self,
        client: &Client,
        allowed_updates: Vec<UpdateType>,
        cancel: CancellationToken,
        queue: mpsc::Sender<Update>,
    ) -> Result<()> {
        let url = self.webhook_url()?;
        let addr = self.listen_addr;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Listener { addr, source })?;

        client
            .send(&SetWebhook {
                url: url.clone(),
                certificate: self.certificate.clone(),
                ip_address: self.ip_address.clone(),
                max_connections: self.max_connections,
                allowed_updates: (!allowed_updates.is_empty()).then_some(allowed_updates),
                drop_pending_updates: self.drop_pending_updates.then_some(true),
                secret_token: self
                    .secret_token
                    .as_ref()
                    .map(|s| s.expose_secret().clone()),
            })
            .await?;
        info!(%addr, path = %self.handle_path(), %url, "webhook listening");

        let shutdown = {
            let cancel = cancel.clone();
            async move { cancel.cancelled().await }
        };
        let mut serve = std::pin::pin!(
            axum::serve(listener, self.router(queue))
                .with_graceful_shutdown(shutdown)
                .into_future()
        );

        tokio::select! {
            served = &mut serve => return served.map_err(|source| Error::Listener { addr, source }),
            () = cancel.cancelled() => {},
        }

        match tokio::time::timeout(self.shutdown_grace, serve).await {
            Ok(served) => served.map_err(|source| Error::Listener { addr, source })?,
            Err(_) => warn!(
                grace_secs = self.shutdown_grace.as_secs(),
                "webhook deliveries still in flight after grace period"
            ),
        }
        info!(%addr, "webhook listener stopped");
        Ok(())
    }
}

struct WebhookState {
    queue: mpsc::Sender<Update>,
    secret_token: Option<Secret<String>>,
}

fn malformed(error: &dyn std::fmt::Display, bytes: usize) -> StatusCode {
    warn!(error = %error, bytes, "malformed webhook body");
    #[cfg(feature = "metrics")]
    counter!(webhook_metrics::REJECTED_TOTAL, "reason" => "malformed").increment(1);
    StatusCode::BAD_REQUEST
}

async fn deliver(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(expected) = &state.secret_token {
        let provided = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected.expose_secret().as_str()) {
            warn!("webhook delivery rejected: secret token mismatch");
            #[cfg(feature = "metrics")]
            counter!(webhook_metrics::REJECTED_TOTAL, "reason" => "secret").increment(1);
            return StatusCode::UNAUTHORIZED;
        }
    }

    let raw: RawUpdate = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => return malformed(&e, body.len()),
    };
    let update = match raw.classify() {
        Ok(update) => update,
        // Acknowledged so the service does not redeliver a kind this build
        // cannot route anyway.
        Err(e @ UpdateError::UnknownKind { .. }) => {
            warn!(error = %e, "dropping webhook update of unknown kind");
            #[cfg(feature = "metrics")]
            counter!(dispatch_metrics::UPDATES_DROPPED_TOTAL, "update_type" => "unknown")
                .increment(1);
            return StatusCode::OK;
        },
        Err(e) => return malformed(&e, body.len()),
    };

    let update_id = update.update_id;
    // Holding the reply while the queue is full pushes back on the service.
    if state.queue.send(update).await.is_err() {
        debug!(update_id, "update queue closed, refusing delivery");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    #[cfg(feature = "metrics")]
    counter!(dispatch_metrics::UPDATES_RECEIVED_TOTAL, "source" => "webhook").increment(1);
    debug!(update_id, "webhook update queued");
    StatusCode::OK
}
