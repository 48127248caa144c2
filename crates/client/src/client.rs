use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {
    courier_api::{ApiResponse, DEFAULT_API_URL, Method},
    secrecy::{ExposeSecret, Secret},
    serde::de::DeserializeOwned,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use courier_metrics::{client as client_metrics, counter, histogram};

use crate::{
    error::{Error, Result},
    payload::Payload,
    pool::BufferPool,
};

/// HTTP timeout for a single call. Must stay above the long-poll timeout so
/// the client does not abort a `getUpdates` before the service answers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);

/// Diagnostics for one outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: String,
    pub content_type: &'static str,
    pub duration: Duration,
}

/// Bot API client. Cheap to clone; clones share the connection pool and the
/// buffer pool.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    api_url: String,
    token: Secret<String>,
    buffers: BufferPool,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("api_url", &self.inner.api_url)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

pub struct ClientBuilder {
    token: Secret<String>,
    api_url: String,
    timeout: Duration,
    http: Option<reqwest::Client>,
    max_pooled_buffers: usize,
}

impl ClientBuilder {
    #[must_use]
    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a preconfigured HTTP client; `timeout` is then ignored.
    #[must_use]
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    #[must_use]
    pub fn max_pooled_buffers(mut self, max: usize) -> Self {
        self.max_pooled_buffers = max;
        self
    }

    pub fn build(self) -> Result<Client> {
        let api_url = self.api_url.trim_end_matches('/').to_string();
        url::Url::parse(&api_url).map_err(|source| Error::InvalidUrl {
            url: api_url.clone(),
            source,
        })?;

        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .timeout(self.timeout)
                .pool_max_idle_per_host(100)
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .map_err(Error::HttpClient)?,
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                http,
                api_url,
                token: self.token,
                buffers: BufferPool::new(self.max_pooled_buffers),
            }),
        })
    }
}

impl Client {
    pub fn builder(token: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            token: Secret::new(token.into()),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            http: None,
            max_pooled_buffers: 64,
        }
    }

    /// Client for the public Bot API with default settings.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::builder(token).build()
    }

    pub fn api_url(&self) -> &str {
        &self.inner.api_url
    }

    /// Send a typed method. A rate-limited answer is retried once after the
    /// indicated delay; a second failure is returned as-is.
    pub async fn send<M: Method>(&self, method: &M) -> Result<M::Output> {
        let payload = Payload::encode(method)?;
        let result = self.execute(M::NAME, &payload, true).await?;
        bind(M::NAME, result)
    }

    /// Like [`Client::send`], without the rate-limit retry.
    pub async fn send_once<M: Method>(&self, method: &M) -> Result<M::Output> {
        let payload = Payload::encode(method)?;
        let result = self.execute(M::NAME, &payload, false).await?;
        bind(M::NAME, result)
    }

    /// Send a typed method and report what went over the wire.
    pub async fn send_traced<M: Method>(&self, method: &M) -> (Result<M::Output>, RequestInfo) {
        let started = Instant::now();
        let (result, content_type) = match Payload::encode(method) {
            Ok(payload) => {
                let result = self
                    .execute(M::NAME, &payload, true)
                    .await
                    .and_then(|value| bind(M::NAME, value));
                (result, payload.content_type())
            },
            Err(e) => (Err(e), crate::payload::JSON),
        };
        let info = RequestInfo {
            method: M::NAME.to_string(),
            content_type,
            duration: started.elapsed(),
        };
        (result, info)
    }

    /// Send any method by name with a JSON body; returns the raw result
    /// (`null` when the service returned none).
    pub async fn send_raw(
        &self,
        method: &str,
        body: &impl serde::Serialize,
    ) -> Result<serde_json::Value> {
        let payload = Payload::json(method, body)?;
        let result = self.execute(method, &payload, true).await?;
        Ok(result.unwrap_or(serde_json::Value::Null))
    }

    /// [`Client::send_raw`] with a diagnostics record.
    pub async fn send_raw_traced(
        &self,
        method: &str,
        body: &impl serde::Serialize,
    ) -> (Result<serde_json::Value>, RequestInfo) {
        let started = Instant::now();
        let result = self.send_raw(method, body).await;
        let info = RequestInfo {
            method: method.to_string(),
            content_type: crate::payload::JSON,
            duration: started.elapsed(),
        };
        (result, info)
    }

    async fn execute(
        &self,
        method: &str,
        payload: &Payload,
        retry_rate_limited: bool,
    ) -> Result<Option<serde_json::Value>> {
        match self.request(method, payload).await {
            Err(err) if retry_rate_limited && err.is_rate_limited() => {
                let wait = err.retry_after().unwrap_or_default();
                warn!(
                    method,
                    retry_after_secs = wait.as_secs(),
                    "rate limited, retrying once"
                );
                #[cfg(feature = "metrics")]
                counter!(client_metrics::RATE_LIMIT_RETRIES_TOTAL, "method" => method.to_string())
                    .increment(1);
                tokio::time::sleep(wait).await;
                self.request(method, payload).await
            },
            other => other,
        }
    }

    async fn request(
        &self,
        method: &str,
        payload: &Payload,
    ) -> Result<Option<serde_json::Value>> {
        let started = Instant::now();
        let result = self.round_trip(method, payload).await;
        let elapsed = started.elapsed();

        #[cfg(feature = "metrics")]
        {
            counter!(client_metrics::REQUESTS_TOTAL, "method" => method.to_string()).increment(1);
            histogram!(client_metrics::REQUEST_DURATION_SECONDS, "method" => method.to_string())
                .record(elapsed.as_secs_f64());
            if let Err(e) = &result {
                counter!(
                    client_metrics::ERRORS_TOTAL,
                    "method" => method.to_string(),
                    "kind" => e.kind()
                )
                .increment(1);
            }
        }

        match &result {
            Ok(_) => debug!(method, elapsed_ms = elapsed.as_millis() as u64, "api call ok"),
            Err(e) => debug!(method, error = %e, kind = e.kind(), "api call failed"),
        }
        result
    }

    async fn round_trip(
        &self,
        method: &str,
        payload: &Payload,
    ) -> Result<Option<serde_json::Value>> {
        let transport = |source: reqwest::Error| Error::Transport {
            method: method.to_string(),
            url: self.redacted_url(method),
            source: source.without_url(),
        };

        let request = self.inner.http.post(self.endpoint(method));
        let mut response = payload.apply(request).send().await.map_err(transport)?;

        // The Bot API sends its envelope with non-2xx statuses too; the status
        // only matters when there is no envelope, e.g. a proxy error page.
        let status_error = response.error_for_status_ref().err();

        let mut body = self.inner.buffers.acquire();
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            body.extend_from_slice(&chunk);
        }

        let envelope: ApiResponse = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(source) => {
                return Err(match status_error {
                    Some(status) => transport(status),
                    None => Error::Decode {
                        method: method.to_string(),
                        source,
                    },
                });
            },
        };

        envelope.into_result().map_err(|source| Error::Api {
            method: method.to_string(),
            source,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.inner.api_url,
            self.inner.token.expose_secret()
        )
    }

    fn redacted_url(&self, method: &str) -> String {
        format!("{}/bot<redacted>/{method}", self.inner.api_url)
    }
}

fn bind<T: DeserializeOwned>(method: &str, result: Option<serde_json::Value>) -> Result<T> {
    let value = result.ok_or_else(|| Error::EmptyResult {
        method: method.to_string(),
    })?;
    serde_json::from_value(value).map_err(|source| Error::Decode {
        method: method.to_string(),
        source,
    })
}
