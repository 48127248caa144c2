use {courier_api::ApiError, std::time::Duration};

/// Crate-wide result type for wire client calls.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No envelope came back: connect, TLS, timeout or body read failures,
    /// or an error status with a non-JSON body.
    #[error("{method}: request to {url} failed: {source}")]
    Transport {
        method: String,
        /// Endpoint with the token redacted.
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered `ok: false`.
    #[error("{method}: {source}")]
    Api {
        method: String,
        #[source]
        source: ApiError,
    },

    #[error("{method}: encoding request payload: {source}")]
    Encode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{method}: decoding response: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{method}: the response has no result")]
    EmptyResult { method: String },

    #[error("invalid API url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("building HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

impl Error {
    #[must_use]
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api { source, .. } => Some(source),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.retry_after().is_some()
    }

    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.api_error().and_then(ApiError::retry_after)
    }

    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Short label used for log fields and metric labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Api { source, .. } => source.kind(),
            Self::Encode { .. } => "encode",
            Self::Decode { .. } | Self::EmptyResult { .. } => "decode",
            Self::InvalidUrl { .. } | Self::HttpClient(_) => "config",
        }
    }
}
