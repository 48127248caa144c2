use std::time::Duration;

/// Failure reported by the Bot API in an `ok: false` envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The group was upgraded to a supergroup with a new identifier.
    #[error("{error_code}: the group has been migrated to the supergroup with the identifier {migrate_to_chat_id}")]
    ChatMigrated {
        error_code: i32,
        migrate_to_chat_id: i64,
    },

    /// Flood control: the request may be repeated after `retry_after`.
    #[error("{error_code}: too many requests; retry after {} seconds", retry_after.as_secs())]
    TooManyRequests {
        error_code: i32,
        retry_after: Duration,
    },

    /// Any other rejection, carrying the human-readable description.
    #[error("{error_code}: {description}")]
    BadRequest {
        error_code: i32,
        description: String,
    },
}

impl ApiError {
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            Self::ChatMigrated { error_code, .. }
            | Self::TooManyRequests { error_code, .. }
            | Self::BadRequest { error_code, .. } => *error_code,
        }
    }

    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::TooManyRequests { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Short label used for log fields and metric labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChatMigrated { .. } => "chat_migrated",
            Self::TooManyRequests { .. } => "rate_limited",
            Self::BadRequest { .. } => "bad_request",
        }
    }
}

/// An inbound update object that cannot be mapped to exactly one kind.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("update {update_id} carries no event")]
    MissingKind { update_id: i64 },

    #[error("update {update_id} carries more than one event: {}", kinds.join(", "))]
    MultipleKinds { update_id: i64, kinds: Vec<String> },

    #[error("update {update_id} carries unsupported event kind {kind:?}")]
    UnknownKind { update_id: i64, kind: String },

    #[error("update {update_id}: malformed {kind} payload: {source}")]
    Payload {
        update_id: i64,
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
