use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Extra hints attached to a failed response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrate_to_chat_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// The `{ok, result, description, error_code, parameters}` envelope every
/// Bot API call answers with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ResponseParameters>,
}

impl ApiResponse {
    pub fn success(result: impl Serialize) -> serde_json::Result<Self> {
        Ok(Self {
            ok: true,
            result: Some(serde_json::to_value(result)?),
            ..Self::default()
        })
    }

    /// Classify a failed envelope; `None` when the call succeeded.
    ///
    /// A migration hint wins over a retry hint; anything else is a bad request.
    #[must_use]
    pub fn error(&self) -> Option<ApiError> {
        if self.ok {
            return None;
        }
        let error_code = self.error_code.unwrap_or_default();
        let params = self.parameters.clone().unwrap_or_default();
        if let Some(migrate_to_chat_id) = params.migrate_to_chat_id {
            return Some(ApiError::ChatMigrated {
                error_code,
                migrate_to_chat_id,
            });
        }
        if let Some(secs) = params.retry_after {
            return Some(ApiError::TooManyRequests {
                error_code,
                retry_after: Duration::from_secs(secs),
            });
        }
        Some(ApiError::BadRequest {
            error_code,
            description: self.description.clone().unwrap_or_default(),
        })
    }

    /// Split the envelope into its result or its classified error.
    pub fn into_result(self) -> Result<Option<serde_json::Value>, ApiError> {
        match self.error() {
            Some(err) => Err(err),
            None => Ok(self.result),
        }
    }
}
