//! Provider error types.

use std::time::Duration;

use poemviz_models::FailureReason;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Rejected by content policy: {0}")]
    ContentPolicy(String),

    #[error("Malformed request ({status}): {message}")]
    MalformedRequest { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Rate limits, 5xx, timeouts and connection failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. }
            | ProviderError::Server { .. }
            | ProviderError::Timeout(_) => true,
            ProviderError::Network(e) => !e.is_decode() && !e.is_builder(),
            _ => false,
        }
    }

    /// Server-requested delay before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Reason recorded when this error ends a segment's attempts.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            _ if self.is_retryable() => FailureReason::Exhausted,
            ProviderError::Auth { .. } => FailureReason::Auth,
            ProviderError::ContentPolicy(_) => FailureReason::ContentPolicy,
            ProviderError::InvalidResponse(_) | ProviderError::Network(_) => {
                FailureReason::InvalidResponse
            }
            _ => FailureReason::MalformedRequest,
        }
    }

    /// Classify a non-success HTTP response.
    pub fn from_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> Self {
        let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|e| e.error.message.clone())
            .unwrap_or_else(|| truncate(body, 300));
        let code = status.as_u16();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return ProviderError::RateLimited {
                message,
                retry_after,
            };
        }
        if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            return ProviderError::Server {
                status: code,
                message,
            };
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return ProviderError::Auth {
                status: code,
                message,
            };
        }

        let policy_code = parsed
            .as_ref()
            .and_then(|e| e.error.code.as_ref())
            .map(|c| c.to_string().contains("content_policy"))
            .unwrap_or(false);
        let lower = message.to_lowercase();
        if policy_code || lower.contains("content_policy") || lower.contains("safety") {
            return ProviderError::ContentPolicy(message);
        }

        ProviderError::MalformedRequest {
            status: code,
            message,
        }
    }
}

/// Error body shape shared by both providers: `{"error": {"message": ..., "code": ...}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<serde_json::Value>,
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
