//! Generation results, failures and dwell timing.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Motion;

/// External text-to-image provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-style images endpoint (`prompt`, `size`, `quality`, `model`).
    OpenAi,
    /// Vertex Imagen-style predict endpoint (`instances` / `parameters`).
    Imagen,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Imagen => "imagen",
        }
    }

    /// Default concurrency ceiling; Imagen quotas are much stricter.
    pub fn default_concurrency(&self) -> usize {
        match self {
            ProviderKind::OpenAi => 3,
            ProviderKind::Imagen => 1,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "dalle" | "dall-e" => Ok(ProviderKind::OpenAi),
            "imagen" | "vertex" | "google" => Ok(ProviderKind::Imagen),
            _ => Err(ProviderParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown provider: {0}")]
pub struct ProviderParseError(String);

/// Where a stored result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "provider", rename_all = "snake_case")]
pub enum ResultOrigin {
    Primary(ProviderKind),
    Fallback(ProviderKind),
    /// Substituted after every configured provider failed.
    Placeholder,
}

impl ResultOrigin {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, ResultOrigin::Placeholder)
    }
}

/// A completed scene, ready for the renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationResult {
    pub index: usize,
    /// URL or `data:` URI; providers returning raw bytes are normalized to a data URI.
    pub image_ref: String,
    pub source_text: String,
    pub dwell_hint_ms: u64,
    pub motion: Motion,
    pub origin: ResultOrigin,
}

/// Why a provider gave up on a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Transient failures on every attempt.
    Exhausted,
    Auth,
    MalformedRequest,
    ContentPolicy,
    InvalidResponse,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Exhausted => "exhausted",
            FailureReason::Auth => "auth",
            FailureReason::MalformedRequest => "malformed_request",
            FailureReason::ContentPolicy => "content_policy",
            FailureReason::InvalidResponse => "invalid_response",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal outcome of one provider for one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationFailure {
    pub index: usize,
    pub provider: ProviderKind,
    pub reason: FailureReason,
    pub attempt_count: u32,
    /// Last error message, for logs and the error surface.
    pub message: String,
}

impl fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "segment {} failed on {} after {} attempt(s) ({}): {}",
            self.index, self.provider, self.attempt_count, self.reason, self.message
        )
    }
}

/// How long a slide stays on screen.
///
/// A base dwell plus an entry-animation allowance per character of the caption,
/// so longer lines get proportionally more time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DwellPolicy {
    pub base_ms: u64,
    pub per_char_ms: u64,
    pub max_ms: u64,
}

impl Default for DwellPolicy {
    fn default() -> Self {
        Self {
            base_ms: 3000,
            per_char_ms: 50,
            max_ms: 12_000,
        }
    }
}

impl DwellPolicy {
    pub fn dwell_ms(&self, text: &str) -> u64 {
        let chars = text.chars().count() as u64;
        self.base_ms
            .saturating_add(self.per_char_ms.saturating_mul(chars))
            .min(self.max_ms.max(self.base_ms))
    }

    pub fn dwell(&self, text: &str) -> Duration {
        Duration::from_millis(self.dwell_ms(text))
    }
}
