//! Provider metrics.

use metrics::{counter, histogram};
use poemviz_models::ProviderKind;

/// Metric name constants for consistency.
pub mod names {
    /// Provider request attempts by provider and outcome.
    pub const REQUESTS_TOTAL: &str = "poemviz_provider_requests_total";

    /// Retries by provider.
    pub const RETRIES_TOTAL: &str = "poemviz_provider_retries_total";

    /// Attempt latency in seconds by provider.
    pub const LATENCY_SECONDS: &str = "poemviz_provider_latency_seconds";
}

/// Record one finished request attempt.
pub fn record_request(provider: ProviderKind, outcome: &'static str, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "provider" => provider.as_str(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "provider" => provider.as_str()
    )
    .record(latency_ms / 1000.0);
}

/// Record a retry.
pub fn record_retry(provider: ProviderKind) {
    counter!(names::RETRIES_TOTAL, "provider" => provider.as_str()).increment(1);
}
