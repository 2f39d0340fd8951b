//! Engine configuration.

use std::time::Duration;

use poemviz_models::{DwellPolicy, EndBehavior, ProviderKind};

/// Placeholder shown when every provider failed for a segment.
pub const DEFAULT_PLACEHOLDER_URL: &str =
    "https://images.unsplash.com/photo-1518066000714-58c45f1a2c0a?q=80&w=2070&auto=format&fit=crop";

/// Generation scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of workers per run
    pub concurrency_limit: usize,
    /// Maximum in-flight requests against the primary provider
    pub primary_max_concurrent: usize,
    /// Maximum in-flight requests against the fallback provider
    pub fallback_max_concurrent: usize,
    /// Image used for segments every provider failed on
    pub placeholder_url: String,
    pub dwell: DwellPolicy,
    /// Publish the placeholder before trying the fallback provider
    pub eager_placeholder: bool,
    /// Buffer size of the run event channel
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 3,
            primary_max_concurrent: 3,
            fallback_max_concurrent: 1,
            placeholder_url: DEFAULT_PLACEHOLDER_URL.to_string(),
            dwell: DwellPolicy::default(),
            eager_placeholder: false,
            event_capacity: 256,
        }
    }
}

impl SchedulerConfig {
    /// Defaults sized to the providers' rate-limit tolerance.
    pub fn for_providers(primary: ProviderKind, fallback: Option<ProviderKind>) -> Self {
        Self {
            concurrency_limit: primary.default_concurrency(),
            primary_max_concurrent: primary.default_concurrency(),
            fallback_max_concurrent: fallback
                .map(|k| k.default_concurrency())
                .unwrap_or(1),
            ..Default::default()
        }
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }
}

/// Playback configuration.
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// How often a buffering controller re-checks the store
    pub poll_interval: Duration,
    pub end_behavior: EndBehavior,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            end_behavior: EndBehavior::Finish,
        }
    }
}

/// Complete engine configuration for a run.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub playback: PlaybackConfig,
}
