//! Incremental generation-and-playback pipeline.
//!
//! This crate provides:
//! - `ResultStore`: sparse, index-addressed results shared by generation and playback
//! - `GenerationScheduler`: bounded worker pool with provider fallback
//! - `PlaybackController`: buffering/showing state machine over the store
//! - `RunOrchestrator`: owns a run's context and its task handles
//! - Structured run logging and metrics

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod playback;
pub mod scheduler;
pub mod store;

pub use config::{EngineConfig, PlaybackConfig, SchedulerConfig};
pub use error::{EngineError, EngineResult, PlaybackError, StoreError, StoreResult};
pub use logging::RunLogger;
pub use orchestrator::{Run, RunOrchestrator};
pub use playback::{
    PlaybackController, PlaybackCursor, PlaybackHandle, PlaybackSnapshot, PlaybackState,
    PlaybackTransition,
};
pub use scheduler::{GenerationJobState, GenerationScheduler, RunHandle};
pub use store::{ResultStore, WriteKind, WriteOutcome};
