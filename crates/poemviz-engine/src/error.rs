//! Engine error types.

use poemviz_planner::PlanError;
use poemviz_provider::ProviderError;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("Run aborted: {0}")]
    RunAborted(String),

    #[error("Provider setup failed: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Playback is not running")]
    PlaybackStopped,
}

impl EngineError {
    pub fn run_aborted(msg: impl Into<String>) -> Self {
        Self::RunAborted(msg.into())
    }

    /// Whether the user should return to input rather than wait.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Plan(_) | EngineError::RunAborted(_) | EngineError::Provider(_)
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Slot {index} is out of range (run has {total} segments)")]
    OutOfRange { index: usize, total: usize },

    #[error("Slot {0} is already written")]
    AlreadyWritten(usize),

    #[error("Result store is closed")]
    Closed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Segment {0} has no result yet")]
    SlotNotReady(usize),

    #[error("Segment {index} is out of range (run has {total} segments)")]
    OutOfRange { index: usize, total: usize },
}
