//! Run events and the slide payload handed to renderers.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{GenerationResult, Motion, ResultOrigin, RunId};

/// Observational events published by the scheduler.
///
/// Events never gate scheduling; a subscriber that lags simply misses some.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        run_id: RunId,
        total: usize,
    },
    /// A slot was written (or superseded).
    SegmentReady {
        index: usize,
        origin: ResultOrigin,
    },
    /// Emitted after every slot write.
    Progress {
        completed: usize,
        total: usize,
    },
    Completed {
        run_id: RunId,
    },
    Aborted {
        run_id: RunId,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl RunEvent {
    pub fn progress(completed: usize, total: usize) -> Self {
        RunEvent::Progress { completed, total }
    }

    pub fn aborted(run_id: RunId, message: impl Into<String>) -> Self {
        RunEvent::Aborted {
            run_id,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Progress as a 0-100 percentage, for progress bars.
    pub fn percent(&self) -> Option<u8> {
        match self {
            RunEvent::Progress { completed, total } if *total > 0 => {
                Some(((completed * 100) / total).min(100) as u8)
            }
            _ => None,
        }
    }
}

/// What renderers receive for the slide currently on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SlideView {
    pub index: usize,
    pub image_ref: String,
    pub source_text: String,
    pub dwell_hint_ms: u64,
    pub motion: Motion,
}

impl From<&GenerationResult> for SlideView {
    fn from(result: &GenerationResult) -> Self {
        Self {
            index: result.index,
            image_ref: result.image_ref.clone(),
            source_text: result.source_text.clone(),
            dwell_hint_ms: result.dwell_hint_ms,
            motion: result.motion,
        }
    }
}
