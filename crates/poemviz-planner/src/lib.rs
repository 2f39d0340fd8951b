//! Scene planning for poems.
//!
//! This crate provides:
//! - `SegmentPlanner`: poem text to an ordered, deterministic list of segments
//! - `MoodClassifier`: the sentiment seam, with a keyword-scoring implementation
//! - Prompt sanitization for words that trip provider safety filters
//!
//! Nothing in here performs I/O.

pub mod classifier;
pub mod error;
pub mod planner;
pub mod sanitize;

pub use classifier::{KeywordClassifier, MoodClassifier};
pub use error::{PlanError, PlanResult};
pub use planner::{CompositionRule, PlannerConfig, SegmentPlanner, COMPOSITION_RULES};
pub use sanitize::sanitize_subject;
