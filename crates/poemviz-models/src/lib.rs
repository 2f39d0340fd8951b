//! Shared data models for the poem visualizer.
//!
//! This crate provides Serde-serializable types for:
//! - Segments and the generation directives derived from them
//! - Moods, scenery and style modes
//! - Generation results, failures and dwell timing
//! - Run identity, run state and run events

pub mod event;
pub mod generation;
pub mod run;
pub mod segment;
pub mod style;

// Re-export common types
pub use event::{RunEvent, SlideView};
pub use generation::{
    DwellPolicy, FailureReason, GenerationFailure, GenerationResult, ProviderKind,
    ProviderParseError, ResultOrigin,
};
pub use run::{ErrorInfo, RunId, RunState};
pub use segment::{ContinuityContext, Directive, Segment, StyleParameters};
pub use style::{EndBehavior, Mood, MoodAnalysis, Motion, ParseEnumError, Scenery, StyleMode};
