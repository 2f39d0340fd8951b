//! Engine metrics.

use metrics::counter;
use poemviz_models::ResultOrigin;

pub mod names {
    /// Slot writes by origin (primary, fallback, placeholder).
    pub const SEGMENTS_TOTAL: &str = "poemviz_segments_total";

    /// Runs by final outcome.
    pub const RUNS_TOTAL: &str = "poemviz_runs_total";

    /// Times playback reached a slot that was not generated yet.
    pub const BUFFER_STALLS_TOTAL: &str = "poemviz_buffer_stalls_total";
}

pub fn record_segment(origin: ResultOrigin) {
    let origin = match origin {
        ResultOrigin::Primary(_) => "primary",
        ResultOrigin::Fallback(_) => "fallback",
        ResultOrigin::Placeholder => "placeholder",
    };
    counter!(names::SEGMENTS_TOTAL, "origin" => origin).increment(1);
}

pub fn record_run(outcome: &'static str) {
    counter!(names::RUNS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_buffer_stall() {
    counter!(names::BUFFER_STALLS_TOTAL).increment(1);
}
