//! Per-run structured logging.
//!
//! Every record carries `run_id` and `component` fields, so one run can be
//! filtered out of interleaved output from concurrent runs.

use poemviz_models::{GenerationFailure, ProviderKind, ResultOrigin, RunId, RunState, StyleMode};
use tracing::{error, info, warn, Span};

#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: RunId,
    component: &'static str,
}

impl RunLogger {
    pub fn new(run_id: &RunId, component: &'static str) -> Self {
        Self {
            run_id: run_id.clone(),
            component,
        }
    }

    pub fn planned(&self, segments: usize, style_mode: StyleMode) {
        info!(
            run_id = %self.run_id,
            component = %self.component,
            segments,
            style_mode = %style_mode,
            "Poem planned"
        );
    }

    pub fn generation_started(
        &self,
        segments: usize,
        workers: usize,
        primary: ProviderKind,
        fallback: Option<ProviderKind>,
    ) {
        info!(
            run_id = %self.run_id,
            component = %self.component,
            segments,
            workers,
            primary = %primary,
            fallback = fallback.map(|k| k.as_str()).unwrap_or("none"),
            "Generation started"
        );
    }

    pub fn segment_stored(&self, index: usize, origin: ResultOrigin, completed: usize, total: usize) {
        info!(
            run_id = %self.run_id,
            component = %self.component,
            index,
            origin = ?origin,
            completed,
            total,
            "Segment stored"
        );
    }

    /// One provider gave up on a segment. Not fatal by itself.
    pub fn segment_failed(&self, failure: &GenerationFailure) {
        warn!(
            run_id = %self.run_id,
            component = %self.component,
            index = failure.index,
            provider = %failure.provider,
            reason = %failure.reason,
            attempts = failure.attempt_count,
            "Segment failed: {}",
            failure.message
        );
    }

    pub fn run_finished(&self, state: &RunState) {
        match state {
            RunState::Aborted { reason } => error!(
                run_id = %self.run_id,
                component = %self.component,
                state = state.as_str(),
                "Run aborted: {}",
                reason
            ),
            _ => info!(
                run_id = %self.run_id,
                component = %self.component,
                state = state.as_str(),
                "Run finished"
            ),
        }
    }

    pub fn playback_started(&self) {
        info!(
            run_id = %self.run_id,
            component = %self.component,
            "Playback started"
        );
    }

    pub fn playback_finished(&self, loops: u32) {
        info!(
            run_id = %self.run_id,
            component = %self.component,
            loops,
            "Playback reached the last slide"
        );
    }

    /// Span for the run's spawned tasks.
    pub fn span(&self) -> Span {
        tracing::info_span!("run", run_id = %self.run_id, component = %self.component)
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use poemviz_models::FailureReason;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = out.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_records_carry_run_fields() {
        let run_id = RunId::from_string("run-42");
        let logger = RunLogger::new(&run_id, "scheduler");

        let output = capture(|| logger.segment_stored(2, ResultOrigin::Placeholder, 3, 5));

        assert!(output.contains("run_id=run-42"));
        assert!(output.contains("component=scheduler"));
        assert!(output.contains("index=2"));
        assert!(output.contains("completed=3"));
    }

    #[test]
    fn test_failure_record_names_provider_and_reason() {
        let logger = RunLogger::new(&RunId::from_string("run-7"), "scheduler");
        let failure = GenerationFailure {
            index: 1,
            provider: ProviderKind::Imagen,
            reason: FailureReason::ContentPolicy,
            attempt_count: 1,
            message: "blocked".to_string(),
        };

        let output = capture(|| logger.segment_failed(&failure));

        assert!(output.contains("WARN"));
        assert!(output.contains("provider=imagen"));
        assert!(output.contains("Segment failed: blocked"));
    }

    #[test]
    fn test_aborted_run_logged_as_error() {
        let logger = RunLogger::new(&RunId::from_string("run-9"), "scheduler");
        let state = RunState::Aborted {
            reason: "Run stopped".to_string(),
        };

        let output = capture(|| logger.run_finished(&state));

        assert!(output.contains("ERROR"));
        assert!(output.contains("Run aborted: Run stopped"));
    }
}
