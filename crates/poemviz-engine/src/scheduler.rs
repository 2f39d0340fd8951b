//! Bounded-concurrency generation scheduler.
//!
//! A run spawns `min(concurrency_limit, segments)` workers. Each worker
//! claims the lowest unclaimed index from a shared counter, generates it
//! (primary provider, then fallback), writes the outcome to the
//! [`ResultStore`] and claims again. Because claiming is in index order,
//! segment 0 is always among the first requests sent, which keeps the time
//! to first image low.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use poemviz_models::{
    GenerationFailure, GenerationResult, ResultOrigin, RunEvent, RunId, RunState, Segment,
};
use poemviz_provider::GenerationClient;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, Instrument};

use crate::config::SchedulerConfig;
use crate::logging::RunLogger;
use crate::metrics::{record_run, record_segment};
use crate::store::{ResultStore, WriteKind};

/// Observable scheduler bookkeeping for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenerationJobState {
    /// Next index a worker will claim; may exceed `total_segments`.
    pub next_unclaimed_index: usize,
    pub active_workers: usize,
    pub total_segments: usize,
}

/// Schedules generation for runs.
///
/// Provider ceilings live in the clients, so they hold across every run
/// started from one scheduler.
#[derive(Clone)]
pub struct GenerationScheduler {
    primary: GenerationClient,
    fallback: Option<GenerationClient>,
    config: SchedulerConfig,
}

impl GenerationScheduler {
    pub fn new(
        primary: GenerationClient,
        fallback: Option<GenerationClient>,
        config: SchedulerConfig,
    ) -> Self {
        let primary = primary.with_ceiling(config.primary_max_concurrent);
        let fallback = fallback.map(|c| c.with_ceiling(config.fallback_max_concurrent));
        Self {
            primary,
            fallback,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Start generating `segments` into `store` and return immediately.
    ///
    /// Events go to `events`; subscribe before calling to see `Started`.
    pub fn spawn(
        &self,
        segments: Arc<Vec<Segment>>,
        store: Arc<ResultStore>,
        events: broadcast::Sender<RunEvent>,
    ) -> RunHandle {
        let run_id = store.run_id().clone();
        let logger = RunLogger::new(&run_id, "scheduler");
        let total = segments.len();

        let (state_tx, state_rx) = watch::channel(RunState::Running);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(RunShared {
            run_id: run_id.clone(),
            segments,
            store: Arc::clone(&store),
            primary: self.primary.clone(),
            fallback: self.fallback.clone(),
            config: self.config.clone(),
            next_index: AtomicUsize::new(0),
            active_workers: AtomicUsize::new(0),
            events,
            logger: logger.clone(),
        });

        let worker_count = self.config.concurrency_limit.max(1).min(total);
        logger.generation_started(
            total,
            worker_count,
            self.primary.kind(),
            self.fallback.as_ref().map(GenerationClient::kind),
        );
        shared.emit(RunEvent::Started {
            run_id: run_id.clone(),
            total,
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let shared = Arc::clone(&shared);
            workers.spawn(
                worker_loop(shared, worker_id).instrument(logger.span()),
            );
        }

        let supervisor = tokio::spawn(
            supervise(Arc::clone(&shared), workers, shutdown_rx, state_tx)
                .instrument(logger.span()),
        );

        RunHandle {
            run_id,
            shared,
            state: state_rx,
            shutdown: shutdown_tx,
            task: Some(supervisor),
        }
    }
}

/// State shared by a run's workers.
struct RunShared {
    run_id: RunId,
    segments: Arc<Vec<Segment>>,
    store: Arc<ResultStore>,
    primary: GenerationClient,
    fallback: Option<GenerationClient>,
    config: SchedulerConfig,
    next_index: AtomicUsize,
    active_workers: AtomicUsize,
    events: broadcast::Sender<RunEvent>,
    logger: RunLogger,
}

impl RunShared {
    fn emit(&self, event: RunEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn job_state(&self) -> GenerationJobState {
        GenerationJobState {
            next_unclaimed_index: self.next_index.load(Ordering::Acquire),
            active_workers: self.active_workers.load(Ordering::Acquire),
            total_segments: self.segments.len(),
        }
    }

    /// Claim the lowest unclaimed index. Single atomic step.
    fn claim(&self) -> Option<usize> {
        let index = self.next_index.fetch_add(1, Ordering::AcqRel);
        (index < self.segments.len()).then_some(index)
    }

    /// Generate one segment and store its terminal entry.
    ///
    /// Errors only when segment 0 failed on every provider.
    async fn process(&self, index: usize) -> Result<(), GenerationFailure> {
        let segment = &self.segments[index];

        let failure = match self.primary.generate(index, &segment.directive).await {
            Ok(image) => {
                debug!(index, attempts = image.attempts, "Primary provider succeeded");
                let origin = ResultOrigin::Primary(image.provider);
                self.store_result(self.result(segment, image.image_ref, origin));
                return Ok(());
            }
            Err(failure) => failure,
        };

        self.logger.segment_failed(&failure);

        let failure = match &self.fallback {
            Some(fallback) => {
                if self.config.eager_placeholder && index > 0 {
                    self.store_placeholder(segment);
                }

                match fallback.generate(index, &segment.directive).await {
                    Ok(image) => {
                        debug!(index, attempts = image.attempts, "Fallback provider succeeded");
                        let origin = ResultOrigin::Fallback(image.provider);
                        self.store_result(self.result(segment, image.image_ref, origin));
                        return Ok(());
                    }
                    Err(fallback_failure) => {
                        self.logger.segment_failed(&fallback_failure);
                        fallback_failure
                    }
                }
            }
            None => failure,
        };

        if index == 0 {
            return Err(failure);
        }

        if !self.store.contains(index) {
            self.store_placeholder(segment);
        }
        Ok(())
    }

    fn result(&self, segment: &Segment, image_ref: String, origin: ResultOrigin) -> GenerationResult {
        GenerationResult {
            index: segment.index,
            image_ref,
            source_text: segment.source_text.clone(),
            dwell_hint_ms: self.config.dwell.dwell_ms(&segment.source_text),
            motion: segment.directive.style.motion,
            origin,
        }
    }

    fn store_placeholder(&self, segment: &Segment) {
        let placeholder = self.result(
            segment,
            self.config.placeholder_url.clone(),
            ResultOrigin::Placeholder,
        );
        self.store_result(placeholder);
    }

    fn store_result(&self, result: GenerationResult) {
        let index = result.index;
        let origin = result.origin;

        match self.store.write(result) {
            Ok(outcome) => {
                record_segment(origin);
                if outcome.kind == WriteKind::Superseded {
                    debug!(index, "Placeholder superseded");
                }
                self.emit(RunEvent::SegmentReady { index, origin });
                let total = self.segments.len();
                self.emit(RunEvent::progress(outcome.completed, total));
                self.logger
                    .segment_stored(index, origin, outcome.completed, total);
            }
            Err(e) => {
                // Closed stores are expected after a stop.
                debug!(index, "Result not stored: {}", e);
            }
        }
    }
}

/// Decrements the active-worker count however the worker exits.
struct ActiveWorker<'a>(&'a AtomicUsize);

impl<'a> ActiveWorker<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for ActiveWorker<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn worker_loop(shared: Arc<RunShared>, worker_id: usize) -> Result<(), GenerationFailure> {
    let _active = ActiveWorker::enter(&shared.active_workers);

    while let Some(index) = shared.claim() {
        if shared.store.is_closed() {
            break;
        }
        debug!(worker_id, index, "Claimed segment");
        shared.process(index).await?;
    }

    debug!(worker_id, "Worker finished");
    Ok(())
}

async fn supervise(
    shared: Arc<RunShared>,
    mut workers: JoinSet<Result<(), GenerationFailure>>,
    mut shutdown: watch::Receiver<bool>,
    state: watch::Sender<RunState>,
) -> RunState {
    let outcome = loop {
        tokio::select! {
            changed = shutdown.changed() => {
                // A dropped handle counts as a stop.
                if changed.is_err() || *shutdown.borrow() {
                    break Err("Run stopped".to_string());
                }
            }
            joined = workers.join_next() => match joined {
                None => break Ok(()),
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(failure))) => {
                    break Err(format!(
                        "Could not generate the first image ({}): {}",
                        failure.reason, failure.message
                    ));
                }
                Some(Err(e)) if e.is_panic() => {
                    break Err(format!("Generation worker panicked: {}", e));
                }
                Some(Err(_)) => {}
            }
        }
    };

    let final_state = match outcome {
        Ok(()) if shared.store.is_complete() => {
            shared.store.seal();
            shared.emit(RunEvent::Completed {
                run_id: shared.run_id.clone(),
            });
            record_run("completed");
            RunState::Completed
        }
        Ok(()) => {
            let reason = "Workers exited with empty slots".to_string();
            abort_run(&shared, &mut workers, &reason).await;
            RunState::Aborted { reason }
        }
        Err(reason) => {
            abort_run(&shared, &mut workers, &reason).await;
            RunState::Aborted { reason }
        }
    };

    shared.logger.run_finished(&final_state);
    let _ = state.send(final_state.clone());
    final_state
}

/// Stop every worker and reject further writes. No slot is written after this returns.
async fn abort_run(
    shared: &RunShared,
    workers: &mut JoinSet<Result<(), GenerationFailure>>,
    reason: &str,
) {
    shared.store.close();
    workers.abort_all();
    while workers.join_next().await.is_some() {}

    shared.emit(RunEvent::aborted(shared.run_id.clone(), reason));
    record_run("aborted");
}

/// Handle to a running generation job.
///
/// Dropping the handle stops the run.
pub struct RunHandle {
    run_id: RunId,
    shared: Arc<RunShared>,
    state: watch::Receiver<RunState>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<RunState>>,
}

impl RunHandle {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn state(&self) -> RunState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.state.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RunEvent> {
        self.shared.events.subscribe()
    }

    pub fn job_state(&self) -> GenerationJobState {
        self.shared.job_state()
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.shared.store
    }

    /// Request cancellation. In-flight requests are abandoned.
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the run to reach a terminal state.
    pub async fn wait(&mut self) -> RunState {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                return RunState::Aborted {
                    reason: format!("Scheduler task failed: {}", e),
                };
            }
        }
        self.state()
    }

    /// Cancel and wait until every worker has exited.
    pub async fn stop(mut self) -> RunState {
        self.cancel();
        self.wait().await
    }
}
