//! Run orchestration: plan a poem, start generation and playback, and own
//! both task handles until the run is stopped.

use std::future::pending;
use std::sync::Arc;

use poemviz_models::{
    ErrorInfo, GenerationResult, RunEvent, RunId, RunState, Segment, SlideView, StyleMode,
};
use poemviz_planner::SegmentPlanner;
use poemviz_provider::GenerationClient;
use tokio::sync::{broadcast, watch};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::logging::RunLogger;
use crate::playback::{PlaybackController, PlaybackHandle, PlaybackSnapshot, PlaybackState};
use crate::scheduler::{GenerationJobState, GenerationScheduler, RunHandle};
use crate::store::ResultStore;

/// Starts runs. One orchestrator can serve many runs; provider ceilings are
/// shared between them.
pub struct RunOrchestrator {
    planner: SegmentPlanner,
    scheduler: GenerationScheduler,
    config: EngineConfig,
}

impl RunOrchestrator {
    pub fn new(
        planner: SegmentPlanner,
        primary: GenerationClient,
        fallback: Option<GenerationClient>,
        config: EngineConfig,
    ) -> Self {
        let scheduler = GenerationScheduler::new(primary, fallback, config.scheduler.clone());
        Self {
            planner,
            scheduler,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Plan `text` and start generating and playing it.
    ///
    /// Must be called inside a Tokio runtime. Returns as soon as the tasks
    /// are spawned; playback begins once the first image is stored.
    pub fn start(&self, text: &str, style_mode: StyleMode) -> EngineResult<Run> {
        let segments = Arc::new(self.planner.plan(text, style_mode)?);
        let run_id = RunId::new();
        let logger = RunLogger::new(&run_id, "orchestrator");
        logger.planned(segments.len(), style_mode);

        let store = Arc::new(ResultStore::new(run_id.clone(), segments.len()));
        let (events, initial_events) = broadcast::channel(self.config.scheduler.event_capacity);

        let generation =
            self.scheduler
                .spawn(Arc::clone(&segments), Arc::clone(&store), events.clone());
        let playback = PlaybackHandle::spawn(PlaybackController::new(
            Arc::clone(&store),
            self.config.playback.clone(),
        ));

        Ok(Run {
            run_id,
            segments,
            store,
            generation,
            playback,
            events,
            initial_events: Some(initial_events),
        })
    }
}

/// A started run. Dropping it stops generation and playback.
pub struct Run {
    run_id: RunId,
    segments: Arc<Vec<Segment>>,
    store: Arc<ResultStore>,
    generation: RunHandle,
    playback: PlaybackHandle,
    events: broadcast::Sender<RunEvent>,
    initial_events: Option<broadcast::Receiver<RunEvent>>,
}

impl Run {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    pub fn run_state(&self) -> RunState {
        self.generation.state()
    }

    pub fn job_state(&self) -> GenerationJobState {
        self.generation.job_state()
    }

    pub fn playback_state(&self) -> PlaybackSnapshot {
        self.playback.snapshot()
    }

    /// The receiver created before generation started; sees every event.
    /// Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<broadcast::Receiver<RunEvent>> {
        self.initial_events.take()
    }

    /// A receiver for events from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_playback(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.playback.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.generation.subscribe_state()
    }

    /// The single error the UI should show, if any.
    pub fn current_error(&self) -> Option<ErrorInfo> {
        if let RunState::Aborted { reason } = self.run_state() {
            return Some(ErrorInfo::fatal(reason));
        }
        match self.playback_state().state {
            PlaybackState::Buffering { index } => Some(ErrorInfo::recoverable(format!(
                "Waiting for scene {} of {}",
                index + 1,
                self.segments.len()
            ))),
            _ => None,
        }
    }

    /// Present results in index order, for the gallery view.
    pub fn gallery(&self) -> Vec<GenerationResult> {
        self.store.snapshot()
    }

    pub async fn seek(&self, index: usize) -> EngineResult<SlideView> {
        self.playback.seek(index).await
    }

    pub async fn replay(&self) -> EngineResult<()> {
        self.playback.replay().await
    }

    /// Wait until the first slide is on screen, or the run aborts.
    pub async fn wait_for_first_slide(&self) -> EngineResult<SlideView> {
        let mut playback = self.playback.subscribe();
        let mut state = self.generation.subscribe_state();

        let aborted = async {
            let seen = state
                .wait_for(|s| matches!(s, RunState::Aborted { .. }))
                .await
                .map(|s| s.clone())
                .ok();
            match seen {
                Some(s) => s,
                // Sender gone without an abort: the run completed.
                None => pending().await,
            }
        };

        tokio::select! {
            shown = playback.wait_for(|s| s.slide.is_some()) => {
                if let Ok(snapshot) = shown {
                    if let Some(slide) = snapshot.slide.clone() {
                        return Ok(slide);
                    }
                }
            }
            state = aborted => {
                if let RunState::Aborted { reason } = state {
                    return Err(EngineError::run_aborted(reason));
                }
            }
        }

        // Playback exited without a slide, so the store was closed.
        let mut state = self.generation.subscribe_state();
        let _ = state.wait_for(|s| s.is_terminal()).await;
        match self.run_state() {
            RunState::Aborted { reason } => Err(EngineError::run_aborted(reason)),
            _ => Err(EngineError::PlaybackStopped),
        }
    }

    /// Wait for generation to finish. Playback keeps running.
    pub async fn wait_for_generation(&mut self) -> EngineResult<()> {
        match self.generation.wait().await {
            RunState::Completed => Ok(()),
            RunState::Aborted { reason } => Err(EngineError::run_aborted(reason)),
            other => Err(EngineError::run_aborted(format!(
                "Generation ended in state {}",
                other.as_str()
            ))),
        }
    }

    /// Wait until playback reaches [`PlaybackState::Finished`].
    pub async fn wait_for_playback_end(&self) -> EngineResult<()> {
        let mut playback = self.playback.subscribe();
        playback
            .wait_for(|s| s.state == PlaybackState::Finished)
            .await
            .map(|_| ())
            .map_err(|_| EngineError::PlaybackStopped)
    }

    /// Cancel generation and playback and wait for both to exit.
    pub async fn stop(self) -> RunState {
        let state = self.generation.stop().await;
        self.playback.stop().await;
        state
    }
}
