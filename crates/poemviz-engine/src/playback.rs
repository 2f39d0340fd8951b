//! Playback: walks the result store in index order, one dwell per slide.
//!
//! [`PlaybackController`] is a synchronous state machine driven with an
//! explicit `now`, so every transition is testable without timers.
//! [`PlaybackHandle`] runs it on a task and wakes it on dwell expiry, on
//! store writes, or on the poll interval while buffering.

use std::sync::Arc;

use poemviz_models::{EndBehavior, SlideView};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, Instrument};

use crate::config::PlaybackConfig;
use crate::error::{EngineError, EngineResult, PlaybackError};
use crate::logging::RunLogger;
use crate::metrics::record_buffer_stall;
use crate::store::ResultStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlaybackState {
    /// Not started; waiting for the first slot.
    Idle,
    /// The slot at `index` has no result yet.
    Buffering { index: usize },
    Showing { index: usize },
    Finished,
}

/// What a call to [`PlaybackController::try_advance`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackTransition {
    Unchanged,
    Buffering { index: usize },
    Showing(SlideView),
    Finished,
}

/// Position in the slide sequence. Moves forward one slot at a time except
/// for explicit seeks and the loop reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackCursor {
    index: usize,
    total: usize,
}

impl PlaybackCursor {
    pub fn new(total: usize) -> Self {
        Self { index: 0, total }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.total
    }

    fn advance(&mut self) {
        if !self.is_last() {
            self.index += 1;
        }
    }

    fn reset(&mut self) {
        self.index = 0;
    }

    fn seek(&mut self, index: usize) -> Result<(), PlaybackError> {
        if index >= self.total {
            return Err(PlaybackError::OutOfRange {
                index,
                total: self.total,
            });
        }
        self.index = index;
        Ok(())
    }
}

/// Playback state machine over a [`ResultStore`].
pub struct PlaybackController {
    store: Arc<ResultStore>,
    config: PlaybackConfig,
    cursor: PlaybackCursor,
    state: PlaybackState,
    dwell_until: Option<Instant>,
    loops: u32,
}

impl PlaybackController {
    pub fn new(store: Arc<ResultStore>, config: PlaybackConfig) -> Self {
        let cursor = PlaybackCursor::new(store.len());
        Self {
            store,
            config,
            cursor,
            state: PlaybackState::Idle,
            dwell_until: None,
            loops: 0,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    /// Times playback wrapped around to the first slide.
    pub fn loops(&self) -> u32 {
        self.loops
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// The slide on screen, if any.
    pub fn current_slide(&self) -> Option<SlideView> {
        match self.state {
            PlaybackState::Showing { index } => self.store.get(index).map(|r| SlideView::from(&r)),
            _ => None,
        }
    }

    /// Move the state machine forward as far as `now` allows.
    ///
    /// Advances at most one slot per call, and calling again with the same
    /// `now` and an unchanged store is a no-op.
    pub fn try_advance(&mut self, now: Instant) -> PlaybackTransition {
        match self.state {
            PlaybackState::Idle => self.enter(0, now),
            PlaybackState::Buffering { index } => {
                if self.store.contains(index) {
                    self.enter(index, now)
                } else {
                    PlaybackTransition::Unchanged
                }
            }
            PlaybackState::Showing { .. } => {
                if self.dwell_until.is_some_and(|deadline| now < deadline) {
                    return PlaybackTransition::Unchanged;
                }

                if !self.cursor.is_last() {
                    self.cursor.advance();
                    return self.enter(self.cursor.index(), now);
                }

                // Past the last slide, but later slots may still be pending.
                if !self.store.is_sealed() && !self.store.is_closed() {
                    return PlaybackTransition::Unchanged;
                }

                match self.config.end_behavior {
                    EndBehavior::Finish => {
                        self.state = PlaybackState::Finished;
                        self.dwell_until = None;
                        PlaybackTransition::Finished
                    }
                    EndBehavior::Loop => {
                        self.loops += 1;
                        self.cursor.reset();
                        self.enter(0, now)
                    }
                }
            }
            PlaybackState::Finished => PlaybackTransition::Unchanged,
        }
    }

    /// Jump to `index` and start a fresh dwell there.
    pub fn seek(&mut self, index: usize, now: Instant) -> Result<SlideView, PlaybackError> {
        let total = self.cursor.total();
        if index >= total {
            return Err(PlaybackError::OutOfRange { index, total });
        }
        let Some(result) = self.store.get(index) else {
            return Err(PlaybackError::SlotNotReady(index));
        };

        self.cursor.seek(index)?;
        self.state = PlaybackState::Showing { index };
        self.dwell_until = Some(now + Duration::from_millis(result.dwell_hint_ms));
        Ok(SlideView::from(&result))
    }

    /// Restart from the first slide.
    pub fn replay(&mut self, now: Instant) -> PlaybackTransition {
        self.cursor.reset();
        self.enter(0, now)
    }

    /// When the driver should call [`try_advance`](Self::try_advance) next.
    /// `None` means only a command or a store change can move playback.
    pub fn next_wake(&self, now: Instant) -> Option<Instant> {
        match self.state {
            PlaybackState::Idle => Some(now),
            PlaybackState::Buffering { .. } => Some(now + self.config.poll_interval),
            PlaybackState::Showing { .. } => match self.dwell_until {
                Some(deadline) if deadline > now => Some(deadline),
                _ => Some(now + self.config.poll_interval),
            },
            PlaybackState::Finished => None,
        }
    }

    fn enter(&mut self, index: usize, now: Instant) -> PlaybackTransition {
        match self.store.get(index) {
            Some(result) => {
                self.state = PlaybackState::Showing { index };
                self.dwell_until = Some(now + Duration::from_millis(result.dwell_hint_ms));
                PlaybackTransition::Showing(SlideView::from(&result))
            }
            None => {
                if index > 0 {
                    record_buffer_stall();
                }
                self.state = PlaybackState::Buffering { index };
                self.dwell_until = None;
                PlaybackTransition::Buffering { index }
            }
        }
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state,
            slide: self.current_slide(),
            loops: self.loops,
        }
    }
}

/// What renderers observe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub slide: Option<SlideView>,
    pub loops: u32,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            state: PlaybackState::Idle,
            slide: None,
            loops: 0,
        }
    }
}

enum PlaybackCommand {
    Seek {
        index: usize,
        reply: oneshot::Sender<Result<SlideView, PlaybackError>>,
    },
    Replay,
}

/// Handle to a playback task.
///
/// Dropping the handle stops playback.
pub struct PlaybackHandle {
    snapshot: watch::Receiver<PlaybackSnapshot>,
    commands: mpsc::Sender<PlaybackCommand>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PlaybackHandle {
    /// Run `controller` on a new task. Nothing is shown until slot 0 exists;
    /// if the store closes first the task exits without showing anything.
    pub fn spawn(controller: PlaybackController) -> Self {
        let (snapshot_tx, snapshot) = watch::channel(PlaybackSnapshot::default());
        let (commands, commands_rx) = mpsc::channel(16);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let logger = RunLogger::new(controller.store.run_id(), "playback");
        let span = logger.span();
        let task = tokio::spawn(
            drive(controller, snapshot_tx, commands_rx, shutdown_rx, logger).instrument(span),
        );

        Self {
            snapshot,
            commands,
            shutdown,
            task: Some(task),
        }
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot.clone()
    }

    pub async fn seek(&self, index: usize) -> EngineResult<SlideView> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(PlaybackCommand::Seek { index, reply })
            .await
            .map_err(|_| EngineError::PlaybackStopped)?;
        let slide = response.await.map_err(|_| EngineError::PlaybackStopped)??;
        Ok(slide)
    }

    pub async fn replay(&self) -> EngineResult<()> {
        self.commands
            .send(PlaybackCommand::Replay)
            .await
            .map_err(|_| EngineError::PlaybackStopped)
    }

    /// Stop the task and wait for it to exit.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

async fn drive(
    mut controller: PlaybackController,
    snapshot: watch::Sender<PlaybackSnapshot>,
    mut commands: mpsc::Receiver<PlaybackCommand>,
    mut shutdown: watch::Receiver<bool>,
    logger: RunLogger,
) {
    let store = Arc::clone(&controller.store);

    tokio::select! {
        ready = store.wait_for(0) => {
            if !ready {
                debug!("Store closed before the first slide, playback not started");
                return;
            }
        }
        _ = shutdown.changed() => return,
    }

    logger.playback_started();
    let mut changes = store.subscribe();

    loop {
        let now = Instant::now();
        match controller.try_advance(now) {
            PlaybackTransition::Showing(slide) => {
                info!(index = slide.index, dwell_ms = slide.dwell_hint_ms, "Showing slide");
            }
            PlaybackTransition::Buffering { index } => {
                info!(index, "Buffering, waiting for segment");
            }
            PlaybackTransition::Finished => logger.playback_finished(controller.loops()),
            PlaybackTransition::Unchanged => {}
        }

        let next = controller.snapshot();
        snapshot.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });

        let wake = controller.next_wake(now);
        let sleep = async move {
            match wake {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = sleep => {}
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            command = commands.recv() => match command {
                Some(PlaybackCommand::Seek { index, reply }) => {
                    let result = controller.seek(index, Instant::now());
                    if let Err(e) = &result {
                        debug!(index, "Seek rejected: {}", e);
                    }
                    let _ = reply.send(result);
                }
                Some(PlaybackCommand::Replay) => {
                    controller.replay(Instant::now());
                }
                None => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    debug!("Playback stopped");
}
