//! Terminal presenter: prints each slide as it comes on screen and reports
//! generation progress through tracing.

use poemviz_engine::{PlaybackSnapshot, PlaybackState};
use poemviz_models::{GenerationResult, RunEvent, SlideView};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One caption line for a slide.
pub fn format_slide(slide: &SlideView, total: usize) -> String {
    format!(
        "[{}/{}] {}  ({}, {:.1}s)  {}",
        slide.index + 1,
        total,
        slide.source_text,
        slide.motion.as_str(),
        slide.dwell_hint_ms as f64 / 1000.0,
        short_ref(&slide.image_ref)
    )
}

/// One line per stored slide, in playback order.
pub fn format_gallery(results: &[GenerationResult]) -> Vec<String> {
    results
        .iter()
        .map(|r| {
            let marker = if r.origin.is_placeholder() { " (placeholder)" } else { "" };
            format!(
                "{:>3}. {}{}  {}",
                r.index + 1,
                r.source_text,
                marker,
                short_ref(&r.image_ref)
            )
        })
        .collect()
}

/// Data URIs are far too long for a terminal line.
fn short_ref(image_ref: &str) -> String {
    match image_ref.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => {
            format!("{};base64,<{} bytes>", prefix, data.len())
        }
        _ => image_ref.to_string(),
    }
}

/// Background task rendering a run to the terminal.
pub struct TerminalPresenter {
    task: JoinHandle<()>,
}

impl TerminalPresenter {
    pub fn spawn(
        events: Option<broadcast::Receiver<RunEvent>>,
        playback: watch::Receiver<PlaybackSnapshot>,
        total: usize,
    ) -> Self {
        let task = tokio::spawn(present(events, playback, total));
        Self { task }
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

async fn present(
    mut events: Option<broadcast::Receiver<RunEvent>>,
    mut playback: watch::Receiver<PlaybackSnapshot>,
    total: usize,
) {
    let mut last_state = PlaybackState::Idle;
    let mut last_slide: Option<SlideView> = None;

    loop {
        tokio::select! {
            event = recv_event(&mut events) => match event {
                Some(event) => report_event(&event),
                None => {}
            },
            changed = playback.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = playback.borrow_and_update().clone();

                if snapshot.slide != last_slide {
                    if let Some(slide) = &snapshot.slide {
                        println!("{}", format_slide(slide, total));
                    }
                    last_slide = snapshot.slide.clone();
                }

                if snapshot.state != last_state {
                    if let PlaybackState::Buffering { index } = snapshot.state {
                        info!(index, "Buffering, scene {} is still generating", index + 1);
                    }
                    last_state = snapshot.state;
                }
            }
        }
    }
}

/// Next event, or `None` once the channel closes. The receiver is dropped
/// then, and later calls never resolve.
async fn recv_event(events: &mut Option<broadcast::Receiver<RunEvent>>) -> Option<RunEvent> {
    let Some(receiver) = events.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Presenter fell behind on run events");
            }
            Err(broadcast::error::RecvError::Closed) => {
                *events = None;
                return None;
            }
        }
    }
}

fn report_event(event: &RunEvent) {
    match event {
        RunEvent::Started { run_id, total } => {
            info!(run_id = %run_id, total, "Generating {} scenes", total);
        }
        RunEvent::Progress { completed, total } => {
            info!(
                completed,
                total,
                percent = event.percent().unwrap_or(0),
                "Generation progress"
            );
        }
        RunEvent::SegmentReady { index, origin } if origin.is_placeholder() => {
            warn!(index, "Scene {} uses the placeholder image", index + 1);
        }
        RunEvent::Completed { run_id } => {
            info!(run_id = %run_id, "All scenes generated");
        }
        RunEvent::Aborted { message, .. } => {
            warn!("Generation aborted: {}", message);
        }
        RunEvent::SegmentReady { .. } => {}
    }
}
