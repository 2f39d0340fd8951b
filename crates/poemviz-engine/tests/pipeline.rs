//! End-to-end runs against in-process providers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use poemviz_engine::{
    EngineConfig, EngineError, PlaybackConfig, PlaybackError, PlaybackState, RunOrchestrator,
    SchedulerConfig,
};
use poemviz_models::{
    Directive, DwellPolicy, EndBehavior, ProviderKind, ResultOrigin, RunEvent, RunState, StyleMode,
};
use poemviz_planner::SegmentPlanner;
use poemviz_provider::{
    GenerationClient, ImageProvider, ProviderError, ProviderResult, RetryPolicy, Sleeper,
};

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    Terminal,
    /// Fail transiently this many times, then succeed.
    FlakyThenSucceed(usize),
}

/// Provider whose behavior and latency are keyed by the poem line.
struct ScriptedProvider {
    kind: ProviderKind,
    default_latency: Duration,
    latency: HashMap<String, Duration>,
    behavior: HashMap<String, Behavior>,
    failures_seen: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(kind: ProviderKind, default_latency: Duration) -> Self {
        Self {
            kind,
            default_latency,
            latency: HashMap::new(),
            behavior: HashMap::new(),
            failures_seen: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    fn with_behavior(mut self, line: &str, behavior: Behavior) -> Self {
        self.behavior.insert(line.to_string(), behavior);
        self
    }

    fn with_latency(mut self, line: &str, latency: Duration) -> Self {
        self.latency.insert(line.to_string(), latency);
        self
    }
}

#[async_trait]
impl ImageProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn generate_once(&self, directive: &Directive) -> ProviderResult<String> {
        let line = directive.subject_text.clone();
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = self
            .latency
            .get(&line)
            .copied()
            .unwrap_or(self.default_latency);
        tokio::time::sleep(latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.behavior.get(&line).copied().unwrap_or(Behavior::Succeed) {
            Behavior::Succeed => Ok(format!("https://{}.test/{}.png", self.kind, line)),
            Behavior::Terminal => Err(ProviderError::ContentPolicy(format!("rejected {line}"))),
            Behavior::FlakyThenSucceed(times) => {
                let mut seen = self.failures_seen.lock().unwrap();
                let count = seen.entry(line.clone()).or_insert(0);
                if *count < times {
                    *count += 1;
                    Err(ProviderError::Server {
                        status: 503,
                        message: "overloaded".to_string(),
                    })
                } else {
                    Ok(format!("https://{}.test/{}.png", self.kind, line))
                }
            }
        }
    }
}

struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

fn client(provider: Arc<ScriptedProvider>) -> GenerationClient {
    GenerationClient::new(provider, RetryPolicy::default()).with_sleeper(Arc::new(NoSleep))
}

fn config(concurrency: usize) -> EngineConfig {
    EngineConfig {
        scheduler: SchedulerConfig {
            concurrency_limit: concurrency,
            primary_max_concurrent: concurrency,
            fallback_max_concurrent: 1,
            dwell: DwellPolicy {
                base_ms: 40,
                per_char_ms: 0,
                max_ms: 40,
            },
            ..Default::default()
        },
        playback: PlaybackConfig {
            poll_interval: Duration::from_millis(20),
            end_behavior: EndBehavior::Finish,
        },
    }
}

fn orchestrator(
    primary: Arc<ScriptedProvider>,
    fallback: Option<Arc<ScriptedProvider>>,
    concurrency: usize,
) -> RunOrchestrator {
    RunOrchestrator::new(
        SegmentPlanner::default(),
        client(primary),
        fallback.map(client),
        config(concurrency),
    )
}

const POEM: &str = "alpha\nbeta\ngamma";

#[tokio::test]
async fn test_three_lines_with_two_workers() {
    let primary = Arc::new(
        ScriptedProvider::new(ProviderKind::OpenAi, Duration::from_millis(100))
            .with_latency("line three", Duration::from_millis(300)),
    );
    let orchestrator = orchestrator(Arc::clone(&primary), None, 2);

    let mut run = orchestrator
        .start("line one\nline two\nline three", StyleMode::Default)
        .unwrap();
    let mut events = run.take_events().unwrap();

    let slide = tokio::time::timeout(Duration::from_secs(2), run.wait_for_first_slide())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(slide.index, 0);
    assert_eq!(slide.source_text, "line one");
    // Playback starts while the last scene is still generating.
    assert!(!run.store().contains(2));

    run.wait_for_generation().await.unwrap();
    assert_eq!(run.run_state(), RunState::Completed);
    assert!(primary.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert_eq!(primary.calls.load(Ordering::SeqCst), 3);

    for index in 0..3 {
        assert_eq!(run.store().write_count(index), 1);
    }

    tokio::time::timeout(Duration::from_secs(2), run.wait_for_playback_end())
        .await
        .unwrap()
        .unwrap();

    let mut progress = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let RunEvent::Progress { completed, total } = event {
            progress.push((completed, total));
        }
    }
    // Concurrent writers may publish out of order; each count appears once.
    progress.sort();
    assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);

    run.stop().await;
}

#[tokio::test]
async fn test_first_slide_waits_for_segment_zero() {
    let primary = Arc::new(
        ScriptedProvider::new(ProviderKind::OpenAi, Duration::from_millis(5))
            .with_latency("alpha", Duration::from_millis(250)),
    );
    let orchestrator = orchestrator(primary, None, 3);
    let run = orchestrator.start(POEM, StyleMode::Default).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(run.store().contains(1));
    assert!(!run.store().contains(0));
    assert_eq!(run.playback_state().state, PlaybackState::Idle);

    let slide = run.wait_for_first_slide().await.unwrap();
    assert_eq!(slide.index, 0);

    run.stop().await;
}

#[tokio::test]
async fn test_fallback_covers_failed_middle_segment() {
    let primary = Arc::new(
        ScriptedProvider::new(ProviderKind::Imagen, Duration::from_millis(10))
            .with_behavior("beta", Behavior::Terminal),
    );
    let fallback = Arc::new(ScriptedProvider::new(
        ProviderKind::OpenAi,
        Duration::from_millis(10),
    ));
    let orchestrator = orchestrator(primary, Some(Arc::clone(&fallback)), 1);

    let mut run = orchestrator.start(POEM, StyleMode::Default).unwrap();
    run.wait_for_generation().await.unwrap();

    let slot = run.store().get(1).unwrap();
    assert_eq!(slot.origin, ResultOrigin::Fallback(ProviderKind::OpenAi));
    assert_eq!(slot.image_ref, "https://openai.test/beta.png");
    assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    assert_eq!(run.store().write_count(1), 1);

    run.stop().await;
}

#[tokio::test]
async fn test_first_segment_terminal_failure_aborts_run() {
    let primary = Arc::new(
        ScriptedProvider::new(ProviderKind::OpenAi, Duration::from_millis(10))
            .with_behavior("alpha", Behavior::Terminal),
    );
    let orchestrator = orchestrator(primary, None, 2);
    let run = orchestrator.start(POEM, StyleMode::Default).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), run.wait_for_first_slide())
        .await
        .unwrap();
    assert!(matches!(result, Err(EngineError::RunAborted(_))));

    assert!(matches!(run.run_state(), RunState::Aborted { .. }));
    assert!(!run.store().contains(0));
    assert_eq!(run.playback_state().state, PlaybackState::Idle);

    let error = run.current_error().unwrap();
    assert!(!error.is_recoverable);

    run.stop().await;
}

#[tokio::test]
async fn test_later_failure_plays_placeholder() {
    let primary = Arc::new(
        ScriptedProvider::new(ProviderKind::OpenAi, Duration::from_millis(5))
            .with_behavior("gamma", Behavior::Terminal),
    );
    let orchestrator = orchestrator(primary, None, 3);

    let mut run = orchestrator.start(POEM, StyleMode::Default).unwrap();
    run.wait_for_generation().await.unwrap();

    let slot = run.store().get(2).unwrap();
    assert_eq!(slot.origin, ResultOrigin::Placeholder);
    assert_eq!(slot.source_text, "gamma");

    tokio::time::timeout(Duration::from_secs(2), run.wait_for_playback_end())
        .await
        .unwrap()
        .unwrap();

    run.stop().await;
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let primary = Arc::new(
        ScriptedProvider::new(ProviderKind::OpenAi, Duration::from_millis(5))
            .with_behavior("alpha", Behavior::FlakyThenSucceed(2)),
    );
    let orchestrator = orchestrator(Arc::clone(&primary), None, 1);

    let mut run = orchestrator.start(POEM, StyleMode::Default).unwrap();
    run.wait_for_generation().await.unwrap();

    assert_eq!(
        run.store().get(0).map(|r| r.origin),
        Some(ResultOrigin::Primary(ProviderKind::OpenAi))
    );
    // Two failed attempts plus one success for "alpha", one call each for the rest.
    assert_eq!(primary.calls.load(Ordering::SeqCst), 5);

    run.stop().await;
}

#[tokio::test]
async fn test_long_poem_stays_within_limit() {
    let lines: Vec<String> = (0..20).map(|i| format!("verse number {i}")).collect();
    let poem = lines.join("\n");

    let mut provider = ScriptedProvider::new(ProviderKind::OpenAi, Duration::from_millis(15));
    for (i, line) in lines.iter().enumerate() {
        provider = provider.with_latency(line, Duration::from_millis(5 + (i as u64 * 7) % 30));
    }
    let primary = Arc::new(provider);
    let orchestrator = orchestrator(Arc::clone(&primary), None, 4);

    let mut run = orchestrator.start(&poem, StyleMode::Default).unwrap();
    run.wait_for_generation().await.unwrap();

    assert!(primary.max_in_flight.load(Ordering::SeqCst) <= 4);
    assert_eq!(run.store().completed_count(), 20);
    for index in 0..20 {
        assert_eq!(run.store().write_count(index), 1);
    }
    assert_eq!(run.job_state().active_workers, 0);

    run.stop().await;
}

#[tokio::test]
async fn test_stop_abandons_in_flight_requests() {
    let primary = Arc::new(ScriptedProvider::new(
        ProviderKind::OpenAi,
        Duration::from_secs(60),
    ));
    let orchestrator = orchestrator(primary, None, 2);
    let run = orchestrator.start(POEM, StyleMode::Default).unwrap();
    let store = Arc::clone(run.store());

    tokio::time::sleep(Duration::from_millis(20)).await;
    let state = tokio::time::timeout(Duration::from_secs(2), run.stop())
        .await
        .unwrap();

    assert!(matches!(state, RunState::Aborted { .. }));
    assert!(store.is_closed());
    assert_eq!(store.completed_count(), 0);
}

#[tokio::test]
async fn test_seek_after_playback_finishes() {
    let primary = Arc::new(ScriptedProvider::new(
        ProviderKind::OpenAi,
        Duration::from_millis(5),
    ));
    let orchestrator = orchestrator(primary, None, 3);

    let mut run = orchestrator.start(POEM, StyleMode::Default).unwrap();
    run.wait_for_generation().await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), run.wait_for_playback_end())
        .await
        .unwrap()
        .unwrap();

    let slide = run.seek(1).await.unwrap();
    assert_eq!(slide.source_text, "beta");
    assert!(matches!(
        run.seek(7).await,
        Err(EngineError::Playback(PlaybackError::OutOfRange { index: 7, total: 3 }))
    ));

    run.replay().await.unwrap();
    run.stop().await;
}
