//! Poem visualizer command-line entry point.

mod config;
mod manifest;
mod presenter;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;
use poemviz_engine::{EngineConfig, PlaybackConfig, Run, RunOrchestrator, SchedulerConfig};
use poemviz_models::{EndBehavior, ProviderKind, ProviderParseError, StyleMode};
use poemviz_planner::SegmentPlanner;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Settings;
use crate::manifest::GalleryManifest;
use crate::presenter::{format_gallery, TerminalPresenter};

/// Turn a poem into a slideshow of generated images, one scene per line.
#[derive(Parser, Debug)]
#[command(name = "poemviz", version)]
struct Cli {
    /// Poem text; lines are separated by newlines.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    text: Option<String>,

    /// Read the poem from a file.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Primary image provider.
    #[arg(long, default_value = "openai")]
    provider: ProviderKind,

    /// Provider tried after the primary gives up on a scene.
    #[arg(long, default_value = "none", value_parser = parse_fallback)]
    fallback: Fallback,

    /// Visual style mode (default or spiritual).
    #[arg(long, default_value = "default")]
    style_mode: StyleMode,

    /// What happens after the last scene (finish or loop).
    #[arg(long, default_value = "finish")]
    end: EndBehavior,

    /// Number of scenes generated at once.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Write the end-of-run gallery as JSON.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Show the placeholder while the fallback provider is still working.
    #[arg(long)]
    eager_placeholder: bool,
}

#[derive(Debug, Clone, Copy)]
struct Fallback(Option<ProviderKind>);

fn parse_fallback(s: &str) -> Result<Fallback, ProviderParseError> {
    if s.eq_ignore_ascii_case("none") {
        return Ok(Fallback(None));
    }
    s.parse().map(|kind| Fallback(Some(kind)))
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Colored output for terminals, JSON when `LOG_FORMAT=json`.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let text = read_poem(&cli)?;
    let settings = Settings::from_env();

    let primary_kind = cli.provider;
    let fallback_kind = cli.fallback.0.filter(|kind| *kind != primary_kind);
    if cli.fallback.0.is_some() && fallback_kind.is_none() {
        warn!("Fallback provider is the same as the primary, ignoring it");
    }

    let primary = settings
        .client(primary_kind)
        .context("configure primary provider")?;
    let fallback = fallback_kind
        .map(|kind| settings.client(kind))
        .transpose()
        .context("configure fallback provider")?;

    let mut scheduler = SchedulerConfig::for_providers(primary_kind, fallback_kind);
    if let Some(limit) = cli.concurrency.or(settings.concurrency) {
        scheduler = scheduler.with_concurrency_limit(limit);
    }
    scheduler.placeholder_url = settings.placeholder_url.clone();
    scheduler.eager_placeholder = cli.eager_placeholder;

    let config = EngineConfig {
        scheduler,
        playback: PlaybackConfig {
            end_behavior: cli.end,
            ..Default::default()
        },
    };
    info!(
        provider = %primary_kind,
        fallback = fallback_kind.map(|k| k.as_str()).unwrap_or("none"),
        concurrency = config.scheduler.concurrency_limit,
        style_mode = %cli.style_mode,
        "Starting poem visualizer"
    );

    let orchestrator = RunOrchestrator::new(SegmentPlanner::default(), primary, fallback, config);
    let mut run = orchestrator.start(&text, cli.style_mode)?;
    let presenter =
        TerminalPresenter::spawn(run.take_events(), run.subscribe_playback(), run.segments().len());

    let outcome = tokio::select! {
        result = play(&mut run, cli.end) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping run");
            Ok(())
        }
    };

    let gallery = run.gallery();
    if outcome.is_ok() && cli.end == EndBehavior::Finish {
        println!();
        for line in format_gallery(&gallery) {
            println!("{}", line);
        }
    }

    if let Some(path) = &cli.manifest {
        let manifest = GalleryManifest::new(
            run.run_id().clone(),
            run.run_state(),
            run.segments().len(),
            gallery,
        );
        manifest.write_to(path)?;
        info!(
            path = %path.display(),
            slides = manifest.slides.len(),
            placeholders = manifest.placeholder_count(),
            "Gallery manifest written"
        );
    }

    presenter.stop();
    run.stop().await;
    outcome
}

fn read_poem(cli: &Cli) -> anyhow::Result<String> {
    match (&cli.text, &cli.file) {
        (Some(text), _) => Ok(text.clone()),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("read poem '{}'", path.display())),
        (None, None) => anyhow::bail!("either --text or --file is required"),
    }
}

/// Play the run to its end. In loop mode this only returns on failure.
async fn play(run: &mut Run, end: EndBehavior) -> anyhow::Result<()> {
    run.wait_for_first_slide().await?;
    run.wait_for_generation().await?;

    match end {
        EndBehavior::Finish => {
            run.wait_for_playback_end().await?;
            Ok(())
        }
        EndBehavior::Loop => std::future::pending().await,
    }
}
