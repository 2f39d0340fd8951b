//! Gallery manifest written at the end of a run.

use std::fs;
use std::path::Path;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use poemviz_models::{GenerationResult, RunId, RunState};
use serde::Serialize;

/// Ordered list of a run's slides.
#[derive(Debug, Clone, Serialize)]
pub struct GalleryManifest {
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub run_state: RunState,
    pub total_segments: usize,
    pub slides: Vec<GenerationResult>,
}

impl GalleryManifest {
    pub fn new(
        run_id: RunId,
        run_state: RunState,
        total_segments: usize,
        slides: Vec<GenerationResult>,
    ) -> Self {
        Self {
            run_id,
            created_at: Utc::now(),
            run_state,
            total_segments,
            slides,
        }
    }

    /// Slides that fell back to the placeholder image.
    pub fn placeholder_count(&self) -> usize {
        self.slides
            .iter()
            .filter(|s| s.origin.is_placeholder())
            .count()
    }

    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("serialize gallery manifest")?;
        fs::write(path, json)
            .with_context(|| format!("write gallery manifest '{}'", path.display()))?;
        Ok(())
    }
}
