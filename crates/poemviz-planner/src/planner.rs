//! Poem-to-segment planning.

use std::collections::BTreeSet;
use std::sync::Arc;

use poemviz_models::{
    ContinuityContext, Directive, Motion, Segment, StyleMode, StyleParameters,
};
use tracing::debug;

use crate::classifier::{KeywordClassifier, MoodClassifier};
use crate::error::{PlanError, PlanResult};
use crate::sanitize::sanitize_subject;

/// A camera/composition hint paired with the motion the renderer applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositionRule {
    pub composition: &'static str,
    pub motion: Motion,
}

/// Rotated by segment index (`index % len`), so variety needs no randomness.
pub const COMPOSITION_RULES: &[CompositionRule] = &[
    CompositionRule {
        composition: "Wide angle view, establishing the landscape, epic scale",
        motion: Motion::PanRight,
    },
    CompositionRule {
        composition: "Extreme close-up on details and texture",
        motion: Motion::ZoomIn,
    },
    CompositionRule {
        composition: "Medium view, balanced composition, rule of thirds",
        motion: Motion::ZoomOut,
    },
    CompositionRule {
        composition: "Low angle perspective, looking up",
        motion: Motion::TiltUp,
    },
    CompositionRule {
        composition: "High angle perspective, looking down",
        motion: Motion::TiltDown,
    },
    CompositionRule {
        composition: "Dynamic motion blur, fast movement",
        motion: Motion::PanLeft,
    },
    CompositionRule {
        composition: "Depth of field focus, immersive perspective",
        motion: Motion::ZoomIn,
    },
];

/// Planner configuration.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Replace safety-filter trigger words in subject text
    pub sanitize: bool,
    /// Maximum subject length in characters
    pub max_subject_chars: usize,
    /// Constraints attached to every directive
    pub constraints: Vec<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            sanitize: true,
            max_subject_chars: 800,
            constraints: vec![
                "no text".to_string(),
                "no words".to_string(),
                "no typography".to_string(),
                "no people".to_string(),
            ],
        }
    }
}

/// Turns poem text into the ordered segment list of a run.
///
/// `plan` is a pure function of its inputs: the same poem and style mode always
/// produce the same directive sequence.
#[derive(Clone)]
pub struct SegmentPlanner {
    classifier: Arc<dyn MoodClassifier>,
    config: PlannerConfig,
}

impl SegmentPlanner {
    pub fn new(classifier: Arc<dyn MoodClassifier>, config: PlannerConfig) -> Self {
        Self { classifier, config }
    }

    /// One segment per non-empty trimmed line.
    pub fn plan(&self, text: &str, style_mode: StyleMode) -> PlanResult<Vec<Segment>> {
        if text.trim().is_empty() {
            return Err(PlanError::invalid_input("poem text is empty"));
        }

        let analysis = self.classifier.classify(text);
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let mut constraints: BTreeSet<String> = self.config.constraints.iter().cloned().collect();
        if style_mode == StyleMode::Spiritual {
            constraints.insert("soft ethereal light".to_string());
        }

        let segments: Vec<Segment> = lines
            .iter()
            .enumerate()
            .map(|(index, line)| {
                let rule = COMPOSITION_RULES[index % COMPOSITION_RULES.len()];
                let continuity = match index {
                    0 => ContinuityContext::OpeningScene,
                    _ => ContinuityContext::Previous(lines[index - 1].to_string()),
                };

                Segment {
                    index,
                    source_text: line.to_string(),
                    directive: Directive {
                        subject_text: self.subject_for(line),
                        style: StyleParameters {
                            mood: analysis.mood,
                            scenery: analysis.scenery,
                            style_mode,
                            composition: rule.composition.to_string(),
                            motion: rule.motion,
                            continuity,
                        },
                        constraints: constraints.clone(),
                    },
                }
            })
            .collect();

        debug!(
            segments = segments.len(),
            mood = %analysis.mood,
            scenery = %analysis.scenery,
            style_mode = %style_mode,
            "Planned poem"
        );

        Ok(segments)
    }

    fn subject_for(&self, line: &str) -> String {
        let subject = if self.config.sanitize {
            sanitize_subject(line)
        } else {
            line.to_string()
        };
        subject.chars().take(self.config.max_subject_chars).collect()
    }
}

impl Default for SegmentPlanner {
    fn default() -> Self {
        Self::new(Arc::new(KeywordClassifier::new()), PlannerConfig::default())
    }
}
