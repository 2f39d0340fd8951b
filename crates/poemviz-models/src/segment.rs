//! Segments and generation directives.

use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Mood, Motion, Scenery, StyleMode};

/// One visual scene of a poem. Immutable once planned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    /// Playback position; equals the position in the planner's output.
    pub index: usize,
    /// The trimmed poem line this scene depicts.
    pub source_text: String,
    /// Payload handed to the image provider.
    pub directive: Directive,
}

/// What the previous scene was about, so adjacent images stay coherent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum ContinuityContext {
    /// Sentinel for the first segment.
    OpeningScene,
    /// Raw source text of the immediately preceding segment.
    Previous(String),
}

impl ContinuityContext {
    pub fn previous_text(&self) -> Option<&str> {
        match self {
            ContinuityContext::OpeningScene => None,
            ContinuityContext::Previous(text) => Some(text),
        }
    }
}

/// Stylistic and compositional parameters of a directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StyleParameters {
    pub mood: Mood,
    pub scenery: Scenery,
    pub style_mode: StyleMode,
    /// Camera/composition hint from the rotating rule set.
    pub composition: String,
    pub motion: Motion,
    pub continuity: ContinuityContext,
}

/// Opaque payload passed to a generator. Never carries credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Directive {
    pub subject_text: String,
    pub style: StyleParameters,
    /// Ordered so serialized directives are reproducible.
    pub constraints: BTreeSet<String>,
}

impl Directive {
    /// Render the directive as a single text prompt.
    pub fn prompt_text(&self) -> String {
        let context = match &self.style.continuity {
            ContinuityContext::OpeningScene => "Story context: opening scene.".to_string(),
            ContinuityContext::Previous(text) => {
                format!("Story context (previous line): \"{}\".", text)
            }
        };

        let visual_style = match self.style.style_mode {
            StyleMode::Default => self.style.mood.visual_style(),
            StyleMode::Spiritual => {
                "radiant ethereal glow, luminous colors, lush detailed nature, soft misty light"
            }
        };

        let mut prompt = format!(
            "A visual interpretation of: \"{}\". {} Visual style: {}. Setting: {}. Composition: {}.",
            self.subject_text, context, visual_style, self.style.scenery, self.style.composition
        );

        if !self.constraints.is_empty() {
            let constraints: Vec<&str> = self.constraints.iter().map(String::as_str).collect();
            prompt.push_str(" Constraints: ");
            prompt.push_str(&constraints.join(", "));
            prompt.push('.');
        }

        prompt
    }
}
