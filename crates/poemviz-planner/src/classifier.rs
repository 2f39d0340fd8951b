//! Mood classification.
//!
//! The planner only needs a small label set; how it is scored is up to the
//! implementation behind [`MoodClassifier`].

use std::collections::HashMap;

use poemviz_models::{Mood, MoodAnalysis, Scenery};

/// Maps poem text to a mood label set.
pub trait MoodClassifier: Send + Sync {
    fn classify(&self, text: &str) -> MoodAnalysis;
}

const MOOD_KEYWORDS: &[(Mood, &[&str])] = &[
    (
        Mood::Dark,
        &["dark", "night", "shadow", "death", "gloom", "black", "fear", "cold", "void", "deep"],
    ),
    (
        Mood::Romantic,
        &["love", "heart", "kiss", "rose", "passion", "soul", "forever", "sweet", "lovely"],
    ),
    (
        Mood::Nature,
        &["tree", "flower", "sky", "river", "mountain", "sun", "rain", "wind", "green", "woods"],
    ),
    (
        Mood::Energetic,
        &["fire", "burn", "run", "fast", "power", "storm", "lightning", "wild"],
    ),
    (
        Mood::Melancholy,
        &["tear", "sad", "cry", "lost", "alone", "grey", "pain", "memory", "sleep"],
    ),
];

const SCENERY_KEYWORDS: &[(Scenery, &[&str])] = &[
    (
        Scenery::Forest,
        &["tree", "woods", "forest", "leaf", "green", "pine", "branch"],
    ),
    (
        Scenery::Ocean,
        &["sea", "ocean", "wave", "water", "blue", "tide", "beach", "sand"],
    ),
    (
        Scenery::Space,
        &["star", "moon", "planet", "space", "galaxy", "void", "sky", "night"],
    ),
    (
        Scenery::Desert,
        &["sand", "desert", "hot", "sun", "dry", "dune", "dust"],
    ),
    (
        Scenery::Snow,
        &["snow", "ice", "cold", "white", "winter", "frost", "freeze"],
    ),
];

/// Keyword-frequency classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl MoodClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> MoodAnalysis {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .collect();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for word in &words {
            *counts.entry(word).or_default() += 1;
        }

        let mood = dominant(MOOD_KEYWORDS, &counts).unwrap_or(Mood::Neutral);
        let scenery = dominant(SCENERY_KEYWORDS, &counts).unwrap_or(match mood {
            Mood::Dark | Mood::Nature => Scenery::Forest,
            _ => Scenery::Space,
        });

        MoodAnalysis {
            mood,
            scenery,
            tempo: tempo(text),
        }
    }
}

/// Highest-scoring category; ties go to the earlier entry. `None` when nothing matched.
fn dominant<T: Copy>(table: &[(T, &[&str])], counts: &HashMap<&str, usize>) -> Option<T> {
    let mut best: Option<(T, usize)> = None;
    for (label, keywords) in table {
        let score: usize = keywords
            .iter()
            .map(|k| counts.get(k).copied().unwrap_or(0))
            .sum();
        if score > best.map(|(_, s)| s).unwrap_or(0) {
            best = Some((*label, score));
        }
    }
    best.map(|(label, _)| label)
}

/// Short words read faster; heavy punctuation reads slower.
fn tempo(text: &str) -> f32 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.5;
    }

    let avg_len =
        words.iter().map(|w| w.chars().count()).sum::<usize>() as f32 / words.len() as f32;
    let punctuation = text
        .chars()
        .filter(|c| matches!(c, '.' | ',' | ';' | '!' | '?'))
        .count() as f32;

    let mut tempo: f32 = 0.5;
    if avg_len < 4.0 {
        tempo += 0.2;
    }
    if avg_len > 6.0 {
        tempo -= 0.2;
    }
    if punctuation / words.len() as f32 > 0.2 {
        tempo -= 0.2;
    }
    tempo.clamp(0.1, 1.0)
}
