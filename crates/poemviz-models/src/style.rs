//! Mood, scenery, motion and style mode definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Dominant mood of a poem.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Dark,
    Romantic,
    Nature,
    Energetic,
    Melancholy,
    #[default]
    Neutral,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Dark => "dark",
            Mood::Romantic => "romantic",
            Mood::Nature => "nature",
            Mood::Energetic => "energetic",
            Mood::Melancholy => "melancholy",
            Mood::Neutral => "neutral",
        }
    }

    /// Painting style used to keep every scene of a run visually consistent.
    pub fn visual_style(&self) -> &'static str {
        match self {
            Mood::Dark => "moody atmospheric oil painting with deep shadows and rich colors",
            Mood::Romantic => "soft watercolor with warm tones and a dreamy atmosphere",
            Mood::Nature => "impressionist landscape with natural colors and loose brushwork",
            Mood::Energetic => "bold expressive painting with dynamic color and brushstrokes",
            Mood::Melancholy => "contemplative painting in muted blue-grey tones",
            Mood::Neutral => "serene landscape painting with soft colors",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Dominant setting of a poem.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Scenery {
    #[default]
    Forest,
    Ocean,
    Space,
    Desert,
    Snow,
}

impl Scenery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenery::Forest => "forest",
            Scenery::Ocean => "ocean",
            Scenery::Space => "space",
            Scenery::Desert => "desert",
            Scenery::Snow => "snow",
        }
    }
}

impl fmt::Display for Scenery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of a mood classifier for a whole poem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MoodAnalysis {
    pub mood: Mood,
    pub scenery: Scenery,
    /// Reading tempo in `[0.1, 1.0]`; higher is faster.
    pub tempo: f32,
}

impl Default for MoodAnalysis {
    fn default() -> Self {
        Self {
            mood: Mood::Neutral,
            scenery: Scenery::Space,
            tempo: 0.5,
        }
    }
}

/// Camera motion applied by the renderer while a slide is on screen.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Motion {
    PanRight,
    PanLeft,
    #[default]
    ZoomIn,
    ZoomOut,
    TiltUp,
    TiltDown,
}

impl Motion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Motion::PanRight => "pan_right",
            Motion::PanLeft => "pan_left",
            Motion::ZoomIn => "zoom_in",
            Motion::ZoomOut => "zoom_out",
            Motion::TiltUp => "tilt_up",
            Motion::TiltDown => "tilt_down",
        }
    }
}

/// Visual style mode selected by the user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum StyleMode {
    #[default]
    Default,
    /// Luminous, ethereal rendering (the alternate mood).
    Spiritual,
}

impl StyleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StyleMode::Default => "default",
            StyleMode::Spiritual => "spiritual",
        }
    }
}

impl fmt::Display for StyleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StyleMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(StyleMode::Default),
            "spiritual" | "alternate-mood" | "alternate_mood" => Ok(StyleMode::Spiritual),
            _ => Err(ParseEnumError::new("style mode", s)),
        }
    }
}

/// What playback does after the last segment's dwell expires.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum EndBehavior {
    /// Stop and show the end-of-run gallery.
    #[default]
    Finish,
    /// Reset the cursor to the first segment and keep playing.
    Loop,
}

impl FromStr for EndBehavior {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "finish" | "gallery" => Ok(EndBehavior::Finish),
            "loop" => Ok(EndBehavior::Loop),
            _ => Err(ParseEnumError::new("end behavior", s)),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_mode_parse() {
        assert_eq!("default".parse::<StyleMode>().unwrap(), StyleMode::Default);
        assert_eq!("Spiritual".parse::<StyleMode>().unwrap(), StyleMode::Spiritual);
        assert_eq!(
            "alternate-mood".parse::<StyleMode>().unwrap(),
            StyleMode::Spiritual
        );
        assert!("baroque".parse::<StyleMode>().is_err());
    }

    #[test]
    fn test_end_behavior_parse() {
        assert_eq!("loop".parse::<EndBehavior>().unwrap(), EndBehavior::Loop);
        assert_eq!("gallery".parse::<EndBehavior>().unwrap(), EndBehavior::Finish);
        assert!("rewind".parse::<EndBehavior>().is_err());
    }

    #[test]
    fn test_mood_serialization() {
        let json = serde_json::to_string(&Mood::Melancholy).unwrap();
        assert_eq!(json, "\"melancholy\"");
    }
}
