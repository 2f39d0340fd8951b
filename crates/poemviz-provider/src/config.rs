//! Provider configuration.
//!
//! Values arrive fully resolved; nothing here reads the environment.

use std::fmt;
use std::time::Duration;

use poemviz_models::ProviderKind;

/// Settings for an OpenAI-style images endpoint.
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// Base URL without trailing slash
    pub base_url: String,
    pub model: String,
    pub size: String,
    pub quality: String,
    /// `url` or `b64_json`
    pub response_format: String,
    pub connect_timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com".to_string(),
            model: "dall-e-3".to_string(),
            size: "1024x1024".to_string(),
            quality: "standard".to_string(),
            response_format: "url".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("size", &self.size)
            .field("quality", &self.quality)
            .field("response_format", &self.response_format)
            .finish()
    }
}

/// Settings for a Vertex Imagen-style predict endpoint.
#[derive(Clone)]
pub struct ImagenConfig {
    pub api_key: String,
    pub project_id: String,
    pub location: String,
    pub model_id: String,
    /// Overrides `https://{location}-aiplatform.googleapis.com`
    pub base_url: Option<String>,
    pub aspect_ratio: String,
    pub sample_count: u32,
    pub negative_prompt: Option<String>,
    pub connect_timeout: Duration,
}

impl ImagenConfig {
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            ..Default::default()
        }
    }

    pub fn endpoint(&self) -> String {
        let base = self
            .base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com", self.location));
        format!(
            "{}/v1beta1/projects/{}/locations/{}/publishers/google/models/{}:predict",
            base.trim_end_matches('/'),
            self.project_id,
            self.location,
            self.model_id
        )
    }
}

impl Default for ImagenConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            project_id: String::new(),
            location: "us-central1".to_string(),
            model_id: "imagen-3.0-generate-001".to_string(),
            base_url: None,
            aspect_ratio: "1:1".to_string(),
            sample_count: 1,
            negative_prompt: Some(
                "text, words, letters, typography, watermark, signature, logo, subtitles"
                    .to_string(),
            ),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for ImagenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagenConfig")
            .field("api_key", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("location", &self.location)
            .field("model_id", &self.model_id)
            .field("base_url", &self.base_url)
            .field("aspect_ratio", &self.aspect_ratio)
            .finish()
    }
}

/// Resolved configuration for one provider.
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    OpenAi(OpenAiConfig),
    Imagen(ImagenConfig),
}

impl ProviderConfig {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderConfig::OpenAi(_) => ProviderKind::OpenAi,
            ProviderConfig::Imagen(_) => ProviderKind::Imagen,
        }
    }
}
