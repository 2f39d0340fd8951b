//! Settings resolved from the environment.

use std::time::Duration;

use poemviz_engine::config::DEFAULT_PLACEHOLDER_URL;
use poemviz_models::ProviderKind;
use poemviz_provider::{
    build_provider, GenerationClient, ImagenConfig, OpenAiConfig, ProviderConfig, ProviderError,
    RetryPolicy,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("The {provider} provider needs {var} to be set")]
    MissingCredential {
        provider: ProviderKind,
        var: &'static str,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// CLI settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Present when `OPENAI_API_KEY` is set
    pub openai: Option<OpenAiConfig>,
    /// Present when both `GOOGLE_API_KEY` and `GOOGLE_PROJECT_ID` are set
    pub imagen: Option<ImagenConfig>,
    /// Worker count override; provider defaults apply otherwise
    pub concurrency: Option<usize>,
    pub max_attempts: u32,
    pub request_timeout: Duration,
    pub placeholder_url: String,
}

impl Settings {
    /// Create settings from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create settings from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let openai = var("OPENAI_API_KEY").map(|api_key| {
            let defaults = OpenAiConfig::default();
            OpenAiConfig {
                api_key,
                base_url: var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
                model: var("OPENAI_IMAGE_MODEL").unwrap_or(defaults.model),
                size: var("OPENAI_IMAGE_SIZE").unwrap_or(defaults.size),
                quality: var("OPENAI_IMAGE_QUALITY").unwrap_or(defaults.quality),
                ..defaults
            }
        });

        let imagen = match (var("GOOGLE_API_KEY"), var("GOOGLE_PROJECT_ID")) {
            (Some(api_key), Some(project_id)) => {
                let defaults = ImagenConfig::default();
                Some(ImagenConfig {
                    api_key,
                    project_id,
                    location: var("GOOGLE_LOCATION").unwrap_or(defaults.location),
                    model_id: var("GOOGLE_MODEL_ID").unwrap_or(defaults.model_id),
                    base_url: var("GOOGLE_BASE_URL"),
                    ..defaults
                })
            }
            _ => None,
        };

        let defaults = RetryPolicy::default();

        Self {
            openai,
            imagen,
            concurrency: var("POEMVIZ_CONCURRENCY").and_then(|s| s.parse().ok()),
            max_attempts: var("POEMVIZ_MAX_ATTEMPTS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_attempts),
            request_timeout: var("POEMVIZ_REQUEST_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            placeholder_url: var("POEMVIZ_PLACEHOLDER_URL")
                .unwrap_or_else(|| DEFAULT_PLACEHOLDER_URL.to_string()),
        }
    }

    pub fn provider_config(&self, kind: ProviderKind) -> Result<ProviderConfig, ConfigError> {
        match kind {
            ProviderKind::OpenAi => self
                .openai
                .clone()
                .map(ProviderConfig::OpenAi)
                .ok_or(ConfigError::MissingCredential {
                    provider: kind,
                    var: "OPENAI_API_KEY",
                }),
            ProviderKind::Imagen => self
                .imagen
                .clone()
                .map(ProviderConfig::Imagen)
                .ok_or(ConfigError::MissingCredential {
                    provider: kind,
                    var: "GOOGLE_API_KEY and GOOGLE_PROJECT_ID",
                }),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_request_timeout(self.request_timeout)
    }

    /// Build a generation client for `kind`.
    pub fn client(&self, kind: ProviderKind) -> Result<GenerationClient, ConfigError> {
        let provider = build_provider(&self.provider_config(kind)?)?;
        Ok(GenerationClient::new(provider, self.retry_policy()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_credentials() {
        let settings = settings(&[]);

        assert!(settings.openai.is_none());
        assert!(settings.imagen.is_none());
        assert_eq!(settings.concurrency, None);
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.placeholder_url, DEFAULT_PLACEHOLDER_URL);
        assert!(matches!(
            settings.provider_config(ProviderKind::OpenAi),
            Err(ConfigError::MissingCredential { var: "OPENAI_API_KEY", .. })
        ));
    }

    #[test]
    fn test_openai_overrides() {
        let settings = settings(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_IMAGE_MODEL", "dall-e-2"),
            ("OPENAI_IMAGE_SIZE", "512x512"),
        ]);

        let openai = settings.openai.unwrap();
        assert_eq!(openai.api_key, "sk-test");
        assert_eq!(openai.model, "dall-e-2");
        assert_eq!(openai.size, "512x512");
        assert_eq!(openai.quality, "standard");
        assert_eq!(openai.base_url, "https://api.openai.com");
    }

    #[test]
    fn test_imagen_needs_project() {
        let settings = settings(&[("GOOGLE_API_KEY", "g-key")]);
        assert!(settings.imagen.is_none());

        let settings = settings_with_project();
        let imagen = settings.imagen.unwrap();
        assert_eq!(imagen.project_id, "poems");
        assert_eq!(imagen.location, "europe-west4");
        assert_eq!(imagen.model_id, "imagen-3.0-generate-001");
    }

    fn settings_with_project() -> Settings {
        settings(&[
            ("GOOGLE_API_KEY", "g-key"),
            ("GOOGLE_PROJECT_ID", "poems"),
            ("GOOGLE_LOCATION", "europe-west4"),
        ])
    }

    #[test]
    fn test_blank_values_ignored() {
        let settings = settings(&[
            ("OPENAI_API_KEY", "  "),
            ("POEMVIZ_MAX_ATTEMPTS", "5"),
            ("POEMVIZ_CONCURRENCY", "not-a-number"),
        ]);

        assert!(settings.openai.is_none());
        assert_eq!(settings.max_attempts, 5);
        assert_eq!(settings.concurrency, None);
    }

    #[test]
    fn test_retry_policy_from_settings() {
        let settings = settings(&[
            ("POEMVIZ_MAX_ATTEMPTS", "0"),
            ("POEMVIZ_REQUEST_TIMEOUT_SECS", "12"),
        ]);

        let policy = settings.retry_policy();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.request_timeout, Duration::from_secs(12));
    }
}
