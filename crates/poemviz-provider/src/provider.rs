//! Provider capability.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use poemviz_models::{Directive, ProviderKind};
use reqwest::header::RETRY_AFTER;
use reqwest::Response;

use crate::config::ProviderConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::imagen::ImagenProvider;
use crate::openai::OpenAiProvider;

/// One external text-to-image provider.
///
/// Implementations perform a single request attempt and return the image
/// reference (URL or data URI). Retries live in `GenerationClient`.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn generate_once(&self, directive: &Directive) -> ProviderResult<String>;
}

/// Build the concrete provider for a configuration. Selected once per run.
pub fn build_provider(config: &ProviderConfig) -> ProviderResult<Arc<dyn ImageProvider>> {
    Ok(match config {
        ProviderConfig::OpenAi(c) => Arc::new(OpenAiProvider::new(c.clone())?),
        ProviderConfig::Imagen(c) => Arc::new(ImagenProvider::new(c.clone())?),
    })
}

/// Return the body of a successful response or the classified error.
pub(crate) async fn response_body(response: Response) -> ProviderResult<String> {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let body = response.text().await?;
    if !status.is_success() {
        return Err(ProviderError::from_status(status, &body, retry_after));
    }
    Ok(body)
}
