//! OpenAI-style images endpoint.

use async_trait::async_trait;
use poemviz_models::{Directive, ProviderKind};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OpenAiConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::image_ref::data_uri;
use crate::provider::{response_body, ImageProvider};

#[derive(Debug, Serialize)]
struct ImagesRequest<'a> {
    model: &'a str,
    prompt: String,
    n: u32,
    size: &'a str,
    quality: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    url: Option<String>,
    b64_json: Option<String>,
}

/// Client for `POST /v1/images/generations`.
pub struct OpenAiProvider {
    http: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> ProviderResult<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(ProviderError::Network)?;

        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/images/generations",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ImageProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn generate_once(&self, directive: &Directive) -> ProviderResult<String> {
        let request = ImagesRequest {
            model: &self.config.model,
            prompt: directive.prompt_text(),
            n: 1,
            size: &self.config.size,
            quality: &self.config.quality,
            response_format: &self.config.response_format,
        };

        debug!(model = %self.config.model, "Sending image request to {}", self.endpoint());

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let body = response_body(response).await?;
        let parsed: ImagesResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::invalid_response(format!("images response: {}", e)))?;

        let datum = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::invalid_response("no image in response"))?;

        match (datum.url, datum.b64_json) {
            (Some(url), _) if !url.is_empty() => Ok(url),
            (_, Some(b64)) => data_uri("image/png", &b64),
            _ => Err(ProviderError::invalid_response(
                "image entry has neither url nor b64_json",
            )),
        }
    }
}
