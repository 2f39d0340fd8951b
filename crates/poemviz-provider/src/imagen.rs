//! Vertex Imagen-style predict endpoint.

use async_trait::async_trait;
use poemviz_models::{Directive, ProviderKind};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ImagenConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::image_ref::data_uri;
use crate::provider::{response_body, ImageProvider};

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: Vec<Instance>,
    parameters: Parameters<'a>,
}

#[derive(Debug, Serialize)]
struct Instance {
    prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters<'a> {
    sample_count: u32,
    aspect_ratio: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

/// Client for the Imagen `:predict` endpoint. Always returns a data URI.
pub struct ImagenProvider {
    http: Client,
    config: ImagenConfig,
}

impl ImagenProvider {
    pub fn new(config: ImagenConfig) -> ProviderResult<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(ProviderError::Network)?;

        Ok(Self { http, config })
    }
}

#[async_trait]
impl ImageProvider for ImagenProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Imagen
    }

    async fn generate_once(&self, directive: &Directive) -> ProviderResult<String> {
        let request = PredictRequest {
            instances: vec![Instance {
                prompt: directive.prompt_text(),
            }],
            parameters: Parameters {
                sample_count: self.config.sample_count,
                aspect_ratio: &self.config.aspect_ratio,
                negative_prompt: self.config.negative_prompt.as_deref(),
            },
        };

        let url = self.config.endpoint();
        debug!(model = %self.config.model_id, "Sending predict request to {}", url);

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        let body = response_body(response).await?;
        let parsed: PredictResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::invalid_response(format!("predict response: {}", e)))?;

        // Imagen drops predictions filtered by its safety settings instead of erroring.
        let prediction = parsed.predictions.into_iter().next().ok_or_else(|| {
            ProviderError::ContentPolicy("no prediction returned (filtered by safety settings)".into())
        })?;

        let bytes = prediction
            .bytes_base64_encoded
            .ok_or_else(|| ProviderError::invalid_response("prediction has no image bytes"))?;
        let mime = prediction.mime_type.unwrap_or_else(|| "image/png".to_string());

        data_uri(&mime, &bytes)
    }
}
