use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;

use super::model::{ModelLoader, VisionModel};
use crate::config::ModelEndpointConfig;
use crate::detection::http::encode_png;
use crate::error::ModelError;

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

/// Vision-language model served by an HTTP sidecar.
///
/// Each generation posts the region as PNG to the endpoint with the prompt in
/// the `prompt` query parameter and expects `{"text": "..."}` back.
#[derive(Debug, Clone)]
pub struct HttpVisionModel {
    endpoint: String,
    client: reqwest::Client,
}

#[async_trait]
impl VisionModel for HttpVisionModel {
    async fn generate(&self, prompt: &str, region: &DynamicImage) -> Result<String, ModelError> {
        let body = encode_png(region)?;
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("prompt", prompt)])
            .header(CONTENT_TYPE, "image/png")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        let generated: GenerateResponse = response.json().await?;
        Ok(generated.text)
    }
}

/// Builds the HTTP client for [`HttpVisionModel`] on first use
#[derive(Debug, Clone)]
pub struct HttpModelLoader {
    config: ModelEndpointConfig,
}

impl HttpModelLoader {
    pub fn new(config: ModelEndpointConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModelLoader for HttpModelLoader {
    async fn load(&self) -> Result<Arc<dyn VisionModel>, ModelError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("infrascan/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| ModelError::Load(e.to_string()))?;
        Ok(Arc::new(HttpVisionModel {
            endpoint: self.config.endpoint.clone(),
            client,
        }))
    }

    fn describe(&self) -> String {
        format!("http model at {}", self.config.endpoint)
    }
}
