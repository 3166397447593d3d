use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::{DefectDetector, DetectionBatch, parse_document};
use crate::error::DetectorError;
use crate::models::ImageMetrics;

/// Detector served over HTTP by an inference sidecar.
///
/// The image is posted as PNG; the response is a JSON document with a
/// `detections` array (or a bare array).
#[derive(Debug, Clone)]
pub struct HttpDetector {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpDetector {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, DetectorError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("infrascan/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

pub(crate) fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

#[async_trait]
impl DefectDetector for HttpDetector {
    async fn detect(&self, image: &DynamicImage) -> Result<DetectionBatch, DetectorError> {
        let body = encode_png(image)?;

        debug!("Posting {} byte image to {}", body.len(), self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "image/png")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    DetectorError::Unavailable(e.to_string())
                } else {
                    DetectorError::Http(e)
                }
            })?
            .error_for_status()?;

        let bytes = response.bytes().await?;
        let entries = parse_document(&bytes)?;

        Ok(DetectionBatch::from_entries(entries, ImageMetrics::of(image)))
    }

    fn name(&self) -> &str {
        "http detector"
    }
}
