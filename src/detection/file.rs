use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::DynamicImage;
use tracing::debug;

use super::{DefectDetector, DetectionBatch, parse_document};
use crate::error::DetectorError;
use crate::models::ImageMetrics;

/// Reads detections written by an external detector run.
///
/// The file holds either a JSON array of raw detections or an object with a
/// `detections` array. It is read on every call.
#[derive(Debug, Clone)]
pub struct FileDetector {
    path: PathBuf,
}

impl FileDetector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DefectDetector for FileDetector {
    async fn detect(&self, image: &DynamicImage) -> Result<DetectionBatch, DetectorError> {
        let contents = tokio::fs::read(&self.path)
            .await
            .map_err(|source| DetectorError::Io {
                path: self.path.clone(),
                source,
            })?;
        let entries = parse_document(&contents)?;

        debug!(
            "Read {} detections from {}",
            entries.len(),
            self.path.display()
        );

        Ok(DetectionBatch::from_entries(entries, ImageMetrics::of(image)))
    }

    fn name(&self) -> &str {
        "detections file"
    }
}
