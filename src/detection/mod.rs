//! Detection adapters: the boundary to the external defect detector.
//!
//! A detector turns an image into raw, unvalidated detections. Validation into
//! [`Detection`] values happens here too, so the orchestrator can tell a
//! malformed detection apart from a failed detector.

pub mod file;
pub mod http;

pub use file::FileDetector;
pub use http::HttpDetector;

use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{DataQualityAnomaly, DetectorError};
use crate::models::{BoundingBox, DefectType, Detection, ImageMetrics};

/// A detection exactly as the detector emitted it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(default, alias = "class", alias = "label")]
    pub class_name: Option<String>,
    #[serde(default)]
    pub class_id: Option<u32>,
    pub confidence: f64,
    /// `[x1, y1, x2, y2]` in image pixels
    pub bbox: [f64; 4],
}

impl RawDetection {
    pub fn new(defect_type: DefectType, confidence: f64, bbox: [f64; 4]) -> Self {
        Self {
            class_name: Some(defect_type.as_str().to_string()),
            class_id: None,
            confidence,
            bbox,
        }
    }

    /// Resolve the defect type. A class name takes precedence over a class id.
    pub fn defect_type(&self) -> Result<DefectType, DataQualityAnomaly> {
        if let Some(name) = &self.class_name {
            return name.parse().map_err(DataQualityAnomaly::UnknownDefectType);
        }
        match self.class_id {
            Some(id) => DefectType::from_class_id(id)
                .ok_or_else(|| DataQualityAnomaly::UnknownDefectType(format!("class id {}", id))),
            None => Err(DataQualityAnomaly::MissingDefectType),
        }
    }

    /// Validate into an immutable [`Detection`]. Checks type, confidence range
    /// and box well-formedness; image bounds are checked during assessment.
    pub fn to_detection(&self) -> Result<Detection, DataQualityAnomaly> {
        let defect_type = self.defect_type()?;

        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(DataQualityAnomaly::ConfidenceOutOfRange(self.confidence));
        }

        let [x1, y1, x2, y2] = self.bbox;
        if !self.bbox.iter().all(|v| v.is_finite()) {
            return Err(DataQualityAnomaly::NonFiniteBox(self.bbox));
        }
        if x1 >= x2 || y1 >= y2 {
            return Err(DataQualityAnomaly::DegenerateBox(self.bbox));
        }

        Ok(Detection {
            defect_type,
            confidence: self.confidence,
            bounding_box: BoundingBox { x1, y1, x2, y2 },
        })
    }
}

/// One element of a detector document: a raw detection, or the reason its
/// shape could not be read
pub type RawEntry = Result<RawDetection, DataQualityAnomaly>;

/// Everything one detector call produces, in detector order
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionBatch {
    pub entries: Vec<RawEntry>,
    pub metrics: ImageMetrics,
}

impl DetectionBatch {
    pub fn new(detections: Vec<RawDetection>, metrics: ImageMetrics) -> Self {
        Self::from_entries(detections.into_iter().map(Ok).collect(), metrics)
    }

    pub fn from_entries(entries: Vec<RawEntry>, metrics: ImageMetrics) -> Self {
        Self { entries, metrics }
    }

    pub fn empty(metrics: ImageMetrics) -> Self {
        Self::new(Vec::new(), metrics)
    }

    /// Entries that parsed into a [`RawDetection`]
    pub fn detections(&self) -> impl Iterator<Item = &RawDetection> {
        self.entries.iter().filter_map(|entry| entry.as_ref().ok())
    }

    /// Entries rejected for their shape
    pub fn rejected(&self) -> impl Iterator<Item = &DataQualityAnomaly> {
        self.entries.iter().filter_map(|entry| entry.as_ref().err())
    }
}

/// Trait that all detection adapters implement
#[async_trait]
pub trait DefectDetector: Send + Sync {
    /// Detect defects in an already decoded image. Called once per request.
    async fn detect(&self, image: &DynamicImage) -> Result<DetectionBatch, DetectorError>;

    /// Human-readable name for this detector (used in logs)
    fn name(&self) -> &str;
}

#[derive(Deserialize)]
struct WrappedDocument {
    detections: Vec<Box<RawValue>>,
}

/// Parse a detector document: either a bare array of detections or an object
/// with a `detections` array.
///
/// Only the document shape can fail here. Each element is read on its own, so
/// one malformed detection becomes a [`DataQualityAnomaly`] entry instead of
/// failing the batch.
pub(crate) fn parse_document(bytes: &[u8]) -> Result<Vec<RawEntry>, serde_json::Error> {
    let elements: Vec<Box<RawValue>> = match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') => serde_json::from_slice::<WrappedDocument>(bytes)?.detections,
        _ => serde_json::from_slice(bytes)?,
    };

    Ok(elements
        .iter()
        .map(|element| {
            serde_json::from_str::<RawDetection>(element.get())
                .map_err(|e| DataQualityAnomaly::MalformedEntry(e.to_string()))
        })
        .collect())
}
