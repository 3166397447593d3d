//! Error taxonomy for the inspection pipeline.
//!
//! Only [`InspectionError`] ever reaches a caller. [`DataQualityAnomaly`] and
//! [`ModelError`] are recovered inside the pipeline and only show up in logs.

use std::path::PathBuf;

use crate::models::ErrorReport;

/// Request-level failures: nothing is reported when one of these occurs.
#[derive(Debug, thiserror::Error)]
pub enum InspectionError {
    #[error("invalid input image: {reason}")]
    InvalidInput { reason: String },

    #[error("defect detection failed: {0}")]
    Detector(#[from] DetectorError),
}

impl InspectionError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        InspectionError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn is_input_error(&self) -> bool {
        matches!(self, InspectionError::InvalidInput { .. })
    }

    pub fn to_report(&self) -> ErrorReport {
        match self {
            InspectionError::InvalidInput { reason } => {
                ErrorReport::new("Invalid input image", reason.clone())
            }
            InspectionError::Detector(err) => {
                ErrorReport::new("Inspection failed", err.to_string())
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("detector unavailable: {0}")]
    Unavailable(String),

    #[error("detector request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to read detections from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed detector output: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid detector response: {0}")]
    InvalidResponse(String),

    #[error("failed to encode image for detector: {0}")]
    Encode(#[from] image::ImageError),
}

/// A single detection that cannot be assessed. Logged and excluded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataQualityAnomaly {
    #[error("malformed detection entry: {0}")]
    MalformedEntry(String),

    #[error("unknown defect type `{0}`")]
    UnknownDefectType(String),

    #[error("detection carries neither a class name nor a class id")]
    MissingDefectType,

    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("non-finite bounding box {0:?}")]
    NonFiniteBox([f64; 4]),

    #[error("degenerate bounding box {0:?} (requires x1 < x2 and y1 < y2)")]
    DegenerateBox([f64; 4]),

    #[error("bounding box {bbox:?} exceeds the {width}x{height} image")]
    OutOfBounds {
        bbox: [f64; 4],
        width: u32,
        height: u32,
    },
}

/// Failures of the model-based explanation capability.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model failed to load: {0}")]
    Load(String),

    #[error("model has been shut down")]
    ShutDown,

    #[error("model has been demoted after repeated failures")]
    Demoted,

    #[error("no image region supplied for model-based explanation")]
    MissingRegion,

    #[error("model inference failed: {0}")]
    Inference(String),

    #[error("model returned empty output")]
    EmptyOutput,

    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to encode image region: {0}")]
    Encode(#[from] image::ImageError),
}
