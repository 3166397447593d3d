pub mod config;
pub mod detection;
pub mod error;
pub mod explanation;
pub mod inspection;
pub mod logging;
pub mod models;
pub mod render;
pub mod severity;

pub use config::{InspectionConfig, load_config};
pub use detection::{DefectDetector, DetectionBatch, RawDetection};
pub use error::{DataQualityAnomaly, DetectorError, InspectionError, ModelError};
pub use explanation::{
    ExplanationProvider, ExplanationRequest, ExplanationService, ModelHandle, ModelLoader,
    VisionModel,
};
pub use inspection::Inspector;
pub use models::{
    BoundingBox, DefectType, Detection, EnrichedDetection, ErrorReport, Explanation,
    ExplanationSource, ImageMetrics, InspectionReport, InspectionStatus, Severity,
    SeverityResult,
};
pub use severity::{SeverityEngine, SeverityPolicy};
