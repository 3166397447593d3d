mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from infrascan for tests
pub use infrascan::detection::RawDetection;
pub use infrascan::explanation::rule_entry;
pub use infrascan::models::{
    DefectType, ExplanationSource, InspectionReport, InspectionStatus, Severity,
};
pub use infrascan::{Inspector, SeverityEngine};
