use std::fmt;
use std::str::FromStr;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// The three supported defect categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefectType {
    Crack,
    Corrosion,
    Spalling,
}

impl DefectType {
    pub const ALL: [DefectType; 3] = [DefectType::Crack, DefectType::Corrosion, DefectType::Spalling];

    pub fn as_str(&self) -> &'static str {
        match self {
            DefectType::Crack => "crack",
            DefectType::Corrosion => "corrosion",
            DefectType::Spalling => "spalling",
        }
    }

    /// Map a detector class index (0 crack, 1 corrosion, 2 spalling)
    pub fn from_class_id(class_id: u32) -> Option<Self> {
        match class_id {
            0 => Some(DefectType::Crack),
            1 => Some(DefectType::Corrosion),
            2 => Some(DefectType::Spalling),
            _ => None,
        }
    }

    /// Countable noun used in report summaries ("2 cracks", "1 corrosion area")
    pub fn counted(&self, count: usize) -> String {
        let noun = match self {
            DefectType::Crack => "crack",
            DefectType::Corrosion => "corrosion area",
            DefectType::Spalling => "spalled area",
        };
        if count == 1 {
            format!("{} {}", count, noun)
        } else {
            format!("{} {}s", count, noun)
        }
    }
}

impl fmt::Display for DefectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DefectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crack" => Ok(DefectType::Crack),
            "corrosion" => Ok(DefectType::Corrosion),
            "spalling" => Ok(DefectType::Spalling),
            _ => Err(s.to_string()),
        }
    }
}

/// Ordinal risk classification, `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned box in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Longest side of the box
    pub fn length(&self) -> f64 {
        self.width().max(self.height())
    }

    /// Long side divided by short side, always >= 1 for a well-formed box
    pub fn aspect_ratio(&self) -> f64 {
        let short = self.width().min(self.height());
        if short <= 0.0 {
            return f64::INFINITY;
        }
        self.length() / short
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn is_within(&self, metrics: &ImageMetrics) -> bool {
        self.x1 >= 0.0
            && self.y1 >= 0.0
            && self.x2 <= metrics.width as f64
            && self.y2 <= metrics.height as f64
    }
}

/// Dimensions of the inspected image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetrics {
    pub width: u32,
    pub height: u32,
}

impl ImageMetrics {
    pub fn of(image: &DynamicImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A validated detector output. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub defect_type: DefectType,
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityResult {
    #[serde(rename = "severity")]
    pub tier: Severity,
    #[serde(rename = "severity_reasoning")]
    pub reasoning: String,
}

/// Which provider variant produced an explanation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationSource {
    #[default]
    RuleBased,
    ModelBased,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    #[serde(rename = "explanation")]
    pub text: String,
    pub recommended_action: String,
    #[serde(skip)]
    pub source: ExplanationSource,
}

/// One reported defect: the detection plus its severity and commentary.
/// Serializes flat, in the shape the API layer returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedDetection {
    #[serde(flatten)]
    pub detection: Detection,
    #[serde(flatten)]
    pub severity: SeverityResult,
    #[serde(flatten)]
    pub explanation: Explanation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InspectionStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionReport {
    pub status: InspectionStatus,
    pub total_defects: usize,
    pub summary: String,
    pub detections: Vec<EnrichedDetection>,
}

impl InspectionReport {
    /// Build a successful report; `total_defects` always equals the number of detections
    pub fn success(detections: Vec<EnrichedDetection>, summary: impl Into<String>) -> Self {
        Self {
            status: InspectionStatus::Success,
            total_defects: detections.len(),
            summary: summary.into(),
            detections,
        }
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.detections.iter().map(|d| d.severity.tier).max()
    }
}

/// Failure body returned in place of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub status: InspectionStatus,
    pub message: String,
    #[serde(default)]
    pub detail: String,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status: InspectionStatus::Error,
            message: message.into(),
            detail: detail.into(),
        }
    }
}
