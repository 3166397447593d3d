//! Severity assessment: a pure function from a detection and the image
//! dimensions to a tier and an auditable reasoning string.

mod policy;

pub use policy::{AreaBand, AreaBands, BandMatch, CrackPolicy, CrackRule, SeverityPolicy};

use crate::error::DataQualityAnomaly;
use crate::models::{DefectType, Detection, ImageMetrics, Severity, SeverityResult};

/// Geometric features measured from one detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionFeatures {
    pub length_px: f64,
    pub relative_area: f64,
    pub aspect_ratio: f64,
    pub confidence: f64,
}

impl RegionFeatures {
    pub fn measure(detection: &Detection, metrics: &ImageMetrics) -> Self {
        let bbox = &detection.bounding_box;
        Self {
            length_px: bbox.length(),
            relative_area: (bbox.area() / metrics.area()).clamp(0.0, 1.0),
            aspect_ratio: bbox.aspect_ratio(),
            confidence: detection.confidence,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeverityEngine {
    policy: SeverityPolicy,
}

impl SeverityEngine {
    pub fn new(policy: SeverityPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SeverityPolicy {
        &self.policy
    }

    /// Assess one detection. Fails only when the box does not fit the image.
    pub fn assess(
        &self,
        detection: &Detection,
        metrics: &ImageMetrics,
    ) -> Result<SeverityResult, DataQualityAnomaly> {
        let bbox = &detection.bounding_box;
        if !bbox.is_within(metrics) {
            return Err(DataQualityAnomaly::OutOfBounds {
                bbox: bbox.as_array(),
                width: metrics.width,
                height: metrics.height,
            });
        }
        if !(bbox.x1 < bbox.x2 && bbox.y1 < bbox.y2) {
            return Err(DataQualityAnomaly::DegenerateBox(bbox.as_array()));
        }

        let features = RegionFeatures::measure(detection, metrics);
        let result = match detection.defect_type {
            DefectType::Crack => self.assess_crack(&features),
            DefectType::Corrosion => assess_by_area(&self.policy.corrosion, &features),
            DefectType::Spalling => assess_by_area(&self.policy.spalling, &features),
        };
        Ok(result)
    }

    fn assess_crack(&self, features: &RegionFeatures) -> SeverityResult {
        let crack = &self.policy.crack;
        match crack.first_match(features) {
            Some(rule) => {
                let mut phrases = Vec::new();
                if rule.min_length_px.is_some() {
                    phrases.push(length_phrase(rule.tier, features.length_px));
                }
                if rule.min_aspect_ratio.is_some() {
                    phrases.push(aspect_phrase(rule.tier, features.aspect_ratio));
                }
                if rule.min_relative_area.is_some() {
                    phrases.push(area_phrase(rule.tier, features.relative_area));
                }
                if rule.min_confidence.is_some() {
                    phrases.push(format!(
                        "clear visibility (confidence {:.2})",
                        features.confidence
                    ));
                }
                SeverityResult {
                    tier: rule.tier,
                    reasoning: compose(rule.tier, &phrases, &rule.note),
                }
            }
            None => {
                let phrases = [format!(
                    "localized extent (length {:.0} px, relative area {}, aspect ratio {:.1}) below every escalation threshold",
                    features.length_px,
                    percent(features.relative_area),
                    features.aspect_ratio
                )];
                SeverityResult {
                    tier: Severity::Low,
                    reasoning: compose(Severity::Low, &phrases, &crack.low_note),
                }
            }
        }
    }
}

fn assess_by_area(bands: &AreaBands, features: &RegionFeatures) -> SeverityResult {
    let area = features.relative_area;
    match bands.classify(area) {
        Some(BandMatch { band, upper_bound }) => {
            let mut phrase = area_phrase(band.tier, area);
            let mut bounds = Vec::new();
            if band.min_relative_area > 0.0 {
                bounds.push(format!("at or above {}", percent(band.min_relative_area)));
            }
            if let Some(upper) = upper_bound {
                bounds.push(format!("below {}", percent(upper)));
            }
            if !bounds.is_empty() {
                phrase = format!("{}, {}", phrase, bounds.join(" and "));
            }
            SeverityResult {
                tier: band.tier,
                reasoning: compose(band.tier, &[phrase], &band.note),
            }
        }
        // Unreachable for a validated table; keep the result total anyway.
        None => SeverityResult {
            tier: Severity::Low,
            reasoning: compose(Severity::Low, &[area_phrase(Severity::Low, area)], ""),
        },
    }
}

fn compose(tier: Severity, phrases: &[String], note: &str) -> String {
    let mut reasoning = format!("{} severity: {}.", tier, phrases.join(", "));
    if !note.is_empty() {
        reasoning.push(' ');
        reasoning.push_str(note);
        if !note.ends_with('.') {
            reasoning.push('.');
        }
    }
    reasoning
}

fn percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

fn area_phrase(tier: Severity, relative_area: f64) -> String {
    let class = match tier {
        Severity::High => "large",
        Severity::Medium => "moderate",
        Severity::Low => "small",
    };
    format!("{} relative area ({})", class, percent(relative_area))
}

fn length_phrase(tier: Severity, length_px: f64) -> String {
    let class = match tier {
        Severity::High => "long",
        _ => "moderate",
    };
    format!("{} length ({:.0} px)", class, length_px)
}

fn aspect_phrase(tier: Severity, aspect_ratio: f64) -> String {
    let class = match tier {
        Severity::High => "high",
        _ => "elevated",
    };
    format!("{} aspect ratio ({:.1})", class, aspect_ratio)
}
