use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::models::Severity;

use super::RegionFeatures;

/// Per-defect-type severity thresholds.
///
/// Corrosion and spalling are classified by relative area alone through an
/// ordered band table. Cracks go through an ordered rule table where the first
/// matching rule decides the tier. Every threshold is inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeverityPolicy {
    pub crack: CrackPolicy,
    pub corrosion: AreaBands,
    pub spalling: AreaBands,
}

impl Default for SeverityPolicy {
    fn default() -> Self {
        Self {
            crack: CrackPolicy::default(),
            corrosion: AreaBands::default_corrosion(),
            spalling: AreaBands::default_spalling(),
        }
    }
}

impl SeverityPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.crack.validate()?;
        self.corrosion.validate("corrosion")?;
        self.spalling.validate("spalling")?;
        Ok(())
    }
}

/// One band of an area table: relative area at or above `min_relative_area`
/// maps to `tier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AreaBand {
    pub min_relative_area: f64,
    pub tier: Severity,
    #[serde(default)]
    pub note: String,
}

/// Bands ordered by strictly decreasing lower bound. The last band must start
/// at zero so every relative area in `[0, 1]` is classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaBands {
    pub bands: Vec<AreaBand>,
}

/// Result of looking up a relative area in an [`AreaBands`] table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandMatch<'a> {
    pub band: &'a AreaBand,
    /// Lower bound of the next higher band, if any
    pub upper_bound: Option<f64>,
}

impl AreaBands {
    pub fn new(bands: Vec<AreaBand>) -> Self {
        Self { bands }
    }

    pub fn default_corrosion() -> Self {
        Self::new(vec![
            band(
                0.12,
                Severity::High,
                "Extensive corrosion with likely material degradation, immediate assessment needed",
            ),
            band(
                0.04,
                Severity::Medium,
                "Moderate corrosion present, risk of progression if untreated",
            ),
            band(
                0.0,
                Severity::Low,
                "Surface-level corrosion detected, monitor for progression",
            ),
        ])
    }

    pub fn default_spalling() -> Self {
        Self::new(vec![
            band(
                0.10,
                Severity::High,
                "Extensive spalling, possible reinforcement exposure, structural integrity at risk",
            ),
            band(
                0.03,
                Severity::Medium,
                "Moderate spalling with material loss, repair recommended",
            ),
            band(
                0.0,
                Severity::Low,
                "Minor surface spalling detected, document and monitor",
            ),
        ])
    }

    /// Find the band for `relative_area`. `None` only for negative or NaN input.
    pub fn classify(&self, relative_area: f64) -> Option<BandMatch<'_>> {
        self.bands
            .iter()
            .enumerate()
            .find(|(_, b)| relative_area >= b.min_relative_area)
            .map(|(idx, band)| BandMatch {
                band,
                upper_bound: idx
                    .checked_sub(1)
                    .map(|prev| self.bands[prev].min_relative_area),
            })
    }

    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let last = self.bands.last().ok_or_else(|| {
            ConfigError::ValidationError(format!("severity.{}: band table is empty", name))
        })?;
        if last.min_relative_area != 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "severity.{}: last band must start at 0.0, found {}",
                name, last.min_relative_area
            )));
        }
        for b in &self.bands {
            if !(0.0..=1.0).contains(&b.min_relative_area) {
                return Err(ConfigError::ValidationError(format!(
                    "severity.{}: lower bound {} outside [0, 1]",
                    name, b.min_relative_area
                )));
            }
        }
        for pair in self.bands.windows(2) {
            if pair[0].min_relative_area <= pair[1].min_relative_area {
                return Err(ConfigError::ValidationError(format!(
                    "severity.{}: bands must have strictly decreasing lower bounds ({} then {})",
                    name, pair[0].min_relative_area, pair[1].min_relative_area
                )));
            }
            if pair[0].tier < pair[1].tier {
                return Err(ConfigError::ValidationError(format!(
                    "severity.{}: tier {} above a band of tier {} breaks monotonicity",
                    name, pair[1].tier, pair[0].tier
                )));
            }
        }
        Ok(())
    }
}

fn band(min_relative_area: f64, tier: Severity, note: &str) -> AreaBand {
    AreaBand {
        min_relative_area,
        tier,
        note: note.to_string(),
    }
}

/// A crack rule fires when every condition it sets holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrackRule {
    pub tier: Severity,
    #[serde(default)]
    pub min_aspect_ratio: Option<f64>,
    #[serde(default)]
    pub min_relative_area: Option<f64>,
    #[serde(default)]
    pub min_length_px: Option<f64>,
    #[serde(default)]
    pub min_confidence: Option<f64>,
    #[serde(default)]
    pub note: String,
}

impl CrackRule {
    pub fn matches(&self, features: &RegionFeatures) -> bool {
        at_least(features.aspect_ratio, self.min_aspect_ratio)
            && at_least(features.relative_area, self.min_relative_area)
            && at_least(features.length_px, self.min_length_px)
            && at_least(features.confidence, self.min_confidence)
    }

    /// Thresholds must be finite and non-negative; area and confidence are
    /// fractions and stay within `[0, 1]`
    fn validate_thresholds(&self, idx: usize) -> Result<(), ConfigError> {
        let checks = [
            ("min_aspect_ratio", self.min_aspect_ratio, f64::INFINITY),
            ("min_relative_area", self.min_relative_area, 1.0),
            ("min_length_px", self.min_length_px, f64::INFINITY),
            ("min_confidence", self.min_confidence, 1.0),
        ];
        for (name, threshold, max) in checks {
            let Some(value) = threshold else { continue };
            if !value.is_finite() || value < 0.0 || value > max {
                return Err(ConfigError::ValidationError(format!(
                    "severity.crack.rules[{}]: {} = {} is out of range",
                    idx, name, value
                )));
            }
        }
        Ok(())
    }

    fn has_condition(&self) -> bool {
        self.min_aspect_ratio.is_some()
            || self.min_relative_area.is_some()
            || self.min_length_px.is_some()
            || self.min_confidence.is_some()
    }
}

fn at_least(value: f64, threshold: Option<f64>) -> bool {
    threshold.is_none_or(|t| value >= t)
}

/// Ordered crack rules, highest tier first. Falls through to Low.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrackPolicy {
    pub rules: Vec<CrackRule>,
    pub low_note: String,
}

impl Default for CrackPolicy {
    fn default() -> Self {
        Self {
            rules: vec![
                CrackRule {
                    tier: Severity::High,
                    min_aspect_ratio: Some(8.0),
                    min_relative_area: Some(0.05),
                    min_length_px: None,
                    min_confidence: None,
                    note: "Long crack with significant extent, potential structural concern"
                        .to_string(),
                },
                CrackRule {
                    tier: Severity::High,
                    min_aspect_ratio: None,
                    min_relative_area: Some(0.15),
                    min_length_px: None,
                    min_confidence: None,
                    note: "Large crack covering substantial area, requires immediate attention"
                        .to_string(),
                },
                CrackRule {
                    tier: Severity::High,
                    min_aspect_ratio: Some(5.0),
                    min_relative_area: None,
                    min_length_px: Some(300.0),
                    min_confidence: None,
                    note: "Extensive linear crack, may indicate structural movement".to_string(),
                },
                CrackRule {
                    tier: Severity::Medium,
                    min_aspect_ratio: None,
                    min_relative_area: Some(0.03),
                    min_length_px: None,
                    min_confidence: None,
                    note: "Moderate crack requiring monitoring and potential repair".to_string(),
                },
                CrackRule {
                    tier: Severity::Medium,
                    min_aspect_ratio: Some(4.0),
                    min_relative_area: None,
                    min_length_px: Some(150.0),
                    min_confidence: None,
                    note: "Moderate crack requiring monitoring and potential repair".to_string(),
                },
                CrackRule {
                    tier: Severity::Medium,
                    min_aspect_ratio: None,
                    min_relative_area: Some(0.01),
                    min_length_px: None,
                    min_confidence: Some(0.8),
                    note: "Clearly visible crack, should be assessed by engineer".to_string(),
                },
            ],
            low_note: "Small localized crack, likely superficial but should be documented"
                .to_string(),
        }
    }
}

impl CrackPolicy {
    pub fn first_match(&self, features: &RegionFeatures) -> Option<&CrackRule> {
        self.rules.iter().find(|rule| rule.matches(features))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (idx, rule) in self.rules.iter().enumerate() {
            if !rule.has_condition() {
                return Err(ConfigError::ValidationError(format!(
                    "severity.crack.rules[{}]: rule sets no condition",
                    idx
                )));
            }
            rule.validate_thresholds(idx)?;
            if rule.tier == Severity::Low {
                return Err(ConfigError::ValidationError(format!(
                    "severity.crack.rules[{}]: Low is the fallthrough tier and cannot be a rule",
                    idx
                )));
            }
        }
        for pair in self.rules.windows(2) {
            if pair[0].tier < pair[1].tier {
                return Err(ConfigError::ValidationError(
                    "severity.crack.rules: rules must be ordered from highest to lowest tier"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}
