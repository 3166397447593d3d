//! Configuration file loading and validation.
//!
//! Every field has a default, so an empty TOML file is a valid configuration:
//!
//! ```toml
//! [detection]
//! confidence_threshold = 0.25
//!
//! [explanation]
//! mode = "model_preferred"
//! demote_after_failures = 3
//!
//! [explanation.model]
//! endpoint = "http://localhost:9000/generate"
//!
//! [[severity.corrosion]]
//! min_relative_area = 0.12
//! tier = "High"
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::severity::SeverityPolicy;

/// Errors that can occur during config loading
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InspectionConfig {
    pub detection: DetectionConfig,
    pub explanation: ExplanationConfig,
    pub severity: SeverityPolicy,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionConfig {
    /// Raw detections below this confidence never enter the pipeline
    pub confidence_threshold: f64,
    /// Detector sidecar endpoint
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            endpoint: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationMode {
    #[default]
    RuleBased,
    ModelPreferred,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExplanationConfig {
    pub mode: ExplanationMode,
    /// Consecutive model failures before the model is demoted for the
    /// process lifetime. Zero disables demotion.
    pub demote_after_failures: u32,
    /// Concurrent model invocations allowed; callers beyond this queue
    pub max_concurrent_requests: usize,
    /// Pixels of context added around a box when cropping the model region
    pub region_padding: u32,
    pub model: Option<ModelEndpointConfig>,
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            mode: ExplanationMode::RuleBased,
            demote_after_failures: 3,
            max_concurrent_requests: 1,
            region_padding: 20,
            model: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelEndpointConfig {
    pub endpoint: String,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

fn default_model_timeout() -> u64 {
    60
}

impl ModelEndpointConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout_secs: default_model_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Process detections of one request concurrently
    pub parallel: bool,
}

impl InspectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.detection.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::ValidationError(format!(
                "detection.confidence_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if self.explanation.max_concurrent_requests == 0 {
            return Err(ConfigError::ValidationError(
                "explanation.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.explanation.mode == ExplanationMode::ModelPreferred
            && self.explanation.model.is_none()
        {
            return Err(ConfigError::ValidationError(
                "explanation.mode = \"model_preferred\" requires an [explanation.model] section"
                    .to_string(),
            ));
        }
        if let Some(model) = &self.explanation.model {
            if model.endpoint.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "explanation.model.endpoint must not be empty".to_string(),
                ));
            }
        }
        self.severity.validate()
    }
}

impl FromStr for InspectionConfig {
    type Err = ConfigError;

    /// Parse and validate a TOML document
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: InspectionConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

/// Load a config file. Errors if the file is missing.
pub fn load_config(path: &Path) -> Result<InspectionConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    debug!("Loading config from {}", path.display());
    let contents = std::fs::read_to_string(path)?;
    contents.parse()
}
