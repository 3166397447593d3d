//! Explanation providers and the fallback policy between them.

pub mod http;
pub mod model;
pub mod rules;

pub use http::{HttpModelLoader, HttpVisionModel};
pub use model::{ModelBasedExplainer, ModelHandle, ModelHealth, ModelLoader, VisionModel};
pub use rules::{RuleBasedExplainer, RuleEntry, rule_entry};

use std::sync::Arc;

use image::DynamicImage;
use tracing::{debug, error, warn};

use crate::error::ModelError;
use crate::models::{BoundingBox, DefectType, Explanation, ExplanationSource, Severity};

/// Log target for explanation degradation events
pub const EXPLANATION_TARGET: &str = "infrascan::explanation";

/// Input to a single `explain` call
#[derive(Debug, Clone, Copy)]
pub struct ExplanationRequest<'a> {
    pub defect_type: DefectType,
    pub tier: Severity,
    /// Box of the detection, reported alongside any degradation
    pub bounding_box: &'a BoundingBox,
    /// Crop of the detection; only the model-based provider reads it
    pub region: Option<&'a DynamicImage>,
}

/// The two provider variants behind one `explain` capability
#[derive(Debug, Clone)]
pub enum ExplanationProvider {
    RuleBased(RuleBasedExplainer),
    ModelBased(ModelBasedExplainer),
}

impl ExplanationProvider {
    pub fn source(&self) -> ExplanationSource {
        match self {
            ExplanationProvider::RuleBased(_) => ExplanationSource::RuleBased,
            ExplanationProvider::ModelBased(_) => ExplanationSource::ModelBased,
        }
    }

    pub fn needs_region(&self) -> bool {
        matches!(self, ExplanationProvider::ModelBased(_))
    }

    pub async fn explain(&self, request: &ExplanationRequest<'_>) -> Result<Explanation, ModelError> {
        match self {
            ExplanationProvider::RuleBased(rules) => {
                Ok(rules.explain(request.defect_type, request.tier))
            }
            ExplanationProvider::ModelBased(model) => {
                let region = request.region.ok_or(ModelError::MissingRegion)?;
                model.explain(request.defect_type, request.tier, region).await
            }
        }
    }
}

/// Owns the configured providers and the process-wide model health.
///
/// The provider for a request is picked once with [`ExplanationService::select`];
/// [`ExplanationService::explain`] then falls back to the rule table per
/// detection whenever the model fails.
#[derive(Debug)]
pub struct ExplanationService {
    rule_based: ExplanationProvider,
    preferred: Option<ExplanationProvider>,
    health: ModelHealth,
}

impl Default for ExplanationService {
    fn default() -> Self {
        Self::rule_based()
    }
}

impl ExplanationService {
    /// Rule table only; the model is never consulted
    pub fn rule_based() -> Self {
        Self {
            rule_based: ExplanationProvider::RuleBased(RuleBasedExplainer),
            preferred: None,
            health: ModelHealth::new(0),
        }
    }

    /// Prefer the model while it stays healthy
    pub fn model_preferred(handle: Arc<ModelHandle>, demote_after_failures: u32) -> Self {
        Self {
            rule_based: ExplanationProvider::RuleBased(RuleBasedExplainer),
            preferred: Some(ExplanationProvider::ModelBased(ModelBasedExplainer::new(
                handle,
            ))),
            health: ModelHealth::new(demote_after_failures),
        }
    }

    pub fn health(&self) -> &ModelHealth {
        &self.health
    }

    pub fn is_model_active(&self) -> bool {
        self.preferred.is_some() && self.health.is_healthy()
    }

    /// Provider for a new request: the model if configured and healthy
    pub fn select(&self) -> &ExplanationProvider {
        match &self.preferred {
            Some(preferred) if self.health.is_healthy() => preferred,
            _ => &self.rule_based,
        }
    }

    /// Explain one detection with `provider`, degrading to the rule table on failure.
    ///
    /// Never fails. The returned explanation always comes from a single source.
    pub async fn explain(
        &self,
        provider: &ExplanationProvider,
        request: &ExplanationRequest<'_>,
    ) -> Explanation {
        if let ExplanationProvider::RuleBased(rules) = provider {
            return rules.explain(request.defect_type, request.tier);
        }

        let outcome = if self.health.is_healthy() {
            provider.explain(request).await
        } else {
            Err(ModelError::Demoted)
        };

        match outcome {
            Ok(explanation) => {
                self.health.record_success();
                explanation
            }
            Err(err) => {
                if !matches!(err, ModelError::Demoted) && self.health.record_failure() {
                    error!(
                        target: EXPLANATION_TARGET,
                        failures = self.health.consecutive_failures(),
                        "Model-based explanations demoted to rule-based for the rest of the process"
                    );
                }
                warn!(
                    target: EXPLANATION_TARGET,
                    defect_type = %request.defect_type,
                    tier = %request.tier,
                    bbox = ?request.bounding_box.as_array(),
                    error = %err,
                    "Explanation degraded to rule-based"
                );
                RuleBasedExplainer.explain(request.defect_type, request.tier)
            }
        }
    }

    /// Tear down the model handle, if any. Later requests use the rule table.
    pub async fn shutdown(&self) {
        if let Some(ExplanationProvider::ModelBased(model)) = &self.preferred {
            self.health.demote();
            model.handle().shutdown().await;
            debug!("Explanation service shut down");
        }
    }
}
