//! The inspection orchestrator: detection, severity and explanation for every
//! region, aggregated into one report.

pub mod summary;

pub use summary::{NO_DEFECTS_SUMMARY, summarize};

use std::path::PathBuf;
use std::sync::Arc;

use image::DynamicImage;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::InspectionConfig;
use crate::detection::{DefectDetector, RawDetection, RawEntry};
use crate::error::{DataQualityAnomaly, DetectorError, InspectionError};
use crate::explanation::{ExplanationProvider, ExplanationRequest, ExplanationService};
use crate::models::{EnrichedDetection, ImageMetrics, InspectionReport};
use crate::render::{self, DebugOutput};
use crate::severity::{SeverityEngine, SeverityPolicy};

/// Log target for excluded, malformed detections
pub const DATA_QUALITY_TARGET: &str = "infrascan::data_quality";

pub struct Inspector {
    detector: Arc<dyn DefectDetector>,
    severity: SeverityEngine,
    explanations: ExplanationService,
    confidence_threshold: f64,
    region_padding: u32,
    parallel: bool,
    debug: Option<DebugOutput>,
}

impl Inspector {
    /// Inspector with default thresholds and rule-based explanations
    pub fn new(detector: Arc<dyn DefectDetector>) -> Self {
        let defaults = InspectionConfig::default();
        Self {
            detector,
            severity: SeverityEngine::default(),
            explanations: ExplanationService::rule_based(),
            confidence_threshold: defaults.detection.confidence_threshold,
            region_padding: defaults.explanation.region_padding,
            parallel: defaults.pipeline.parallel,
            debug: None,
        }
    }

    /// Apply every setting of a validated config
    pub fn from_config(
        config: &InspectionConfig,
        detector: Arc<dyn DefectDetector>,
        explanations: ExplanationService,
    ) -> Self {
        Self::new(detector)
            .with_explanations(explanations)
            .with_severity_policy(config.severity.clone())
            .with_confidence_threshold(config.detection.confidence_threshold)
            .with_region_padding(config.explanation.region_padding)
            .with_parallel(config.pipeline.parallel)
    }

    pub fn with_explanations(mut self, explanations: ExplanationService) -> Self {
        self.explanations = explanations;
        self
    }

    pub fn with_severity_policy(mut self, policy: SeverityPolicy) -> Self {
        self.severity = SeverityEngine::new(policy);
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_region_padding(mut self, padding: u32) -> Self {
        self.region_padding = padding;
        self
    }

    /// Enrich the detections of one request concurrently
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Save each detection's region crop into `output_dir`, which must be
    /// empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> anyhow::Result<Self> {
        self.debug = Some(DebugOutput::prepare(output_dir)?);
        Ok(self)
    }

    pub fn explanations(&self) -> &ExplanationService {
        &self.explanations
    }

    pub fn severity(&self) -> &SeverityEngine {
        &self.severity
    }

    /// Inspect an encoded image (PNG, JPEG, ...)
    pub async fn inspect(&self, image_bytes: &[u8]) -> Result<InspectionReport, InspectionError> {
        let span = info_span!("inspection", inspection_id = %Uuid::new_v4());
        async move {
            if image_bytes.is_empty() {
                return Err(InspectionError::invalid_input("empty image"));
            }
            let image = image::load_from_memory(image_bytes)
                .map_err(|e| InspectionError::invalid_input(format!("undecodable image: {}", e)))?;
            self.run(&image).await
        }
        .instrument(span)
        .await
    }

    /// Inspect an already decoded image
    pub async fn inspect_image(
        &self,
        image: &DynamicImage,
    ) -> Result<InspectionReport, InspectionError> {
        let span = info_span!("inspection", inspection_id = %Uuid::new_v4());
        self.run(image).instrument(span).await
    }

    async fn run(&self, image: &DynamicImage) -> Result<InspectionReport, InspectionError> {
        let image_metrics = ImageMetrics::of(image);
        if image_metrics.is_empty() {
            return Err(InspectionError::invalid_input(format!(
                "image has no pixels ({}x{})",
                image_metrics.width, image_metrics.height
            )));
        }
        info!(
            "Inspecting {}x{} image with {}",
            image_metrics.width,
            image_metrics.height,
            self.detector.name()
        );

        let batch = self.detector.detect(image).await?;
        let metrics = batch.metrics;
        if metrics.is_empty() {
            return Err(DetectorError::InvalidResponse(format!(
                "detector reported a {}x{} image",
                metrics.width, metrics.height
            ))
            .into());
        }

        let emitted = batch.entries.len();
        let kept: Vec<(usize, &RawEntry)> = batch
            .entries
            .iter()
            .enumerate()
            // Unreadable entries and NaN confidence go on to be logged as anomalies
            .filter(|(_, entry)| match entry {
                Ok(raw) => !(raw.confidence < self.confidence_threshold),
                Err(_) => true,
            })
            .collect();
        debug!(
            "Detector emitted {} entries, {} below confidence {} discarded",
            emitted,
            emitted - kept.len(),
            self.confidence_threshold
        );

        let provider = self.explanations.select();
        debug!("Explanation provider for this request: {:?}", provider.source());

        let results: Vec<Option<EnrichedDetection>> = if self.parallel {
            futures::future::join_all(
                kept.iter()
                    .map(|(index, entry)| self.enrich(*index, entry, image, &metrics, provider)),
            )
            .await
        } else {
            let mut results = Vec::with_capacity(kept.len());
            for (index, entry) in &kept {
                results.push(self.enrich(*index, entry, image, &metrics, provider).await);
            }
            results
        };

        let detections: Vec<EnrichedDetection> = results.into_iter().flatten().collect();
        let summary = summarize(&detections);
        info!("{}", summary);

        Ok(InspectionReport::success(detections, summary))
    }

    /// Severity and explanation for one raw detection. `None` when the
    /// detection is malformed.
    async fn enrich(
        &self,
        index: usize,
        entry: &RawEntry,
        image: &DynamicImage,
        metrics: &ImageMetrics,
        provider: &ExplanationProvider,
    ) -> Option<EnrichedDetection> {
        let assessed = entry
            .as_ref()
            .map_err(Clone::clone)
            .and_then(RawDetection::to_detection)
            .and_then(|detection| {
                let severity = self.severity.assess(&detection, metrics)?;
                Ok((detection, severity))
            });
        let (detection, severity) = match assessed {
            Ok(assessed) => assessed,
            Err(anomaly) => {
                log_anomaly(index, &anomaly);
                return None;
            }
        };

        let region = if provider.needs_region() || self.debug.is_some() {
            let region = render::crop_region(image, &detection.bounding_box, self.region_padding);
            if let Some(debug_output) = &self.debug {
                if let Err(e) = debug_output.save_region(index, detection.defect_type, &region) {
                    warn!("{:#}", e);
                }
            }
            Some(region)
        } else {
            None
        };

        let request = ExplanationRequest {
            defect_type: detection.defect_type,
            tier: severity.tier,
            bounding_box: &detection.bounding_box,
            region: region.as_ref(),
        };
        let explanation = self.explanations.explain(provider, &request).await;

        debug!(
            detection_index = index,
            defect_type = %detection.defect_type,
            tier = %severity.tier,
            source = ?explanation.source,
            "Detection enriched"
        );

        Some(EnrichedDetection {
            detection,
            severity,
            explanation,
        })
    }
}

fn log_anomaly(index: usize, anomaly: &DataQualityAnomaly) {
    warn!(
        target: DATA_QUALITY_TARGET,
        detection_index = index,
        anomaly = %anomaly,
        "Excluding malformed detection from report"
    );
}
