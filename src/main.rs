use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use infrascan::config::{ExplanationMode, ModelEndpointConfig};
use infrascan::detection::{DefectDetector, FileDetector, HttpDetector};
use infrascan::explanation::{ExplanationService, HttpModelLoader, ModelHandle};
use infrascan::{InspectionConfig, Inspector, load_config, logging, render};

#[derive(Parser)]
#[command(name = "infrascan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Detect and assess structural defects in an infrastructure photograph")]
struct Cli {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE", env = "INFRASCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Read detections from a JSON file produced by an external detector
    #[arg(long, value_name = "FILE", conflicts_with = "detector_url")]
    detections: Option<PathBuf>,

    /// Detector sidecar endpoint (overrides the config file)
    #[arg(long, value_name = "URL")]
    detector_url: Option<String>,

    /// Vision-language model endpoint; enables model-based explanations
    #[arg(long, value_name = "URL", conflicts_with = "rule_based")]
    model_url: Option<String>,

    /// Force rule-based explanations even if a model is configured
    #[arg(long)]
    rule_based: bool,

    /// Discard raw detections below this confidence
    #[arg(long, value_name = "F")]
    confidence: Option<f64>,

    /// Save a copy of the image with tier-coloured boxes
    #[arg(long, value_name = "PNG")]
    annotate: Option<PathBuf>,

    /// Save each detection's region crop to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Fold command-line overrides into the file configuration
    fn apply_overrides(&self, config: &mut InspectionConfig) -> anyhow::Result<()> {
        if let Some(threshold) = self.confidence {
            config.detection.confidence_threshold = threshold;
        }
        if let Some(url) = &self.detector_url {
            config.detection.endpoint = Some(url.clone());
        }
        if let Some(url) = &self.model_url {
            config.explanation.model = Some(ModelEndpointConfig::new(url.clone()));
            config.explanation.mode = ExplanationMode::ModelPreferred;
        }
        if self.rule_based {
            config.explanation.mode = ExplanationMode::RuleBased;
        }
        config.validate().context("Invalid configuration")?;
        Ok(())
    }
}

fn build_detector(cli: &Cli, config: &InspectionConfig) -> anyhow::Result<Arc<dyn DefectDetector>> {
    if let Some(path) = &cli.detections {
        return Ok(Arc::new(FileDetector::new(path.clone())));
    }
    match &config.detection.endpoint {
        Some(endpoint) => {
            let timeout = Duration::from_secs(config.detection.timeout_secs);
            Ok(Arc::new(HttpDetector::new(endpoint.clone(), timeout)?))
        }
        None => anyhow::bail!(
            "No detector configured. Pass --detections FILE, --detector-url URL, \
             or set detection.endpoint in the config file"
        ),
    }
}

fn build_explanations(config: &InspectionConfig) -> ExplanationService {
    let explanation = &config.explanation;
    match (&explanation.mode, &explanation.model) {
        (ExplanationMode::ModelPreferred, Some(model)) => {
            let handle = ModelHandle::new(
                HttpModelLoader::new(model.clone()),
                explanation.max_concurrent_requests,
            );
            ExplanationService::model_preferred(Arc::new(handle), explanation.demote_after_failures)
        }
        _ => ExplanationService::rule_based(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose, cli.json_logs)?;

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => InspectionConfig::default(),
    };
    cli.apply_overrides(&mut config)?;

    let detector = build_detector(&cli, &config)?;
    let explanations = build_explanations(&config);
    if explanations.is_model_active() {
        info!("Using model-based explanations with rule-based fallback");
    } else {
        info!("Using rule-based explanations");
    }

    let mut inspector = Inspector::from_config(&config, detector, explanations);
    if let Some(debug_dir) = cli.debug_out.clone() {
        inspector = inspector.with_debug(debug_dir)?;
    }

    let image_bytes = tokio::fs::read(&cli.image_path)
        .await
        .with_context(|| format!("Failed to read {}", cli.image_path.display()))?;

    let outcome = inspector.inspect(&image_bytes).await;
    inspector.explanations().shutdown().await;

    let (json, exit_code) = match &outcome {
        Ok(report) => (to_json(report, cli.pretty)?, ExitCode::SUCCESS),
        Err(err) => {
            warn!("Inspection failed: {}", err);
            (to_json(&err.to_report(), cli.pretty)?, ExitCode::FAILURE)
        }
    };
    println!("{}", json);

    if let (Ok(report), Some(path)) = (&outcome, &cli.annotate) {
        let image = image::load_from_memory(&image_bytes)
            .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;
        render::save_annotated(&image, report, path)?;
        info!("Annotated image written to {}", path.display());
    }

    Ok(exit_code)
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> anyhow::Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}
