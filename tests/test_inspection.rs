//! Integration tests for the inspection orchestrator.
//!
//! Tests cover:
//! - Empty and populated reports and their invariants
//! - Input and detector failures
//! - Exclusion of malformed detections and the confidence cutoff
//! - Forced model failure and order preservation in parallel mode
//! - Summary text and JSON shape

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use infrascan::error::InspectionError;
use infrascan::inspection::NO_DEFECTS_SUMMARY;

use common::*;

fn mixed_detections() -> Vec<RawDetection> {
    vec![
        RawDetection::new(DefectType::Crack, 0.91, [50.0, 100.0, 950.0, 120.0]),
        RawDetection::new(DefectType::Corrosion, 0.64, [0.0, 0.0, 250.0, 250.0]),
        RawDetection::new(DefectType::Spalling, 0.55, [600.0, 600.0, 700.0, 700.0]),
        RawDetection::new(DefectType::Corrosion, 0.77, [300.0, 300.0, 700.0, 700.0]),
    ]
}

#[tokio::test]
async fn test_zero_detections_report() -> anyhow::Result<()> {
    let inspector = Inspector::new(StaticDetector::new(Vec::new()).shared());

    let report = inspector.inspect(&png_bytes(64, 64)).await?;

    assert_eq!(report.status, InspectionStatus::Success);
    assert_eq!(report.total_defects, 0);
    assert!(report.detections.is_empty());
    assert_eq!(report.summary, NO_DEFECTS_SUMMARY);
    assert_eq!(report.highest_severity(), None);

    Ok(())
}

#[tokio::test]
async fn test_report_copies_detections_unchanged() -> anyhow::Result<()> {
    let raw = mixed_detections();
    let inspector = Inspector::new(StaticDetector::new(raw.clone()).shared());

    let report = inspector.inspect(&png_bytes(1000, 1000)).await?;

    assert_eq!(report.total_defects, report.detections.len());
    assert_eq!(report.total_defects, 4);
    for (item, raw) in report.detections.iter().zip(&raw) {
        let expected = raw.to_detection()?;
        assert_eq!(item.detection, expected);
        assert_eq!(item.detection.bounding_box.as_array(), raw.bbox);
    }

    let tiers: Vec<Severity> = report.detections.iter().map(|d| d.severity.tier).collect();
    assert_eq!(
        tiers,
        vec![Severity::High, Severity::Medium, Severity::Low, Severity::High]
    );
    assert_eq!(report.highest_severity(), Some(Severity::High));

    Ok(())
}

#[tokio::test]
async fn test_rule_based_explanations_match_table() -> anyhow::Result<()> {
    let inspector = Inspector::new(StaticDetector::new(mixed_detections()).shared());

    let report = inspector.inspect(&png_bytes(1000, 1000)).await?;

    for item in &report.detections {
        let entry = rule_entry(item.detection.defect_type, item.severity.tier);
        assert_eq!(item.explanation.text, entry.explanation);
        assert_eq!(item.explanation.recommended_action, entry.recommended_action);
    }

    Ok(())
}

#[tokio::test]
async fn test_forced_model_failure_uses_rule_table() -> anyhow::Result<()> {
    let model = Arc::new(FailingModel::default());
    let (service, _handle, _loads) = model_service(model.clone(), 3, 1);
    let inspector = Inspector::new(StaticDetector::new(mixed_detections()).shared())
        .with_explanations(service);

    let report = inspector.inspect(&png_bytes(1000, 1000)).await?;

    assert_eq!(report.status, InspectionStatus::Success);
    assert_eq!(report.total_defects, 4);
    for item in &report.detections {
        let entry = rule_entry(item.detection.defect_type, item.severity.tier);
        assert_eq!(item.explanation.source, ExplanationSource::RuleBased);
        assert_eq!(item.explanation.text, entry.explanation);
        assert_eq!(item.explanation.recommended_action, entry.recommended_action);
    }

    // Demoted after the third failure; the fourth detection skips the model
    assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    assert!(!inspector.explanations().is_model_active());

    Ok(())
}

#[tokio::test]
async fn test_model_explanations_in_report() -> anyhow::Result<()> {
    let (service, _handle, loads) = model_service(Arc::new(ScriptedModel::default()), 3, 1);
    let inspector = Inspector::new(StaticDetector::new(mixed_detections()).shared())
        .with_explanations(service)
        .with_parallel(true);

    let report = inspector.inspect(&png_bytes(1000, 1000)).await?;

    assert!(report.detections.iter().all(|d| {
        d.explanation.source == ExplanationSource::ModelBased
            && d.explanation.text == MODEL_EXPLANATION
            && d.explanation.recommended_action == MODEL_ACTION
    }));
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_parallel_mode_preserves_order() -> anyhow::Result<()> {
    let raw = mixed_detections();
    let sequential = Inspector::new(StaticDetector::new(raw.clone()).shared());
    let parallel = Inspector::new(StaticDetector::new(raw).shared()).with_parallel(true);
    let bytes = png_bytes(1000, 1000);

    let a = sequential.inspect(&bytes).await?;
    let b = parallel.inspect(&bytes).await?;

    assert_eq!(a, b);

    Ok(())
}

#[tokio::test]
async fn test_malformed_detections_are_excluded() -> anyhow::Result<()> {
    let raw = vec![
        RawDetection::new(DefectType::Crack, 0.9, [0.0, 0.0, 900.0, 20.0]),
        // Outside the 1000x1000 image
        RawDetection::new(DefectType::Spalling, 0.9, [900.0, 900.0, 1100.0, 1000.0]),
        // Degenerate
        RawDetection::new(DefectType::Corrosion, 0.9, [100.0, 100.0, 100.0, 200.0]),
        // Unknown type
        RawDetection {
            class_name: Some("graffiti".to_string()),
            class_id: None,
            confidence: 0.9,
            bbox: [0.0, 0.0, 10.0, 10.0],
        },
        // Confidence above one
        RawDetection::new(DefectType::Corrosion, 1.5, [0.0, 0.0, 10.0, 10.0]),
        RawDetection::new(DefectType::Corrosion, 0.7, [0.0, 0.0, 400.0, 400.0]),
    ];
    let inspector = Inspector::new(StaticDetector::new(raw).shared());

    let report = inspector.inspect(&png_bytes(1000, 1000)).await?;

    assert_eq!(report.status, InspectionStatus::Success);
    assert_eq!(report.total_defects, 2);
    assert_eq!(report.detections[0].detection.defect_type, DefectType::Crack);
    assert_eq!(
        report.detections[1].detection.defect_type,
        DefectType::Corrosion
    );

    Ok(())
}

#[tokio::test]
async fn test_confidence_cutoff() -> anyhow::Result<()> {
    let raw = vec![
        RawDetection::new(DefectType::Crack, 0.1, [0.0, 0.0, 50.0, 10.0]),
        RawDetection::new(DefectType::Crack, 0.5, [0.0, 0.0, 50.0, 10.0]),
        RawDetection::new(DefectType::Crack, 0.49, [0.0, 0.0, 50.0, 10.0]),
    ];
    let inspector =
        Inspector::new(StaticDetector::new(raw).shared()).with_confidence_threshold(0.5);

    let report = inspector.inspect(&png_bytes(100, 100)).await?;

    assert_eq!(report.total_defects, 1);
    assert_eq!(report.detections[0].detection.confidence, 0.5);

    Ok(())
}

#[tokio::test]
async fn test_empty_input_is_rejected() -> anyhow::Result<()> {
    let detector = Arc::new(StaticDetector::new(mixed_detections()));
    let inspector = Inspector::new(detector.clone());

    let err = inspector.inspect(&[]).await.unwrap_err();

    assert!(err.is_input_error());
    assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    let body = err.to_report();
    assert_eq!(body.status, InspectionStatus::Error);
    assert_eq!(body.message, "Invalid input image");

    Ok(())
}

#[tokio::test]
async fn test_undecodable_input_is_rejected() -> anyhow::Result<()> {
    let inspector = Inspector::new(StaticDetector::new(Vec::new()).shared());

    let err = inspector
        .inspect(b"definitely not an image")
        .await
        .unwrap_err();

    assert!(matches!(err, InspectionError::InvalidInput { .. }));

    Ok(())
}

#[tokio::test]
async fn test_detector_failure_fails_the_request() -> anyhow::Result<()> {
    let inspector = Inspector::new(Arc::new(FailingDetector));

    let err = inspector.inspect(&png_bytes(32, 32)).await.unwrap_err();

    assert!(matches!(err, InspectionError::Detector(_)));
    assert!(!err.is_input_error());
    assert_eq!(err.to_report().message, "Inspection failed");

    Ok(())
}

#[tokio::test]
async fn test_detector_reporting_empty_image_fails() -> anyhow::Result<()> {
    let detector = StaticDetector::new(Vec::new()).with_metrics(metrics(0, 0));
    let inspector = Inspector::new(detector.shared());

    let err = inspector.inspect(&png_bytes(32, 32)).await.unwrap_err();

    assert!(matches!(err, InspectionError::Detector(_)));

    Ok(())
}

#[tokio::test]
async fn test_summary_text() -> anyhow::Result<()> {
    let inspector = Inspector::new(StaticDetector::new(mixed_detections()).shared());

    let report = inspector.inspect(&png_bytes(1000, 1000)).await?;

    assert_eq!(
        report.summary,
        "Inspection completed. 4 defects detected. \
         Types: 1 crack, 2 corrosion areas, 1 spalled area. \
         Severity: 2 High, 1 Medium, 1 Low. \
         Highest severity: High (crack, corrosion). \
         Immediate engineering assessment recommended for high severity defects."
    );

    Ok(())
}

#[tokio::test]
async fn test_report_json_shape() -> anyhow::Result<()> {
    let raw = vec![RawDetection::new(
        DefectType::Crack,
        0.9,
        [0.0, 0.0, 900.0, 20.0],
    )];
    let inspector = Inspector::new(StaticDetector::new(raw).shared());

    let report = inspector.inspect(&png_bytes(1000, 1000)).await?;
    let json = serde_json::to_value(&report)?;

    assert_eq!(json["status"], "success");
    assert_eq!(json["total_defects"], 1);
    let item = &json["detections"][0];
    assert_eq!(item["defect_type"], "crack");
    assert_eq!(item["confidence"], 0.9);
    assert_eq!(item["bounding_box"]["x2"], 900.0);
    assert_eq!(item["severity"], "High");
    assert!(item["severity_reasoning"].is_string());
    assert!(item["explanation"].is_string());
    assert!(item["recommended_action"].is_string());
    assert!(item.get("source").is_none());

    let back: InspectionReport = serde_json::from_value(json)?;
    assert_eq!(back.total_defects, 1);

    Ok(())
}

#[tokio::test]
async fn test_debug_output_saves_regions() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let debug_dir = dir.path().join("regions");
    let inspector = Inspector::new(StaticDetector::new(mixed_detections()).shared())
        .with_debug(debug_dir.clone())?;

    inspector.inspect(&png_bytes(1000, 1000)).await?;

    assert!(debug_dir.join("01_crack.png").exists());
    assert!(debug_dir.join("02_corrosion.png").exists());
    assert!(debug_dir.join("03_spalling.png").exists());
    assert!(debug_dir.join("04_corrosion.png").exists());

    Ok(())
}

#[tokio::test]
async fn test_debug_output_requires_empty_directory() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    std::fs::write(dir.path().join("leftover.png"), b"x")?;

    let result = Inspector::new(StaticDetector::new(Vec::new()).shared())
        .with_debug(dir.path().to_path_buf());

    assert!(result.is_err());

    Ok(())
}
