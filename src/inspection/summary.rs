use crate::models::{DefectType, EnrichedDetection, Severity};

pub const NO_DEFECTS_SUMMARY: &str = "Inspection completed. No defects detected.";

/// Deterministic natural-language aggregate of a report.
///
/// Types are listed in first-appearance order, tiers from High to Low.
pub fn summarize(detections: &[EnrichedDetection]) -> String {
    let total = detections.len();
    if total == 0 {
        return NO_DEFECTS_SUMMARY.to_string();
    }

    let mut type_counts: Vec<(DefectType, usize)> = Vec::new();
    for item in detections {
        let defect_type = item.detection.defect_type;
        match type_counts.iter_mut().find(|(t, _)| *t == defect_type) {
            Some((_, count)) => *count += 1,
            None => type_counts.push((defect_type, 1)),
        }
    }

    let mut parts = vec![format!(
        "Inspection completed. {} defect{} detected.",
        total,
        if total == 1 { "" } else { "s" }
    )];

    let types: Vec<String> = type_counts
        .iter()
        .map(|(defect_type, count)| defect_type.counted(*count))
        .collect();
    parts.push(format!("Types: {}.", types.join(", ")));

    let tiers: Vec<String> = [Severity::High, Severity::Medium, Severity::Low]
        .into_iter()
        .filter_map(|tier| {
            let count = detections
                .iter()
                .filter(|d| d.severity.tier == tier)
                .count();
            (count > 0).then(|| format!("{} {}", count, tier))
        })
        .collect();
    parts.push(format!("Severity: {}.", tiers.join(", ")));

    // Non-empty here, so a maximum always exists
    if let Some(highest) = detections.iter().map(|d| d.severity.tier).max() {
        let highest_types: Vec<&str> = type_counts
            .iter()
            .map(|(t, _)| *t)
            .filter(|t| {
                detections
                    .iter()
                    .any(|d| d.detection.defect_type == *t && d.severity.tier == highest)
            })
            .map(|t| t.as_str())
            .collect();
        parts.push(format!(
            "Highest severity: {} ({}).",
            highest,
            highest_types.join(", ")
        ));

        if highest == Severity::High {
            parts.push(
                "Immediate engineering assessment recommended for high severity defects."
                    .to_string(),
            );
        }
    }

    parts.join(" ")
}
