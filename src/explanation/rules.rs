use crate::models::{DefectType, Explanation, ExplanationSource, Severity};

/// Canned engineering commentary for one (defect type, tier) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleEntry {
    pub explanation: &'static str,
    pub recommended_action: &'static str,
}

/// Look up the canned entry for a defect type and tier
pub fn rule_entry(defect_type: DefectType, tier: Severity) -> RuleEntry {
    use DefectType::*;
    use Severity::*;

    let (explanation, recommended_action) = match (defect_type, tier) {
        (Crack, High) => (
            "Significant linear discontinuity detected in structural element. The crack extent suggests potential load path disruption or material fatigue. Location and propagation pattern indicate need for immediate structural assessment.",
            "Conduct detailed structural evaluation including load capacity analysis. Consider temporary shoring if needed. Implement crack monitoring system and develop repair specifications with licensed structural engineer.",
        ),
        (Crack, Medium) => (
            "Moderate crack formation observed in structural component. The defect exhibits characteristics of early-stage material degradation or settlement-induced stress. Current extent suggests localized rather than systemic issue.",
            "Install crack width monitoring gauges. Perform material testing to determine cause. Schedule repair using appropriate epoxy injection or routing and sealing within next maintenance cycle.",
        ),
        (Crack, Low) => (
            "Minor surface crack detected. Defect appears superficial with limited propagation. Likely caused by shrinkage, thermal stress, or minor settlement. No immediate structural concern evident.",
            "Document crack location and dimensions. Apply surface sealant to prevent moisture ingress. Schedule for re-inspection in 6-12 months to monitor for progression.",
        ),
        (Corrosion, High) => (
            "Advanced corrosion detected with evidence of significant material loss. The deterioration pattern suggests prolonged exposure to corrosive environment. Potential for reduced load-bearing capacity and progressive structural degradation.",
            "Immediate structural assessment required. Perform material thickness testing and load capacity evaluation. Implement corrosion protection system. Plan for member replacement or structural reinforcement as engineering analysis dictates.",
        ),
        (Corrosion, Medium) => (
            "Moderate corrosion identified on structural surface. Observable oxidation with partial material degradation. Current state indicates active corrosion process requiring intervention to prevent acceleration.",
            "Remove corrosion products and assess remaining material thickness. Apply protective coating system per SSPC standards. Improve drainage or ventilation to eliminate moisture source. Monitor quarterly for progression.",
        ),
        (Corrosion, Low) => (
            "Surface-level corrosion detected with minimal material loss. Early-stage oxidation present, primarily affecting protective coating or superficial material layers. Structural integrity currently maintained.",
            "Clean affected area and apply corrosion inhibitor. Restore protective coating system. Address moisture source if identified. Include in routine inspection schedule.",
        ),
        (Spalling, High) => (
            "Extensive concrete spalling with visible material loss detected. Defect severity suggests potential reinforcement exposure or advanced deterioration. Pattern indicates freeze-thaw damage, corrosion-induced pressure, or alkali-silica reaction.",
            "Urgent engineering assessment required. Remove loose material and inspect for reinforcement corrosion. Perform concrete strength testing. Execute structural repair using compatible materials per ACI 546 guidelines. Address root cause of deterioration.",
        ),
        (Spalling, Medium) => (
            "Moderate spalling observed with measurable concrete delamination. Surface layer failure evident, potentially due to reinforcement corrosion, freeze-thaw cycles, or construction defects. Underlying structure requires verification.",
            "Remove delaminated concrete and assess extent of damage. Test for chloride content and carbonation depth. Repair using polymer-modified concrete or appropriate patching material. Implement preventive measures for underlying cause.",
        ),
        (Spalling, Low) => (
            "Minor surface spalling detected affecting concrete cover. Limited material loss observed, likely due to localized impact, minor freeze-thaw action, or finishing issues. Structural reinforcement not compromised.",
            "Remove loose material and clean surface. Apply concrete patching compound for affected areas. Seal surface to prevent moisture penetration. Monitor during regular inspections.",
        ),
    };

    RuleEntry {
        explanation,
        recommended_action,
    }
}

/// Always-available explanation provider backed by [`rule_entry`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedExplainer;

impl RuleBasedExplainer {
    pub fn explain(&self, defect_type: DefectType, tier: Severity) -> Explanation {
        let entry = rule_entry(defect_type, tier);
        Explanation {
            text: entry.explanation.to_string(),
            recommended_action: entry.recommended_action.to_string(),
            source: ExplanationSource::RuleBased,
        }
    }
}
