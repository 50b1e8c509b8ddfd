//! Risk scoring
//!
//! Combines clinical flags into a weighted evidence score, penalizes missing
//! critical signals, calibrates through a logistic curve and classifies the result:
//! flags → raw score → calibrated score → category + ranked explanation.
//!
//! This is an explicit weighted-rule system, not a trained model.

use crate::config::ScoringConfig;
use crate::types::{
    ClinicalFlag, ClinicalFlags, ContributingFactor, FeatureVector, RiskCategory, ScoredResult,
};

/// Fields whose absence costs `missing_penalty` each
pub const CRITICAL_SIGNALS: [&str; 7] = [
    "heart_rate",
    "systolic_bp",
    "diastolic_bp",
    "respiratory_rate",
    "temperature_celsius",
    "oxygen_saturation",
    "lactate_mmol_l",
];

/// One row of the evidence table: the factor is counted once if any driving flag is set
struct EvidenceRow {
    factor: ContributingFactor,
    flags: &'static [ClinicalFlag],
    weight: f64,
}

/// Ordered evidence table. Row order is the tie-break order for equal weights.
fn evidence_table(cfg: &ScoringConfig) -> [EvidenceRow; 11] {
    use ClinicalFlag as F;
    use ContributingFactor as C;

    fn row(factor: C, flags: &'static [F], weight: f64) -> EvidenceRow {
        EvidenceRow {
            factor,
            flags,
            weight,
        }
    }

    [
        row(C::ElevatedLactate, &[F::ElevatedLactate], cfg.w_elevated_lactate),
        row(C::Hypotension, &[F::Hypotension], cfg.w_hypotension),
        row(C::LowMap, &[F::LowMap], cfg.w_low_map),
        row(C::ShockIndexHigh, &[F::ShockIndexHigh], cfg.w_shock_index_high),
        row(C::Tachycardia, &[F::Tachycardia], cfg.w_tachycardia),
        row(C::Tachypnea, &[F::Tachypnea], cfg.w_tachypnea),
        row(
            C::TemperatureAbnormal,
            &[F::Fever, F::Hypothermia],
            cfg.w_fever_or_hypothermia,
        ),
        row(C::LowSpo2, &[F::LowSpo2], cfg.w_low_spo2),
        row(C::HighWbc, &[F::HighWbc], cfg.w_high_wbc),
        row(C::LowPlatelets, &[F::LowPlatelets], cfg.w_low_platelets),
        row(C::HighCreatinine, &[F::HighCreatinine], cfg.w_high_creatinine),
    ]
}

/// Score one observation.
///
/// Never fails: absent flags read as 0 and absent features read as missing.
pub fn score_event(
    features: &FeatureVector,
    flags: &ClinicalFlags,
    cfg: &ScoringConfig,
) -> ScoredResult {
    let contributions: Vec<(ContributingFactor, f64)> = evidence_table(cfg)
        .into_iter()
        .filter(|row| row.flags.iter().any(|flag| flags.is_active(*flag)))
        .map(|row| (row.factor, row.weight))
        .collect();

    let missing_count = count_missing_critical(features);
    let missing_penalty = cfg.missing_penalty * missing_count as f64;

    let raw_score = contributions.iter().map(|(_, w)| w).sum::<f64>() - missing_penalty;
    let calibrated = sigmoid(raw_score);
    // Banding uses the unrounded score; only the reported value is rounded
    let risk_category = categorize(calibrated, cfg);
    let risk_score = round4(calibrated);

    log::debug!(
        "scored patient={:?} raw={raw_score:.4} score={risk_score} category={risk_category} missing={missing_count}",
        features.patient_id
    );

    ScoredResult {
        patient_id: features.patient_id.clone(),
        admission_id: features.admission_id.clone(),
        timestamp: features.timestamp.clone(),
        risk_score: Some(risk_score),
        risk_category: Some(risk_category),
        top_contributing_factors: rank_contributors(contributions, cfg.max_contributors),
        missing_critical_signals: missing_count,
    }
}

/// Number of critical signals absent from the feature vector
pub fn count_missing_critical(features: &FeatureVector) -> usize {
    CRITICAL_SIGNALS
        .iter()
        .filter(|name| features.value(name).is_none())
        .count()
}

/// Logistic squashing without overflow for large |z|
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let ez = z.exp();
        ez / (1.0 + ez)
    }
}

/// Map a score to its band; both boundaries are inclusive
pub fn categorize(score: f64, cfg: &ScoringConfig) -> RiskCategory {
    if score >= cfg.high_threshold {
        RiskCategory::High
    } else if score >= cfg.medium_threshold {
        RiskCategory::Medium
    } else {
        RiskCategory::Low
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Heaviest first; `sort_by` is stable so equal weights keep table order
fn rank_contributors(
    mut contributions: Vec<(ContributingFactor, f64)>,
    max_contributors: usize,
) -> Vec<ContributingFactor> {
    contributions.sort_by(|a, b| b.1.total_cmp(&a.1));
    contributions
        .into_iter()
        .take(max_contributors)
        .map(|(factor, _)| factor)
        .collect()
}
