//! Alert policy
//!
//! Decides whether a scored observation should page someone. The threshold is a
//! caller-supplied policy value, independent of the scorer's HIGH band, so alerting
//! can be retuned without touching weights or calibration.

use crate::error::ComputeError;
use crate::types::{AlertDecision, ScoredResult};

pub use crate::config::DEFAULT_ALERT_THRESHOLD;

/// Apply the alert threshold (inclusive) to a scored result
pub fn evaluate_alert(
    scored: &ScoredResult,
    alert_threshold: f64,
) -> Result<AlertDecision, ComputeError> {
    let risk_score = scored
        .risk_score
        .ok_or_else(|| ComputeError::MissingField("risk_score".to_string()))?;

    let alert = risk_score >= alert_threshold;
    if alert {
        log::info!(
            "alert raised patient={} admission={} score={risk_score} threshold={alert_threshold}",
            scored.patient_id.as_deref().unwrap_or("unknown"),
            scored.admission_id.as_deref().unwrap_or("unknown"),
        );
    }

    Ok(AlertDecision {
        alert,
        alert_threshold,
        risk_score,
        risk_category: scored.risk_category,
        top_contributing_factors: scored.top_contributing_factors.clone(),
    })
}
