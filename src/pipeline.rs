//! Pipeline orchestration
//!
//! This module provides the public API for sepsis-watch. It wires the stages
//! together: ingest → validate → features → score → alert.
//!
//! Every stage is a pure function of its input and the read-only
//! [`PipelineConfig`], so events can be processed independently and in any order.

use crate::alert::evaluate_alert;
use crate::config::PipelineConfig;
use crate::error::ComputeError;
use crate::features::build_features;
use crate::ingest::{ingest_with_stats, normalize_event, parse_events, InputFormat, IngestStats};
use crate::score::score_event;
use crate::types::{NormalizedEvent, PipelineOutput, Provenance};
use crate::validate::{validate_event, validate_events, InvalidEventReport};
use crate::{PRODUCER_NAME, WATCH_VERSION};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Run one raw record through the full pipeline.
///
/// # Arguments
/// * `raw` - Source record (any supported field aliases)
/// * `config` - Thresholds, scoring weights and alert policy
///
/// # Returns
/// The composed pipeline output, or `ComputeError::Validation` if the record
/// fails structural validation.
///
/// # Example
/// ```ignore
/// let output = run_pipeline(&record, &PipelineConfig::default())?;
/// println!("{:?}", output.risk_assessment.risk_category);
/// ```
pub fn run_pipeline(raw: &Value, config: &PipelineConfig) -> Result<PipelineOutput, ComputeError> {
    RiskProcessor::new(config.clone()).process_record(raw)
}

/// Score a JSON document (one record or an array) and return pretty JSON outputs.
///
/// Invalid records are skipped and logged; use [`RiskProcessor::process_batch`]
/// to get the rejection reports.
pub fn score_records_json(raw_json: &str, config: &PipelineConfig) -> Result<String, ComputeError> {
    let events = parse_events(raw_json, InputFormat::Json)?;
    let report = RiskProcessor::new(config.clone()).process_batch(events)?;
    for rejected in &report.rejected {
        log::warn!(
            "skipping invalid event patient={:?}: {} issue(s)",
            rejected.event.patient_id,
            rejected.errors.len()
        );
    }
    serde_json::to_string_pretty(&report.outputs).map_err(ComputeError::JsonError)
}

/// Outcome of scoring a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub outputs: Vec<PipelineOutput>,
    pub rejected: Vec<InvalidEventReport>,
    /// Present when the batch went through [`RiskProcessor::ingest_batch`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest: Option<IngestStats>,
}

/// Processor holding read-only configuration and a stable instance id.
///
/// Cheap to share across threads by reference; nothing is mutated while scoring.
#[derive(Debug, Clone)]
pub struct RiskProcessor {
    config: PipelineConfig,
    instance_id: String,
}

impl Default for RiskProcessor {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl RiskProcessor {
    /// Create a processor with a fresh instance id
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create a processor with a specific instance id
    pub fn with_instance_id(config: PipelineConfig, instance_id: String) -> Self {
        Self {
            config,
            instance_id,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Normalize, validate and score one raw JSON record
    pub fn process_record(&self, raw: &Value) -> Result<PipelineOutput, ComputeError> {
        let record = raw.as_object().ok_or_else(|| {
            ComputeError::ParseError("record must be a JSON object".to_string())
        })?;
        self.process_event(&normalize_event(record))
    }

    /// Validate and score one normalized event
    pub fn process_event(&self, event: &NormalizedEvent) -> Result<PipelineOutput, ComputeError> {
        let validation = validate_event(event);
        if !validation.ok {
            return Err(ComputeError::Validation(validation.errors));
        }
        self.score(event)
    }

    /// Validate a batch and score every valid event
    pub fn process_batch(&self, events: Vec<NormalizedEvent>) -> Result<BatchReport, ComputeError> {
        let (valid, rejected) = validate_events(events);
        let outputs = valid
            .iter()
            .map(|event| self.score(event))
            .collect::<Result<Vec<_>, _>>()?;

        log::info!(
            "scored {} event(s), rejected {}, alerts {}",
            outputs.len(),
            rejected.len(),
            outputs.iter().filter(|o| o.alert_decision.alert).count()
        );

        Ok(BatchReport {
            outputs,
            rejected,
            ingest: None,
        })
    }

    /// Drop events missing identifiers, then validate and score the rest
    pub fn ingest_batch(&self, events: Vec<NormalizedEvent>) -> Result<BatchReport, ComputeError> {
        let (kept, stats) = ingest_with_stats(events);
        let mut report = self.process_batch(kept)?;
        report.ingest = Some(stats);
        Ok(report)
    }

    /// Run the scoring core on an event assumed to be valid
    fn score(&self, event: &NormalizedEvent) -> Result<PipelineOutput, ComputeError> {
        let (features, flags) = build_features(event, &self.config.thresholds);
        let scored = score_event(&features, &flags, &self.config.scoring);
        let alert = evaluate_alert(&scored, self.config.alert_threshold)?;

        Ok(PipelineOutput {
            patient_id: event.patient_id.clone(),
            admission_id: event.admission_id.clone(),
            timestamp: event.timestamp.clone(),
            features,
            clinical_flags: flags,
            risk_assessment: scored,
            alert_decision: alert,
            provenance: self.provenance(),
        })
    }

    fn provenance(&self) -> Provenance {
        Provenance {
            producer: PRODUCER_NAME.to_string(),
            version: WATCH_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
            computed_at_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClinicalFlag, ContributingFactor, RiskCategory};
    use crate::validate::ValidationCode;
    use serde_json::json;

    fn sample_record() -> Value {
        json!({
            "patient_id": "P1",
            "admission_id": "A1",
            "timestamp": "2026-01-01T00:00:00Z",
            "vitals": {
                "heart_rate": 120,
                "systolic_bp": 100,
                "diastolic_bp": 60
            },
            "labs": {
                "lactate_mmol_l": 2.5
            }
        })
    }

    fn septic_record() -> Value {
        json!({
            "patientId": "P7",
            "visit_id": "A7",
            "ts": "2026-01-03T04:00:00Z",
            "hr": 128,
            "rr": 28,
            "sbp": 84,
            "dbp": 48,
            "temp_c": "38.9",
            "spo2": 95,
            "lactate": 4.1,
            "wbc": 17.2,
            "creatinine": 1.1,
            "plt": 210
        })
    }

    #[test]
    fn test_end_to_end_derived_features() {
        let output = run_pipeline(&sample_record(), &PipelineConfig::default()).unwrap();

        assert!((output.features.map.unwrap() - 73.333).abs() < 1e-3);
        assert!((output.features.shock_index.unwrap() - 1.2).abs() < 1e-9);
        assert!(output.clinical_flags.is_active(ClinicalFlag::Tachycardia));
        assert!(output.clinical_flags.is_active(ClinicalFlag::ElevatedLactate));
        // rr, temperature and spo2 are missing
        assert_eq!(output.risk_assessment.missing_critical_signals, 3);
        assert_eq!(output.patient_id.as_deref(), Some("P1"));
    }

    #[test]
    fn test_end_to_end_septic_patient_alerts() {
        let output = run_pipeline(&septic_record(), &PipelineConfig::default()).unwrap();

        assert_eq!(output.risk_assessment.risk_category, Some(RiskCategory::High));
        assert!(output.alert_decision.alert);
        assert_eq!(
            output.alert_decision.top_contributing_factors,
            output.risk_assessment.top_contributing_factors
        );
        assert_eq!(
            output.risk_assessment.top_contributing_factors[0],
            ContributingFactor::ElevatedLactate
        );
        assert_eq!(output.risk_assessment.missing_critical_signals, 0);
    }

    #[test]
    fn test_alert_policy_retuned_without_touching_scoring() {
        let mut config = PipelineConfig::default();
        let baseline = run_pipeline(&sample_record(), &config).unwrap();

        config.alert_threshold = 0.999_99;
        let strict = run_pipeline(&sample_record(), &config).unwrap();

        assert_eq!(
            baseline.risk_assessment.risk_score,
            strict.risk_assessment.risk_score
        );
        assert!(baseline.alert_decision.alert);
        assert!(!strict.alert_decision.alert);
    }

    #[test]
    fn test_invalid_record_is_rejected() {
        let record = json!({ "vitals": { "heart_rate": 90 } });
        match run_pipeline(&record, &PipelineConfig::default()) {
            Err(ComputeError::Validation(issues)) => {
                assert_eq!(issues.len(), 3);
                assert_eq!(issues[0].code, ValidationCode::MissingPatientId);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_vitals_section_is_rejected() {
        let record = json!({
            "patient_id": "P1",
            "admission_id": "A1",
            "timestamp": "2026-01-01T00:00:00Z",
            "vitals": "garbage",
            "hr": 130
        });
        match run_pipeline(&record, &PipelineConfig::default()) {
            Err(ComputeError::Validation(issues)) => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].code, ValidationCode::InvalidVitals);
                assert_eq!(issues[0].field.as_deref(), Some("vitals"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_object_record_is_parse_error() {
        let result = run_pipeline(&json!([1, 2, 3]), &PipelineConfig::default());
        assert!(matches!(result, Err(ComputeError::ParseError(_))));
    }

    #[test]
    fn test_process_batch_separates_invalid() {
        let processor = RiskProcessor::default();
        let events = parse_events(
            &json!([sample_record(), { "patient_id": "P2" }, septic_record()]).to_string(),
            InputFormat::Json,
        )
        .unwrap();

        let report = processor.process_batch(events).unwrap();
        assert_eq!(report.outputs.len(), 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].event.patient_id.as_deref(), Some("P2"));
        assert!(report.ingest.is_none());
    }

    #[test]
    fn test_ingest_batch_reports_stats() {
        let processor = RiskProcessor::default();
        let events = parse_events(
            &json!([sample_record(), { "patient_id": "P2" }]).to_string(),
            InputFormat::Json,
        )
        .unwrap();

        let report = processor.ingest_batch(events).unwrap();
        let stats = report.ingest.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(report.outputs.len(), 1);
        assert!(report.rejected.is_empty());
    }

    #[test]
    fn test_provenance_uses_instance_id() {
        let processor =
            RiskProcessor::with_instance_id(PipelineConfig::default(), "icu-node-1".to_string());
        let output = processor.process_record(&sample_record()).unwrap();

        assert_eq!(output.provenance.instance_id, "icu-node-1");
        assert_eq!(output.provenance.producer, PRODUCER_NAME);
        assert!(chrono::DateTime::parse_from_rfc3339(&output.provenance.computed_at_utc).is_ok());
    }

    #[test]
    fn test_output_serializes_expected_shape() {
        let output = run_pipeline(&sample_record(), &PipelineConfig::default()).unwrap();
        let value = serde_json::to_value(&output).unwrap();

        assert_eq!(value["features"]["flag_tachycardia"], 1);
        assert_eq!(value["clinical_flags"]["elevated_lactate"], 1);
        assert_eq!(value["risk_assessment"]["risk_category"], "HIGH");
        assert!(value["alert_decision"]["alert"].as_bool().unwrap());
        assert_eq!(value["alert_decision"]["alert_threshold"], 0.7);
    }

    #[test]
    fn test_score_records_json() {
        let input = json!([sample_record(), { "patient_id": "P2" }]).to_string();
        let json = score_records_json(&input, &PipelineConfig::default()).unwrap();

        let outputs: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(outputs.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_processing_is_deterministic_apart_from_provenance() {
        let processor = RiskProcessor::default();
        let first = processor.process_record(&septic_record()).unwrap();
        let second = processor.process_record(&septic_record()).unwrap();

        assert_eq!(first.features, second.features);
        assert_eq!(first.risk_assessment, second.risk_assessment);
        assert_eq!(first.alert_decision, second.alert_decision);
    }
}
