//! Event validation
//!
//! Structural checks on normalized events before they reach the scoring core.
//! Failures are returned as data, never raised, so a batch can be split into
//! valid and invalid events without aborting. Clinical plausibility is not
//! checked here; the feature builder clamps and demotes bad values itself.

use crate::types::{EventSection, NormalizedEvent, Reading};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable validation failure code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    MissingPatientId,
    MissingAdmissionId,
    MissingTimestamp,
    InvalidVitals,
    InvalidLabs,
    InvalidType,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCode::MissingPatientId => "MISSING_PATIENT_ID",
            ValidationCode::MissingAdmissionId => "MISSING_ADMISSION_ID",
            ValidationCode::MissingTimestamp => "MISSING_TIMESTAMP",
            ValidationCode::InvalidVitals => "INVALID_VITALS",
            ValidationCode::InvalidLabs => "INVALID_LABS",
            ValidationCode::InvalidType => "INVALID_TYPE",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: ValidationCode,
    pub message: String,
    pub field: Option<String>,
}

impl ValidationIssue {
    fn new(code: ValidationCode, message: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

/// Outcome of validating one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ok: bool,
    pub errors: Vec<ValidationIssue>,
}

/// An event that failed validation, with its issues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidEventReport {
    pub event: NormalizedEvent,
    pub errors: Vec<ValidationIssue>,
}

/// Check required identifiers, the vitals/labs containers and their entries
pub fn validate_event(event: &NormalizedEvent) -> ValidationResult {
    let mut errors = Vec::new();

    let required = [
        (&event.patient_id, ValidationCode::MissingPatientId, "patient_id"),
        (&event.admission_id, ValidationCode::MissingAdmissionId, "admission_id"),
        (&event.timestamp, ValidationCode::MissingTimestamp, "timestamp"),
    ];
    for (value, code, field) in required {
        if !is_nonempty(value.as_deref()) {
            errors.push(ValidationIssue::new(code, format!("{field} is required"), field));
        }
    }

    for section in &event.malformed_sections {
        let code = match section {
            EventSection::Vitals => ValidationCode::InvalidVitals,
            EventSection::Labs => ValidationCode::InvalidLabs,
        };
        let field = section.as_str();
        errors.push(ValidationIssue::new(code, format!("{field} must be an object"), field));
    }

    let sections = [
        ("vitals", event.vitals.entries().to_vec()),
        ("labs", event.labs.entries().to_vec()),
    ];
    for (section, entries) in sections {
        for (name, reading) in entries {
            if let Some(Reading::Other(_)) = reading {
                let field = format!("{section}.{name}");
                errors.push(ValidationIssue::new(
                    ValidationCode::InvalidType,
                    format!("{field} must be number-like"),
                    field,
                ));
            }
        }
    }

    ValidationResult {
        ok: errors.is_empty(),
        errors,
    }
}

/// Split a batch into valid events and reports for the invalid ones
pub fn validate_events(
    events: Vec<NormalizedEvent>,
) -> (Vec<NormalizedEvent>, Vec<InvalidEventReport>) {
    let mut valid = Vec::new();
    let mut invalid = Vec::new();

    for event in events {
        let result = validate_event(&event);
        if result.ok {
            valid.push(event);
        } else {
            log::debug!(
                "rejected event patient={:?}: {} issue(s)",
                event.patient_id,
                result.errors.len()
            );
            invalid.push(InvalidEventReport {
                event,
                errors: result.errors,
            });
        }
    }

    (valid, invalid)
}

fn is_nonempty(value: Option<&str>) -> bool {
    value.is_some_and(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn valid_event() -> NormalizedEvent {
        serde_json::from_value(json!({
            "patient_id": "P1",
            "admission_id": "A1",
            "timestamp": "2026-01-01T00:00:00Z",
            "vitals": { "heart_rate": 88, "systolic_bp": "118" },
            "labs": { "lactate_mmol_l": 1.1 }
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_event_passes() {
        let result = validate_event(&valid_event());
        assert!(result.ok);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_missing_and_blank_identifiers() {
        let mut event = valid_event();
        event.patient_id = None;
        event.timestamp = Some("   ".to_string());

        let result = validate_event(&event);
        assert!(!result.ok);
        let codes: Vec<ValidationCode> = result.errors.iter().map(|e| e.code).collect();
        assert_eq!(
            codes,
            vec![ValidationCode::MissingPatientId, ValidationCode::MissingTimestamp]
        );
        assert_eq!(result.errors[0].field.as_deref(), Some("patient_id"));
        assert_eq!(result.errors[0].message, "patient_id is required");
    }

    #[test]
    fn test_non_numeric_entries_are_invalid_type() {
        let mut event = valid_event();
        event.vitals.oxygen_saturation = Some(Reading::Other(json!({"value": 97})));
        event.labs.platelets = Some(Reading::Other(json!(false)));

        let result = validate_event(&event);
        assert!(!result.ok);
        let fields: Vec<&str> = result
            .errors
            .iter()
            .filter_map(|e| e.field.as_deref())
            .collect();
        assert_eq!(fields, vec!["vitals.oxygen_saturation", "labs.platelets"]);
        assert!(result
            .errors
            .iter()
            .all(|e| e.code == ValidationCode::InvalidType));
    }

    #[test]
    fn test_malformed_sections_are_rejected() {
        let mut event = valid_event();
        event.malformed_sections = vec![EventSection::Vitals, EventSection::Labs];

        let result = validate_event(&event);
        assert!(!result.ok);
        assert_eq!(
            result.errors,
            vec![
                ValidationIssue::new(ValidationCode::InvalidVitals, "vitals must be an object", "vitals"),
                ValidationIssue::new(ValidationCode::InvalidLabs, "labs must be an object", "labs"),
            ]
        );
    }

    #[test]
    fn test_unparseable_strings_pass_validation() {
        // Strings are number-like for validation; the feature builder demotes them
        let mut event = valid_event();
        event.vitals.heart_rate = Some(Reading::Text("n/a".to_string()));
        assert!(validate_event(&event).ok);
    }

    #[test]
    fn test_validate_events_splits_batch() {
        let mut bad = valid_event();
        bad.admission_id = None;

        let (valid, invalid) = validate_events(vec![valid_event(), bad, valid_event()]);
        assert_eq!(valid.len(), 2);
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].errors[0].code, ValidationCode::MissingAdmissionId);
    }

    #[test]
    fn test_issue_serializes_code_string() {
        let mut event = valid_event();
        event.patient_id = None;
        let result = validate_event(&event);

        let value = serde_json::to_value(&result.errors[0]).unwrap();
        assert_eq!(
            value,
            json!({
                "code": "MISSING_PATIENT_ID",
                "message": "patient_id is required",
                "field": "patient_id"
            })
        );
    }
}
