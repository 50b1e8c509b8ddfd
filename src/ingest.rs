//! Record ingestion
//!
//! Parses JSON / NDJSON input and maps heterogeneous source records onto the
//! canonical [`NormalizedEvent`]. Only renaming happens here: no clinical values
//! are created, coerced or validated.

use crate::error::ComputeError;
use crate::types::{EventSection, Labs, NormalizedEvent, Reading, Vitals};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Identifiers an event must carry to be kept by [`ingest_with_stats`]
pub const REQUIRED_TOP_LEVEL_FIELDS: [&str; 3] = ["patient_id", "admission_id", "timestamp"];

const PATIENT_ID_ALIASES: &[&str] = &["patient_id", "patientId", "pt_id"];
const ADMISSION_ID_ALIASES: &[&str] = &["admission_id", "admissionId", "visit_id"];
const TIMESTAMP_ALIASES: &[&str] = &["timestamp", "ts", "event_time"];

/// Input container format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// A single JSON object or an array of objects
    Json,
    /// One JSON object per line
    Ndjson,
}

impl InputFormat {
    /// NDJSON for `.jsonl` / `.ndjson` files, JSON otherwise
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("jsonl") | Some("ndjson") => InputFormat::Ndjson,
            _ => InputFormat::Json,
        }
    }
}

/// Counts from an ingestion pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub total: usize,
    pub parsed: usize,
    pub dropped: usize,
    pub drop_reasons: BTreeMap<String, usize>,
}

/// Map one raw record onto the canonical event shape.
///
/// Identifier aliases take the first non-empty string. Vitals and labs come from
/// nested `vitals` / `labs` objects when present and non-empty, otherwise from
/// flat top-level fields. A section holding some other value is recorded in
/// `malformed_sections` for validation to reject.
pub fn normalize_event(raw: &Map<String, Value>) -> NormalizedEvent {
    let mut malformed_sections = Vec::new();

    let vitals = match section(raw, EventSection::Vitals) {
        Section::Nested(map) => vitals_from(map, false),
        Section::Flat => vitals_from(raw, true),
        Section::Malformed => {
            malformed_sections.push(EventSection::Vitals);
            Vitals::default()
        }
    };
    let labs = match section(raw, EventSection::Labs) {
        Section::Nested(map) => labs_from(map, false),
        Section::Flat => labs_from(raw, true),
        Section::Malformed => {
            malformed_sections.push(EventSection::Labs);
            Labs::default()
        }
    };

    let metadata = match raw.get("metadata") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };

    NormalizedEvent {
        patient_id: first_string(raw, PATIENT_ID_ALIASES),
        admission_id: first_string(raw, ADMISSION_ID_ALIASES),
        timestamp: first_string(raw, TIMESTAMP_ALIASES),
        vitals,
        labs,
        malformed_sections,
        metadata,
    }
}

/// Parse newline-delimited JSON; blank lines and non-object records are skipped
pub fn parse_ndjson(input: &str) -> Result<Vec<NormalizedEvent>, ComputeError> {
    let mut events = Vec::new();
    for (line_num, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: Value = serde_json::from_str(line).map_err(|e| {
            ComputeError::ParseError(format!("Failed to parse line {}: {}", line_num + 1, e))
        })?;
        match record {
            Value::Object(map) => events.push(normalize_event(&map)),
            other => log::warn!(
                "skipping non-object record on line {}: {}",
                line_num + 1,
                json_kind(&other)
            ),
        }
    }
    Ok(events)
}

/// Parse a JSON document holding one record or an array of records
pub fn parse_json(input: &str) -> Result<Vec<NormalizedEvent>, ComputeError> {
    match serde_json::from_str::<Value>(input)? {
        Value::Object(map) => Ok(vec![normalize_event(&map)]),
        Value::Array(records) => {
            let total = records.len();
            let events: Vec<NormalizedEvent> = records
                .iter()
                .filter_map(|record| record.as_object().map(normalize_event))
                .collect();
            if events.len() < total {
                log::warn!("skipped {} non-object record(s)", total - events.len());
            }
            Ok(events)
        }
        _ => Err(ComputeError::ParseError(
            "Input JSON must be an object or list of objects".to_string(),
        )),
    }
}

/// Parse input in the given format
pub fn parse_events(input: &str, format: InputFormat) -> Result<Vec<NormalizedEvent>, ComputeError> {
    match format {
        InputFormat::Json => parse_json(input),
        InputFormat::Ndjson => parse_ndjson(input),
    }
}

/// Drop events lacking required identifiers and report why
pub fn ingest_with_stats(events: Vec<NormalizedEvent>) -> (Vec<NormalizedEvent>, IngestStats) {
    let total = events.len();
    let mut drop_reasons: BTreeMap<String, usize> = BTreeMap::new();
    let mut kept = Vec::with_capacity(total);

    for event in events {
        let present = [&event.patient_id, &event.admission_id, &event.timestamp];
        let missing: Vec<&str> = REQUIRED_TOP_LEVEL_FIELDS
            .iter()
            .zip(present)
            .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            kept.push(event);
        } else {
            let reason = format!("missing_{}", missing.join("_"));
            *drop_reasons.entry(reason).or_insert(0) += 1;
        }
    }

    let stats = IngestStats {
        total,
        parsed: total,
        dropped: total - kept.len(),
        drop_reasons,
    };
    if stats.dropped > 0 {
        log::info!(
            "ingest kept {} of {} events ({:?})",
            kept.len(),
            stats.total,
            stats.drop_reasons
        );
    }
    (kept, stats)
}

/// Where a section's readings come from
enum Section<'a> {
    Nested(&'a Map<String, Value>),
    Flat,
    Malformed,
}

/// Non-empty objects are read as nested sections. Absent or empty values
/// (`null`, `{}`, `[]`, `""`, `0`, `false`) fall back to flat fields; any other
/// value marks the section malformed.
fn section<'a>(raw: &'a Map<String, Value>, which: EventSection) -> Section<'a> {
    let key = which.as_str();
    match raw.get(key) {
        Some(Value::Object(map)) if !map.is_empty() => Section::Nested(map),
        None => Section::Flat,
        Some(value) if is_empty_value(value) => Section::Flat,
        Some(other) => {
            log::warn!("{key}: expected an object, got {}", json_kind(other));
            Section::Malformed
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Flat records may use short aliases; nested sections only use canonical names
fn vitals_from(source: &Map<String, Value>, with_aliases: bool) -> Vitals {
    let read = |canonical: &str, alias: &str| {
        let keys = [canonical, alias];
        first_reading(source, if with_aliases { &keys[..] } else { &keys[..1] })
    };
    Vitals {
        heart_rate: read("heart_rate", "hr"),
        respiratory_rate: read("respiratory_rate", "rr"),
        systolic_bp: read("systolic_bp", "sbp"),
        diastolic_bp: read("diastolic_bp", "dbp"),
        temperature_celsius: read("temperature_celsius", "temp_c"),
        oxygen_saturation: read("oxygen_saturation", "spo2"),
    }
}

fn labs_from(source: &Map<String, Value>, with_aliases: bool) -> Labs {
    let read = |canonical: &str, alias: &str| {
        let keys = [canonical, alias];
        first_reading(source, if with_aliases { &keys[..] } else { &keys[..1] })
    };
    Labs {
        lactate_mmol_l: read("lactate_mmol_l", "lactate"),
        wbc_count: read("wbc_count", "wbc"),
        creatinine_mg_dl: read("creatinine_mg_dl", "creatinine"),
        platelets: read("platelets", "plt"),
    }
}

/// First alias holding a non-null value. Zero is a value.
fn first_reading(source: &Map<String, Value>, keys: &[&str]) -> Option<Reading> {
    keys.iter()
        .filter_map(|key| source.get(*key))
        .find_map(Reading::from_value)
}

fn first_string(source: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| source.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_normalize_nested_record() {
        let event = normalize_event(&object(json!({
            "patient_id": "P1",
            "admission_id": "A1",
            "timestamp": "2026-01-01T00:00:00Z",
            "vitals": { "heart_rate": 120, "systolic_bp": "100" },
            "labs": { "lactate_mmol_l": 2.5 },
            "metadata": { "unit": "MICU" }
        })));

        assert_eq!(event.patient_id.as_deref(), Some("P1"));
        assert_eq!(event.vitals.heart_rate, Some(Reading::Number(120.0)));
        assert_eq!(event.vitals.systolic_bp, Some(Reading::Text("100".to_string())));
        assert_eq!(event.vitals.diastolic_bp, None);
        assert_eq!(event.labs.lactate_mmol_l, Some(Reading::Number(2.5)));
        assert_eq!(event.metadata.get("unit"), Some(&json!("MICU")));
    }

    #[test]
    fn test_normalize_flat_aliases() {
        let event = normalize_event(&object(json!({
            "patientId": "P2",
            "visit_id": "V9",
            "ts": "2026-01-02T08:00:00Z",
            "hr": 95,
            "sbp": 110,
            "dbp": 70,
            "temp_c": 36.8,
            "spo2": 97,
            "rr": 18,
            "lactate": 1.2,
            "wbc": 9.1,
            "creatinine": 0.9,
            "plt": 210
        })));

        assert_eq!(event.patient_id.as_deref(), Some("P2"));
        assert_eq!(event.admission_id.as_deref(), Some("V9"));
        assert_eq!(event.timestamp.as_deref(), Some("2026-01-02T08:00:00Z"));
        assert_eq!(event.vitals.heart_rate, Some(Reading::Number(95.0)));
        assert_eq!(event.vitals.respiratory_rate, Some(Reading::Number(18.0)));
        assert_eq!(event.vitals.oxygen_saturation, Some(Reading::Number(97.0)));
        assert_eq!(event.labs.platelets, Some(Reading::Number(210.0)));
        assert_eq!(event.labs.creatinine_mg_dl, Some(Reading::Number(0.9)));
        assert!(event.metadata.is_empty());
    }

    #[test]
    fn test_zero_reading_is_not_skipped() {
        let event = normalize_event(&object(json!({ "heart_rate": 0, "hr": 80 })));
        assert_eq!(event.vitals.heart_rate, Some(Reading::Number(0.0)));
    }

    #[test]
    fn test_null_canonical_falls_through_to_alias() {
        let event = normalize_event(&object(json!({ "heart_rate": null, "hr": 80 })));
        assert_eq!(event.vitals.heart_rate, Some(Reading::Number(80.0)));
    }

    #[test]
    fn test_empty_nested_section_falls_back_to_flat() {
        let event = normalize_event(&object(json!({ "vitals": {}, "hr": 101, "labs": null })));
        assert_eq!(event.vitals.heart_rate, Some(Reading::Number(101.0)));
        assert!(event.labs.is_empty());
    }

    #[test]
    fn test_nested_section_ignores_flat_aliases() {
        let event = normalize_event(&object(json!({
            "vitals": { "systolic_bp": 120, "hr": 130 },
            "hr": 140
        })));
        assert_eq!(event.vitals.heart_rate, None);
        assert_eq!(event.vitals.systolic_bp, Some(Reading::Number(120.0)));
    }

    #[test]
    fn test_non_object_section_is_marked_malformed() {
        let event = normalize_event(&object(json!({
            "vitals": [1, 2],
            "labs": "pending",
            "sbp": 90
        })));
        assert_eq!(
            event.malformed_sections,
            vec![EventSection::Vitals, EventSection::Labs]
        );
        assert!(event.vitals.is_empty());
        assert!(event.labs.is_empty());
    }

    #[test]
    fn test_blank_section_values_read_flat_fields() {
        let event = normalize_event(&object(json!({
            "vitals": "",
            "labs": [],
            "sbp": 90,
            "lactate": 2.4
        })));
        assert!(event.malformed_sections.is_empty());
        assert_eq!(event.vitals.systolic_bp, Some(Reading::Number(90.0)));
        assert_eq!(event.labs.lactate_mmol_l, Some(Reading::Number(2.4)));
    }

    #[test]
    fn test_non_string_identifiers_are_not_coerced() {
        let event = normalize_event(&object(json!({ "patient_id": 42, "pt_id": "P42" })));
        assert_eq!(event.patient_id.as_deref(), Some("P42"));

        let event = normalize_event(&object(json!({ "patient_id": 42 })));
        assert_eq!(event.patient_id, None);
    }

    #[test]
    fn test_parse_ndjson_skips_blank_and_non_objects() {
        let input = "{\"patient_id\": \"P1\"}\n\n[1,2]\n{\"patient_id\": \"P2\"}\n";
        let events = parse_ndjson(input).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].patient_id.as_deref(), Some("P2"));
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let err = parse_ndjson("{}\n{not json}\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_json_object_and_array() {
        assert_eq!(parse_json(r#"{"patient_id": "P1"}"#).unwrap().len(), 1);
        assert_eq!(
            parse_json(r#"[{"patient_id": "P1"}, 7, {"patient_id": "P2"}]"#)
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_parse_json_rejects_scalars() {
        assert!(matches!(parse_json("42"), Err(ComputeError::ParseError(_))));
        assert!(matches!(parse_json("nope"), Err(ComputeError::JsonError(_))));
    }

    #[test]
    fn test_input_format_from_path() {
        assert_eq!(InputFormat::from_path(Path::new("a/events.jsonl")), InputFormat::Ndjson);
        assert_eq!(InputFormat::from_path(Path::new("events.NDJSON")), InputFormat::Ndjson);
        assert_eq!(InputFormat::from_path(Path::new("events.json")), InputFormat::Json);
        assert_eq!(InputFormat::from_path(Path::new("-")), InputFormat::Json);
    }

    #[test]
    fn test_ingest_with_stats() {
        let events = parse_ndjson(concat!(
            "{\"patient_id\": \"P1\", \"admission_id\": \"A1\", \"timestamp\": \"t1\"}\n",
            "{\"admission_id\": \"A2\"}\n",
            "{\"patient_id\": \"P3\", \"admission_id\": \"A3\"}\n",
            "{\"patient_id\": \"P4\", \"admission_id\": \"A4\"}\n",
        ))
        .unwrap();

        let (kept, stats) = ingest_with_stats(events);
        assert_eq!(kept.len(), 1);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.parsed, 4);
        assert_eq!(stats.dropped, 3);
        assert_eq!(stats.drop_reasons.get("missing_timestamp"), Some(&2));
        assert_eq!(
            stats.drop_reasons.get("missing_patient_id_timestamp"),
            Some(&1)
        );
    }
}
