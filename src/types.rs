//! Core types for the sepsis-watch pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: normalized events, feature vectors, clinical flags, scored results,
//! and alert decisions.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A single vitals or labs entry as it arrived in the source record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reading {
    Number(f64),
    Text(String),
    /// Booleans, arrays and objects. Kept so validation can report them.
    Other(serde_json::Value),
}

impl Reading {
    /// Map a JSON value to a reading; `null` is no reading at all
    pub fn from_value(value: &serde_json::Value) -> Option<Reading> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Number(n) => Some(match n.as_f64() {
                Some(v) => Reading::Number(v),
                None => Reading::Other(value.clone()),
            }),
            serde_json::Value::String(s) => Some(Reading::Text(s.clone())),
            other => Some(Reading::Other(other.clone())),
        }
    }

    /// Whether the reading is a number or a string
    pub fn is_number_like(&self) -> bool {
        !matches!(self, Reading::Other(_))
    }
}

impl From<f64> for Reading {
    fn from(v: f64) -> Self {
        Reading::Number(v)
    }
}

impl From<&str> for Reading {
    fn from(s: &str) -> Self {
        Reading::Text(s.to_string())
    }
}

/// Bedside vital signs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vitals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub respiratory_rate: Option<Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub systolic_bp: Option<Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diastolic_bp: Option<Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_celsius: Option<Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oxygen_saturation: Option<Reading>,
}

impl Vitals {
    /// Named entries in canonical order
    pub fn entries(&self) -> [(&'static str, Option<&Reading>); 6] {
        [
            ("heart_rate", self.heart_rate.as_ref()),
            ("respiratory_rate", self.respiratory_rate.as_ref()),
            ("systolic_bp", self.systolic_bp.as_ref()),
            ("diastolic_bp", self.diastolic_bp.as_ref()),
            ("temperature_celsius", self.temperature_celsius.as_ref()),
            ("oxygen_saturation", self.oxygen_saturation.as_ref()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.entries().iter().all(|(_, r)| r.is_none())
    }
}

/// Laboratory results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Labs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lactate_mmol_l: Option<Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wbc_count: Option<Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creatinine_mg_dl: Option<Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platelets: Option<Reading>,
}

impl Labs {
    /// Named entries in canonical order
    pub fn entries(&self) -> [(&'static str, Option<&Reading>); 4] {
        [
            ("lactate_mmol_l", self.lactate_mmol_l.as_ref()),
            ("wbc_count", self.wbc_count.as_ref()),
            ("creatinine_mg_dl", self.creatinine_mg_dl.as_ref()),
            ("platelets", self.platelets.as_ref()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.entries().iter().all(|(_, r)| r.is_none())
    }
}

/// Container sections of a source record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSection {
    Vitals,
    Labs,
}

impl EventSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSection::Vitals => "vitals",
            EventSection::Labs => "labs",
        }
    }
}

/// Canonical ICU observation: one patient, one timestamp, vitals and labs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizedEvent {
    pub patient_id: Option<String>,
    pub admission_id: Option<String>,
    pub timestamp: Option<String>,
    pub vitals: Vitals,
    pub labs: Labs,
    /// Sections present in the source record but not objects; their readings are dropped
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub malformed_sections: Vec<EventSection>,
    /// Opaque passthrough, never read by the scoring core
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Binary clinical indicators derived from a single observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClinicalFlag {
    Tachycardia,
    Tachypnea,
    Hypotension,
    LowMap,
    Fever,
    Hypothermia,
    LowSpo2,
    ElevatedLactate,
    HighWbc,
    LowPlatelets,
    HighCreatinine,
    ShockIndexHigh,
}

impl ClinicalFlag {
    pub const ALL: [ClinicalFlag; 12] = [
        ClinicalFlag::Tachycardia,
        ClinicalFlag::Tachypnea,
        ClinicalFlag::Hypotension,
        ClinicalFlag::LowMap,
        ClinicalFlag::Fever,
        ClinicalFlag::Hypothermia,
        ClinicalFlag::LowSpo2,
        ClinicalFlag::ElevatedLactate,
        ClinicalFlag::HighWbc,
        ClinicalFlag::LowPlatelets,
        ClinicalFlag::HighCreatinine,
        ClinicalFlag::ShockIndexHigh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClinicalFlag::Tachycardia => "tachycardia",
            ClinicalFlag::Tachypnea => "tachypnea",
            ClinicalFlag::Hypotension => "hypotension",
            ClinicalFlag::LowMap => "low_map",
            ClinicalFlag::Fever => "fever",
            ClinicalFlag::Hypothermia => "hypothermia",
            ClinicalFlag::LowSpo2 => "low_spo2",
            ClinicalFlag::ElevatedLactate => "elevated_lactate",
            ClinicalFlag::HighWbc => "high_wbc",
            ClinicalFlag::LowPlatelets => "low_platelets",
            ClinicalFlag::HighCreatinine => "high_creatinine",
            ClinicalFlag::ShockIndexHigh => "shock_index_high",
        }
    }

    /// Key used for this flag inside the flat feature map
    pub fn feature_key(&self) -> String {
        format!("flag_{}", self.as_str())
    }
}

impl fmt::Display for ClinicalFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flag name → 0/1. Absent entries read as 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClinicalFlags(BTreeMap<ClinicalFlag, u8>);

impl ClinicalFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, flag: ClinicalFlag, active: bool) {
        self.0.insert(flag, u8::from(active));
    }

    /// Raw stored value, if the flag was recorded at all
    pub fn get(&self, flag: ClinicalFlag) -> Option<u8> {
        self.0.get(&flag).copied()
    }

    /// True only when the flag is recorded as exactly 1
    pub fn is_active(&self, flag: ClinicalFlag) -> bool {
        self.get(flag) == Some(1)
    }

    /// Active flags in declaration order
    pub fn active(&self) -> impl Iterator<Item = ClinicalFlag> + '_ {
        self.0
            .iter()
            .filter(|(_, v)| **v == 1)
            .map(|(flag, _)| *flag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClinicalFlag, u8)> + '_ {
        self.0.iter().map(|(flag, v)| (*flag, *v))
    }
}

impl FromIterator<ClinicalFlag> for ClinicalFlags {
    fn from_iter<I: IntoIterator<Item = ClinicalFlag>>(iter: I) -> Self {
        let mut flags = ClinicalFlags::new();
        for flag in iter {
            flags.set(flag, true);
        }
        flags
    }
}

/// Engineered feature vector for one observation
///
/// Numeric values are clamped to plausible ranges; `None` means missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    pub patient_id: Option<String>,
    pub admission_id: Option<String>,
    pub timestamp: Option<String>,
    pub heart_rate: Option<f64>,
    pub respiratory_rate: Option<f64>,
    pub systolic_bp: Option<f64>,
    pub diastolic_bp: Option<f64>,
    pub temperature_celsius: Option<f64>,
    pub oxygen_saturation: Option<f64>,
    pub lactate_mmol_l: Option<f64>,
    pub wbc_count: Option<f64>,
    pub creatinine_mg_dl: Option<f64>,
    pub platelets: Option<f64>,
    /// Mean arterial pressure (mmHg)
    pub map: Option<f64>,
    /// Heart rate / systolic BP
    pub shock_index: Option<f64>,
    pub flags: ClinicalFlags,
}

impl FeatureVector {
    /// Raw and derived numeric values in output order
    pub fn numeric_values(&self) -> [(&'static str, Option<f64>); 12] {
        [
            ("heart_rate", self.heart_rate),
            ("respiratory_rate", self.respiratory_rate),
            ("systolic_bp", self.systolic_bp),
            ("diastolic_bp", self.diastolic_bp),
            ("temperature_celsius", self.temperature_celsius),
            ("oxygen_saturation", self.oxygen_saturation),
            ("lactate_mmol_l", self.lactate_mmol_l),
            ("wbc_count", self.wbc_count),
            ("creatinine_mg_dl", self.creatinine_mg_dl),
            ("platelets", self.platelets),
            ("map", self.map),
            ("shock_index", self.shock_index),
        ]
    }

    /// Look up a numeric feature by name. Unknown names read as missing.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.numeric_values()
            .into_iter()
            .find(|(key, _)| *key == name)
            .and_then(|(_, v)| v)
    }
}

// Serialized as one flat map: identifiers, numeric values, then `flag_*` entries.
impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3 + 12 + ClinicalFlag::ALL.len()))?;
        map.serialize_entry("patient_id", &self.patient_id)?;
        map.serialize_entry("admission_id", &self.admission_id)?;
        map.serialize_entry("timestamp", &self.timestamp)?;
        for (key, value) in self.numeric_values() {
            map.serialize_entry(key, &value)?;
        }
        for flag in ClinicalFlag::ALL {
            map.serialize_entry(&flag.feature_key(), &self.flags.get(flag).unwrap_or(0))?;
        }
        map.end()
    }
}

/// Risk band derived from the calibrated score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

impl RiskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Low => "LOW",
            RiskCategory::Medium => "MEDIUM",
            RiskCategory::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A weighted signal surfaced to explain a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributingFactor {
    ElevatedLactate,
    Hypotension,
    LowMap,
    ShockIndexHigh,
    Tachycardia,
    Tachypnea,
    /// Fever or hypothermia, counted once
    TemperatureAbnormal,
    LowSpo2,
    HighWbc,
    LowPlatelets,
    HighCreatinine,
}

impl ContributingFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContributingFactor::ElevatedLactate => "elevated_lactate",
            ContributingFactor::Hypotension => "hypotension",
            ContributingFactor::LowMap => "low_map",
            ContributingFactor::ShockIndexHigh => "shock_index_high",
            ContributingFactor::Tachycardia => "tachycardia",
            ContributingFactor::Tachypnea => "tachypnea",
            ContributingFactor::TemperatureAbnormal => "temperature_abnormal",
            ContributingFactor::LowSpo2 => "low_spo2",
            ContributingFactor::HighWbc => "high_wbc",
            ContributingFactor::LowPlatelets => "low_platelets",
            ContributingFactor::HighCreatinine => "high_creatinine",
        }
    }
}

impl fmt::Display for ContributingFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the risk scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub patient_id: Option<String>,
    pub admission_id: Option<String>,
    pub timestamp: Option<String>,
    /// Calibrated score in [0, 1], rounded to 4 decimals.
    /// Always set by the scorer; may be absent in results read back from JSON.
    #[serde(default)]
    pub risk_score: Option<f64>,
    /// Always set by the scorer; passed through as-is when read back from JSON
    #[serde(default)]
    pub risk_category: Option<RiskCategory>,
    #[serde(default)]
    pub top_contributing_factors: Vec<ContributingFactor>,
    #[serde(default)]
    pub missing_critical_signals: usize,
}

/// Output of the alert policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDecision {
    pub alert: bool,
    pub alert_threshold: f64,
    pub risk_score: f64,
    pub risk_category: Option<RiskCategory>,
    pub top_contributing_factors: Vec<ContributingFactor>,
}

/// Producer metadata attached to every pipeline output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub producer: String,
    pub version: String,
    pub instance_id: String,
    pub computed_at_utc: String,
}

/// Complete result of running one event through the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub patient_id: Option<String>,
    pub admission_id: Option<String>,
    pub timestamp: Option<String>,
    pub features: FeatureVector,
    pub clinical_flags: ClinicalFlags,
    pub risk_assessment: ScoredResult,
    pub alert_decision: AlertDecision,
    pub provenance: Provenance,
}
