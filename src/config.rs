//! Clinical thresholds and scoring configuration
//!
//! All values are representative defaults. Every struct deserializes with
//! `#[serde(default)]`, so a config file only needs the keys it overrides.
//! Configuration is read-only once constructed; share it by reference.

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};

/// Default alert threshold, kept separate from the scorer's HIGH band
pub const DEFAULT_ALERT_THRESHOLD: f64 = 0.70;

/// Cutoffs for the clinical flags.
///
/// Direction is fixed per signal: heart rate, respiratory rate, temperature (fever),
/// lactate, WBC, creatinine and shock index flag at or above the cutoff; systolic BP
/// and temperature (hypothermia) flag at or below it; MAP, SpO2 and platelets flag
/// strictly below it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub tachycardia_hr: f64,
    pub tachypnea_rr: f64,
    pub hypotension_sbp: f64,
    pub low_map: f64,
    pub fever_c: f64,
    pub hypothermia_c: f64,
    pub low_spo2: f64,

    pub high_lactate: f64,
    pub high_wbc: f64,
    pub low_platelets: f64,
    pub high_creatinine: f64,

    pub shock_index_high: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            tachycardia_hr: 100.0,
            tachypnea_rr: 22.0,
            hypotension_sbp: 90.0,
            low_map: 65.0,
            fever_c: 38.0,
            hypothermia_c: 36.0,
            low_spo2: 92.0,
            high_lactate: 2.0,
            high_wbc: 12.0,
            low_platelets: 150.0,
            high_creatinine: 1.5,
            shock_index_high: 0.9,
        }
    }
}

impl Thresholds {
    fn named(&self) -> [(&'static str, f64); 12] {
        [
            ("tachycardia_hr", self.tachycardia_hr),
            ("tachypnea_rr", self.tachypnea_rr),
            ("hypotension_sbp", self.hypotension_sbp),
            ("low_map", self.low_map),
            ("fever_c", self.fever_c),
            ("hypothermia_c", self.hypothermia_c),
            ("low_spo2", self.low_spo2),
            ("high_lactate", self.high_lactate),
            ("high_wbc", self.high_wbc),
            ("low_platelets", self.low_platelets),
            ("high_creatinine", self.high_creatinine),
            ("shock_index_high", self.shock_index_high),
        ]
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        for (name, value) in self.named() {
            if !value.is_finite() {
                return Err(ComputeError::InvalidConfig(format!(
                    "thresholds.{name} must be finite, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Weights, missingness penalty and category bands for the risk scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub w_elevated_lactate: f64,
    pub w_hypotension: f64,
    pub w_low_map: f64,
    pub w_shock_index_high: f64,
    pub w_tachycardia: f64,
    pub w_tachypnea: f64,
    pub w_fever_or_hypothermia: f64,
    pub w_low_spo2: f64,
    pub w_high_wbc: f64,
    pub w_low_platelets: f64,
    pub w_high_creatinine: f64,

    /// Subtracted from the raw score once per missing critical signal
    pub missing_penalty: f64,

    pub medium_threshold: f64,
    pub high_threshold: f64,

    /// Cap on reported contributing factors
    pub max_contributors: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            w_elevated_lactate: 2.0,
            w_hypotension: 1.8,
            w_low_map: 1.6,
            w_shock_index_high: 1.2,
            w_tachycardia: 0.8,
            w_tachypnea: 0.8,
            w_fever_or_hypothermia: 0.7,
            w_low_spo2: 0.7,
            w_high_wbc: 0.5,
            w_low_platelets: 0.5,
            w_high_creatinine: 0.4,
            missing_penalty: 0.12,
            medium_threshold: 0.45,
            high_threshold: 0.70,
            max_contributors: 5,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ComputeError> {
        let named = [
            ("w_elevated_lactate", self.w_elevated_lactate),
            ("w_hypotension", self.w_hypotension),
            ("w_low_map", self.w_low_map),
            ("w_shock_index_high", self.w_shock_index_high),
            ("w_tachycardia", self.w_tachycardia),
            ("w_tachypnea", self.w_tachypnea),
            ("w_fever_or_hypothermia", self.w_fever_or_hypothermia),
            ("w_low_spo2", self.w_low_spo2),
            ("w_high_wbc", self.w_high_wbc),
            ("w_low_platelets", self.w_low_platelets),
            ("w_high_creatinine", self.w_high_creatinine),
            ("missing_penalty", self.missing_penalty),
            ("medium_threshold", self.medium_threshold),
            ("high_threshold", self.high_threshold),
        ];
        for (name, value) in named {
            if !value.is_finite() {
                return Err(ComputeError::InvalidConfig(format!(
                    "scoring.{name} must be finite, got {value}"
                )));
            }
        }

        if self.missing_penalty < 0.0 {
            return Err(ComputeError::InvalidConfig(
                "scoring.missing_penalty must not be negative".to_string(),
            ));
        }
        for (name, value) in [
            ("medium_threshold", self.medium_threshold),
            ("high_threshold", self.high_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ComputeError::InvalidConfig(format!(
                    "scoring.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.medium_threshold > self.high_threshold {
            return Err(ComputeError::InvalidConfig(format!(
                "scoring.medium_threshold ({}) exceeds high_threshold ({})",
                self.medium_threshold, self.high_threshold
            )));
        }
        if self.max_contributors == 0 {
            return Err(ComputeError::InvalidConfig(
                "scoring.max_contributors must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything a pipeline run needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub thresholds: Thresholds,
    pub scoring: ScoringConfig,
    /// Alert policy threshold. Independent of `scoring.high_threshold`.
    pub alert_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            scoring: ScoringConfig::default(),
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
        }
    }
}

impl PipelineConfig {
    /// Parse a (possibly partial) JSON config and validate it
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        serde_json::to_string_pretty(self).map_err(ComputeError::JsonError)
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        self.thresholds.validate()?;
        self.scoring.validate()?;
        if !(0.0..=1.0).contains(&self.alert_threshold) {
            return Err(ComputeError::InvalidConfig(format!(
                "alert_threshold must be within [0, 1], got {}",
                self.alert_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = PipelineConfig::from_json(
            r#"{
                "thresholds": { "tachycardia_hr": 110.0 },
                "scoring": { "max_contributors": 3 },
                "alert_threshold": 0.6
            }"#,
        )
        .unwrap();

        assert_eq!(config.thresholds.tachycardia_hr, 110.0);
        assert_eq!(config.thresholds.low_map, 65.0);
        assert_eq!(config.scoring.max_contributors, 3);
        assert_eq!(config.scoring.w_elevated_lactate, 2.0);
        assert_eq!(config.alert_threshold, 0.6);
    }

    #[test]
    fn test_empty_config_is_default() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_roundtrip_through_json() {
        let config = PipelineConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(PipelineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_inverted_bands() {
        let result = PipelineConfig::from_json(
            r#"{ "scoring": { "medium_threshold": 0.8, "high_threshold": 0.7 } }"#,
        );
        assert!(matches!(result, Err(ComputeError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_zero_contributors() {
        let result = PipelineConfig::from_json(r#"{ "scoring": { "max_contributors": 0 } }"#);
        assert!(matches!(result, Err(ComputeError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_out_of_range_alert_threshold() {
        let result = PipelineConfig::from_json(r#"{ "alert_threshold": 1.5 }"#);
        assert!(matches!(result, Err(ComputeError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let result = PipelineConfig::from_json("not json");
        assert!(matches!(result, Err(ComputeError::JsonError(_))));
    }
}
