//! Feature derivation
//!
//! This module turns a normalized ICU observation into an explainable feature vector:
//! - Lenient numeric parsing (unparseable values become missing)
//! - Clamping to physiologically plausible ranges
//! - Derived hemodynamics (MAP, shock index)
//! - Binary clinical flags against configurable thresholds

use crate::config::Thresholds;
use crate::types::{ClinicalFlag, ClinicalFlags, FeatureVector, NormalizedEvent, Reading};

/// Plausible ranges; values outside are clamped to the nearest bound
const HEART_RATE_RANGE: (f64, f64) = (20.0, 250.0);
const RESPIRATORY_RATE_RANGE: (f64, f64) = (5.0, 80.0);
const SYSTOLIC_BP_RANGE: (f64, f64) = (40.0, 250.0);
const DIASTOLIC_BP_RANGE: (f64, f64) = (20.0, 150.0);
const TEMPERATURE_RANGE: (f64, f64) = (30.0, 43.0);
const SPO2_RANGE: (f64, f64) = (50.0, 100.0);
const LACTATE_RANGE: (f64, f64) = (0.0, 20.0);
const WBC_RANGE: (f64, f64) = (0.0, 60.0);
const CREATININE_RANGE: (f64, f64) = (0.0, 20.0);
const PLATELETS_RANGE: (f64, f64) = (0.0, 1500.0);

/// Flags reported by [`summarize_contributors`], in reporting order.
/// Hypothermia is not reported here.
const SUMMARY_FLAGS: [ClinicalFlag; 11] = [
    ClinicalFlag::ElevatedLactate,
    ClinicalFlag::Hypotension,
    ClinicalFlag::LowMap,
    ClinicalFlag::Tachycardia,
    ClinicalFlag::Tachypnea,
    ClinicalFlag::Fever,
    ClinicalFlag::LowSpo2,
    ClinicalFlag::HighWbc,
    ClinicalFlag::LowPlatelets,
    ClinicalFlag::HighCreatinine,
    ClinicalFlag::ShockIndexHigh,
];

/// Build the feature vector and clinical flags for one event.
///
/// Pure and deterministic: identical input and thresholds give identical output.
pub fn build_features(
    event: &NormalizedEvent,
    thresholds: &Thresholds,
) -> (FeatureVector, ClinicalFlags) {
    let vitals = &event.vitals;
    let labs = &event.labs;

    let hr = read_clamped(vitals.heart_rate.as_ref(), HEART_RATE_RANGE);
    let rr = read_clamped(vitals.respiratory_rate.as_ref(), RESPIRATORY_RATE_RANGE);
    let sbp = read_clamped(vitals.systolic_bp.as_ref(), SYSTOLIC_BP_RANGE);
    let dbp = read_clamped(vitals.diastolic_bp.as_ref(), DIASTOLIC_BP_RANGE);
    let temp_c = read_clamped(vitals.temperature_celsius.as_ref(), TEMPERATURE_RANGE);
    let spo2 = read_clamped(vitals.oxygen_saturation.as_ref(), SPO2_RANGE);

    let lactate = read_clamped(labs.lactate_mmol_l.as_ref(), LACTATE_RANGE);
    let wbc = read_clamped(labs.wbc_count.as_ref(), WBC_RANGE);
    let creatinine = read_clamped(labs.creatinine_mg_dl.as_ref(), CREATININE_RANGE);
    let platelets = read_clamped(labs.platelets.as_ref(), PLATELETS_RANGE);

    let map = compute_map(sbp, dbp);
    let shock_index = safe_div(hr, sbp);

    let t = thresholds;
    let mut flags = ClinicalFlags::new();
    flags.set(ClinicalFlag::Tachycardia, crosses(hr, |v| v >= t.tachycardia_hr));
    flags.set(ClinicalFlag::Tachypnea, crosses(rr, |v| v >= t.tachypnea_rr));
    flags.set(ClinicalFlag::Hypotension, crosses(sbp, |v| v <= t.hypotension_sbp));
    flags.set(ClinicalFlag::LowMap, crosses(map, |v| v < t.low_map));
    flags.set(ClinicalFlag::Fever, crosses(temp_c, |v| v >= t.fever_c));
    flags.set(ClinicalFlag::Hypothermia, crosses(temp_c, |v| v <= t.hypothermia_c));
    flags.set(ClinicalFlag::LowSpo2, crosses(spo2, |v| v < t.low_spo2));
    flags.set(ClinicalFlag::ElevatedLactate, crosses(lactate, |v| v >= t.high_lactate));
    flags.set(ClinicalFlag::HighWbc, crosses(wbc, |v| v >= t.high_wbc));
    flags.set(ClinicalFlag::LowPlatelets, crosses(platelets, |v| v < t.low_platelets));
    flags.set(ClinicalFlag::HighCreatinine, crosses(creatinine, |v| v >= t.high_creatinine));
    flags.set(
        ClinicalFlag::ShockIndexHigh,
        crosses(shock_index, |v| v >= t.shock_index_high),
    );

    let features = FeatureVector {
        patient_id: event.patient_id.clone(),
        admission_id: event.admission_id.clone(),
        timestamp: event.timestamp.clone(),
        heart_rate: hr,
        respiratory_rate: rr,
        systolic_bp: sbp,
        diastolic_bp: dbp,
        temperature_celsius: temp_c,
        oxygen_saturation: spo2,
        lactate_mmol_l: lactate,
        wbc_count: wbc,
        creatinine_mg_dl: creatinine,
        platelets,
        map,
        shock_index,
        flags: flags.clone(),
    };

    (features, flags)
}

/// Human-readable labels for the active flags, in a fixed reporting order
pub fn summarize_contributors(flags: &ClinicalFlags) -> Vec<&'static str> {
    SUMMARY_FLAGS
        .iter()
        .filter(|flag| flags.is_active(**flag))
        .map(|flag| flag.as_str())
        .collect()
}

/// Best-effort numeric conversion; anything that is not a finite number is missing
fn as_float(reading: Option<&Reading>) -> Option<f64> {
    let value = match reading? {
        Reading::Number(v) => *v,
        Reading::Text(s) => s.trim().parse::<f64>().ok()?,
        Reading::Other(_) => return None,
    };
    value.is_finite().then_some(value)
}

fn read_clamped(reading: Option<&Reading>, (lo, hi): (f64, f64)) -> Option<f64> {
    as_float(reading).map(|v| v.clamp(lo, hi))
}

/// Division that yields missing on a missing operand or a zero denominator
fn safe_div(num: Option<f64>, den: Option<f64>) -> Option<f64> {
    match (num, den) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

/// Mean arterial pressure: (SBP + 2 * DBP) / 3
fn compute_map(sbp: Option<f64>, dbp: Option<f64>) -> Option<f64> {
    match (sbp, dbp) {
        (Some(s), Some(d)) => Some((s + 2.0 * d) / 3.0),
        _ => None,
    }
}

/// A flag is raised only for a present value on the adverse side of its cutoff
fn crosses(value: Option<f64>, adverse: impl Fn(f64) -> bool) -> bool {
    value.is_some_and(adverse)
}
