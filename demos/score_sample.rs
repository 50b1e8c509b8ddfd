//! Score a sample ICU observation with the default configuration

use sepsis_watch::pipeline::score_records_json;
use sepsis_watch::PipelineConfig;

fn main() {
    let json = r#"[
        {
            "patient_id": "P-1001",
            "admission_id": "ADM-77",
            "timestamp": "2026-03-02T06:15:00Z",
            "vitals": { "heart_rate": 124, "respiratory_rate": 26, "systolic_bp": 86, "diastolic_bp": 50, "temperature_celsius": 38.6, "oxygen_saturation": 90 },
            "labs": { "lactate_mmol_l": 3.4, "wbc_count": 15.2, "creatinine_mg_dl": 1.9, "platelets": 132 }
        },
        { "pt_id": "P-1002", "visit_id": "ADM-78", "ts": "2026-03-02T06:20:00Z", "hr": 82, "sbp": 124, "dbp": 78, "spo2": 98 }
    ]"#;

    match score_records_json(json, &PipelineConfig::default()) {
        Ok(output) => print!("{output}"),
        Err(e) => eprintln!("Error: {e:?}"),
    }
}
