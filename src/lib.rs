//! sepsis-watch - Explainable early-warning risk scoring for ICU patients
//!
//! Turns longitudinal vitals and labs observations into an auditable risk score
//! through a deterministic pipeline: ingestion → validation → feature derivation
//! → weighted-evidence scoring → alert policy.
//!
//! ## Modules
//!
//! - **Scoring core**: [`features`], [`score`], [`alert`] - pure functions of an
//!   event plus read-only configuration
//! - **Collaborators**: [`ingest`], [`validate`], [`pipeline`] - parsing, structural
//!   checks and orchestration around the core
//!
//! This is a weighted-rule system for engineering demonstration. It is not a
//! trained model and does not provide a diagnosis.

pub mod alert;
pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod pipeline;
pub mod score;
pub mod types;
pub mod validate;

pub use alert::evaluate_alert;
pub use config::{PipelineConfig, ScoringConfig, Thresholds, DEFAULT_ALERT_THRESHOLD};
pub use error::ComputeError;
pub use features::{build_features, summarize_contributors};
pub use ingest::{normalize_event, InputFormat};
pub use pipeline::{run_pipeline, BatchReport, RiskProcessor};
pub use score::score_event;
pub use types::{
    AlertDecision, ClinicalFlag, ClinicalFlags, ContributingFactor, EventSection, FeatureVector,
    NormalizedEvent, PipelineOutput, RiskCategory, ScoredResult,
};
pub use validate::{validate_event, validate_events, ValidationIssue};

/// Version embedded in every pipeline output
pub const WATCH_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for pipeline outputs
pub const PRODUCER_NAME: &str = "sepsis-watch";
