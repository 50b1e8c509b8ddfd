//! sepsis-watch CLI - Command-line interface for ICU early-warning scoring
//!
//! Commands:
//! - score: Score a file of events (batch mode)
//! - run: Score NDJSON events from stdin (streaming mode)
//! - validate: Validate events without scoring
//! - alert: Re-evaluate scored results under a different alert threshold
//! - config: Print the effective configuration
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sepsis_watch::ingest::{parse_events, InputFormat as EventFormat};
use sepsis_watch::pipeline::RiskProcessor;
use sepsis_watch::validate::validate_event;
use sepsis_watch::{
    evaluate_alert, AlertDecision, ComputeError, PipelineConfig, ScoredResult,
    DEFAULT_ALERT_THRESHOLD, PRODUCER_NAME, WATCH_VERSION,
};

/// sepsis-watch - Explainable early-warning risk scoring for ICU patients
#[derive(Parser)]
#[command(name = "sepsis-watch")]
#[command(version = WATCH_VERSION)]
#[command(about = "Score ICU vitals and labs for early sepsis risk", long_about = None)]
struct Cli {
    /// Pipeline configuration file (JSON; omitted keys keep their defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log progress at info level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a file of events (batch mode)
    Score {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "auto")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Override the configured alert threshold
        #[arg(long)]
        alert_threshold: Option<f64>,

        /// Write reports for events that failed validation to this file
        #[arg(long)]
        rejects: Option<PathBuf>,
    },

    /// Score NDJSON events from stdin (streaming mode)
    Run {
        /// Override the configured alert threshold
        #[arg(long)]
        alert_threshold: Option<f64>,

        /// Stop at the first invalid event instead of skipping it
        #[arg(long)]
        strict: bool,

        /// Do not flush stdout after each record
        #[arg(long)]
        no_flush: bool,
    },

    /// Validate events without scoring
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "auto")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-evaluate scored results under a different alert threshold
    Alert {
        /// Scored results or full pipeline outputs (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "auto")]
        input_format: InputFormat,

        /// Alert threshold (inclusive)
        #[arg(long, default_value_t = DEFAULT_ALERT_THRESHOLD)]
        threshold: f64,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Print the effective configuration as JSON
    Config,

    /// Diagnose configuration and environment
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Infer from the file extension (.jsonl / .ndjson are NDJSON)
    Auto,
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// A JSON object or array of objects
    Json,
}

impl InputFormat {
    fn resolve(&self, path: &Path) -> EventFormat {
        match self {
            InputFormat::Auto => EventFormat::from_path(path),
            InputFormat::Ndjson => EventFormat::Ndjson,
            InputFormat::Json => EventFormat::Json,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliErrorReport::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), WatchCliError> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Score {
            input,
            output,
            input_format,
            output_format,
            alert_threshold,
            rejects,
        } => cmd_score(
            &input,
            &output,
            input_format,
            output_format,
            config_path,
            alert_threshold,
            rejects.as_deref(),
        ),

        Commands::Run {
            alert_threshold,
            strict,
            no_flush,
        } => cmd_run(config_path, alert_threshold, strict, !no_flush),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Alert {
            input,
            input_format,
            threshold,
            output_format,
        } => cmd_alert(&input, input_format, threshold, output_format),

        Commands::Config => cmd_config(config_path),

        Commands::Doctor { json } => cmd_doctor(config_path, json),
    }
}

fn cmd_score(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    config_path: Option<&Path>,
    alert_threshold: Option<f64>,
    rejects: Option<&Path>,
) -> Result<(), WatchCliError> {
    let config = load_config(config_path, alert_threshold)?;

    let input_data = read_input(input)?;
    let events = parse_events(&input_data, input_format.resolve(input))?;
    if events.is_empty() {
        return Err(WatchCliError::NoEvents);
    }

    let processor = RiskProcessor::new(config);
    let report = processor.process_batch(events)?;

    if !report.rejected.is_empty() {
        warn!("{} event(s) failed validation", report.rejected.len());
        if let Some(path) = rejects {
            fs::write(path, serde_json::to_string_pretty(&report.rejected)?)?;
            info!("wrote rejection reports to {}", path.display());
        }
    }

    let output_data = format_output(&report.outputs, &output_format)?;
    write_output(output, &output_data)?;

    Ok(())
}

fn cmd_run(
    config_path: Option<&Path>,
    alert_threshold: Option<f64>,
    strict: bool,
    flush: bool,
) -> Result<(), WatchCliError> {
    let processor = RiskProcessor::new(load_config(config_path, alert_threshold)?);
    info!("streaming with instance {}", processor.instance_id());

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut scored = 0usize;
    let mut skipped = 0usize;

    for (line_num, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let record: Value = serde_json::from_str(trimmed).map_err(|e| {
            WatchCliError::ParseError(format!("Failed to parse line {}: {}", line_num + 1, e))
        })?;

        match processor.process_record(&record) {
            Ok(output) => {
                writeln!(stdout, "{}", serde_json::to_string(&output)?)?;
                if flush {
                    stdout.flush()?;
                }
                scored += 1;
            }
            Err(ComputeError::Validation(issues)) if !strict => {
                let codes: Vec<&str> = issues.iter().map(|i| i.code.as_str()).collect();
                warn!("skipping line {}: {}", line_num + 1, codes.join(", "));
                skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    stdout.flush()?;
    info!("stream closed: {scored} scored, {skipped} skipped");
    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), WatchCliError> {
    let input_data = read_input(input)?;
    let events = parse_events(&input_data, input_format.resolve(input))?;

    let mut errors = Vec::new();
    for (index, event) in events.iter().enumerate() {
        let result = validate_event(event);
        for issue in result.errors {
            errors.push(ValidationErrorDetail {
                index,
                patient_id: event.patient_id.clone(),
                code: issue.code.as_str().to_string(),
                field: issue.field,
                message: issue.message,
            });
        }
    }

    let mut invalid_indices: Vec<usize> = errors.iter().map(|e| e.index).collect();
    invalid_indices.dedup();

    let report = ValidationReport {
        total_events: events.len(),
        valid_events: events.len() - invalid_indices.len(),
        invalid_events: invalid_indices.len(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Valid events:   {}", report.valid_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Event {} (index {}): {} {}",
                    err.patient_id.as_deref().unwrap_or("unknown"),
                    err.index,
                    err.code,
                    err.message
                );
            }
        }
    }

    if report.invalid_events > 0 {
        Err(WatchCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

fn cmd_alert(
    input: &Path,
    input_format: InputFormat,
    threshold: f64,
    output_format: OutputFormat,
) -> Result<(), WatchCliError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ComputeError::InvalidConfig(format!(
            "alert threshold must be within [0, 1], got {threshold}"
        ))
        .into());
    }

    let input_data = read_input(input)?;
    let records = parse_values(&input_data, input_format.resolve(input))?;
    if records.is_empty() {
        return Err(WatchCliError::NoEvents);
    }

    let mut decisions: Vec<AlertDecision> = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        // Full pipeline outputs nest the scored result under `risk_assessment`
        let scored_value = match record {
            Value::Object(mut map) if map.contains_key("risk_assessment") => map
                .remove("risk_assessment")
                .unwrap_or(Value::Null),
            other => other,
        };
        let scored: ScoredResult = serde_json::from_value(scored_value)?;
        let decision = evaluate_alert(&scored, threshold).map_err(|e| {
            warn!("record {index} cannot be evaluated");
            e
        })?;
        decisions.push(decision);
    }

    info!(
        "{} of {} record(s) alert at threshold {threshold}",
        decisions.iter().filter(|d| d.alert).count(),
        decisions.len()
    );

    print!("{}", format_output(&decisions, &output_format)?);
    Ok(())
}

fn cmd_config(config_path: Option<&Path>) -> Result<(), WatchCliError> {
    let config = load_config(config_path, None)?;
    println!("{}", config.to_json()?);
    Ok(())
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), WatchCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} version {}", PRODUCER_NAME, WATCH_VERSION),
    });

    match config_path {
        Some(path) if !path.exists() => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Error,
            message: format!("Config file {} does not exist", path.display()),
        }),
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => match PipelineConfig::from_json(&content) {
                Ok(config) => checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Config valid (bands {}/{}, alert at {})",
                        config.scoring.medium_threshold,
                        config.scoring.high_threshold,
                        config.alert_threshold
                    ),
                }),
                Err(e) => checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                }),
            },
            Err(e) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read config file: {}", e),
            }),
        },
        None => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: "No config file given; using built-in defaults".to_string(),
        }),
    }

    // Check stdin is available (for streaming mode)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: WATCH_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("sepsis-watch Doctor Report");
        println!("==========================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(WatchCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn load_config(
    path: Option<&Path>,
    alert_threshold: Option<f64>,
) -> Result<PipelineConfig, WatchCliError> {
    let mut config = match path {
        Some(path) => {
            info!("loading config from {}", path.display());
            PipelineConfig::from_json(&fs::read_to_string(path)?)?
        }
        None => PipelineConfig::default(),
    };
    if let Some(threshold) = alert_threshold {
        config.alert_threshold = threshold;
        config.validate()?;
    }
    Ok(config)
}

fn read_input(input: &Path) -> Result<String, WatchCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), WatchCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

/// Raw JSON records, for inputs that are not events
fn parse_values(input: &str, format: EventFormat) -> Result<Vec<Value>, WatchCliError> {
    match format {
        EventFormat::Ndjson => input
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_str(line).map_err(WatchCliError::from))
            .collect(),
        EventFormat::Json => match serde_json::from_str(input)? {
            Value::Array(records) => Ok(records),
            object @ Value::Object(_) => Ok(vec![object]),
            _ => Err(WatchCliError::ParseError(
                "Input JSON must be an object or list of objects".to_string(),
            )),
        },
    }
}

fn format_output<T: Serialize>(
    records: &[T],
    format: &OutputFormat,
) -> Result<String, WatchCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

// Error types

#[derive(Debug)]
enum WatchCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoEvents,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for WatchCliError {
    fn from(e: io::Error) -> Self {
        WatchCliError::Io(e)
    }
}

impl From<ComputeError> for WatchCliError {
    fn from(e: ComputeError) -> Self {
        WatchCliError::Compute(e)
    }
}

impl From<serde_json::Error> for WatchCliError {
    fn from(e: serde_json::Error) -> Self {
        WatchCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliErrorReport {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<WatchCliError> for CliErrorReport {
    fn from(e: WatchCliError) -> Self {
        match e {
            WatchCliError::Io(e) => CliErrorReport {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            WatchCliError::Compute(ComputeError::Validation(issues)) => CliErrorReport {
                code: "VALIDATION_ERROR".to_string(),
                message: ComputeError::Validation(issues).to_string(),
                hint: Some("Run 'sepsis-watch validate' for details".to_string()),
            },
            WatchCliError::Compute(ComputeError::InvalidConfig(msg)) => CliErrorReport {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'sepsis-watch config' to see the defaults".to_string()),
            },
            WatchCliError::Compute(ComputeError::MissingField(field)) => CliErrorReport {
                code: "MISSING_FIELD".to_string(),
                message: format!("Missing required field: {}", field),
                hint: Some("Alert evaluation needs scored results".to_string()),
            },
            WatchCliError::Compute(e) => CliErrorReport {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Ensure input records are JSON objects".to_string()),
            },
            WatchCliError::Json(e) => CliErrorReport {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            WatchCliError::NoEvents => CliErrorReport {
                code: "NO_EVENTS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            WatchCliError::ValidationFailed(count) => CliErrorReport {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            WatchCliError::DoctorFailed => CliErrorReport {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            WatchCliError::ParseError(msg) => CliErrorReport {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct ValidationReport {
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(Serialize)]
struct ValidationErrorDetail {
    index: usize,
    patient_id: Option<String>,
    code: String,
    field: Option<String>,
    message: String,
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
