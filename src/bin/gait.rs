//! Gait CLI - Command-line interface for MobiGait
//!
//! Commands:
//! - replay: Run a recorded sensor stream through the motion pipeline
//! - metrics: Compute distance, calories, and BMI for a step count
//! - classify: Classify a set of gait features
//! - config: Print or validate pipeline configuration

use clap::{Parser, Subcommand};
use log::{info, warn};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use mobigait_core::classifier::GaitClassifier;
use mobigait_core::features::correct_cadence_outlier;
use mobigait_core::metrics::{estimated_duration_ms, BodyMassIndex, MetricsAggregator};
use mobigait_core::store::{MemoryStore, PersistenceQueue, StepStore};
use mobigait_core::types::{GaitFeatures, MotionEvent, SensorEvent};
use mobigait_core::{MotionConfig, MotionError, MotionProcessor, UserProfile};
use mobigait_core::{MOBIGAIT_VERSION, PRODUCER_NAME};

/// Gait - On-device step counting and gait-quality metrics
#[derive(Parser)]
#[command(name = "gait")]
#[command(author = "MobiGait Contributors")]
#[command(version = MOBIGAIT_VERSION)]
#[command(about = "Replay sensor streams through the MobiGait motion pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay NDJSON sensor events and print NDJSON pipeline events
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Pipeline configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// User profile (JSON)
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Treat the device as having a hardware step counter
        #[arg(long)]
        hardware_counter: bool,

        /// Load the record store from a snapshot file
        #[arg(long)]
        load_store: Option<PathBuf>,

        /// Save the record store snapshot after replay
        #[arg(long)]
        save_store: Option<PathBuf>,

        /// Stop tracking at the last sample timestamp
        #[arg(long)]
        stop: bool,
    },

    /// Compute step metrics for a step count
    Metrics {
        /// Step count
        #[arg(short, long)]
        steps: u32,

        /// Active duration in milliseconds (defaults to the step estimate)
        #[arg(long)]
        duration_ms: Option<i64>,

        /// User profile (JSON)
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Scale calories by the profile gender factor
        #[arg(long)]
        gender_factor: bool,
    },

    /// Classify gait features
    Classify {
        /// Raw cadence (steps/min), corrected before classification
        #[arg(long)]
        cadence: f64,

        /// Step-interval standard deviation (ms)
        #[arg(long, default_value = "0")]
        variability: f64,

        /// Symmetry index (%)
        #[arg(long, default_value = "0")]
        symmetry: f64,

        /// Estimated step length (m)
        #[arg(long, default_value = "0")]
        step_length: f64,

        /// Pipeline configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration (defaults, or a validated file)
    Config {
        /// Configuration file to validate
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), GaitCliError> {
    match cli.command {
        Commands::Replay {
            input,
            config,
            profile,
            hardware_counter,
            load_store,
            save_store,
            stop,
        } => cmd_replay(
            &input,
            config.as_deref(),
            profile.as_deref(),
            hardware_counter,
            load_store.as_deref(),
            save_store.as_deref(),
            stop,
        ),

        Commands::Metrics {
            steps,
            duration_ms,
            profile,
            gender_factor,
        } => cmd_metrics(steps, duration_ms, profile.as_deref(), gender_factor),

        Commands::Classify {
            cadence,
            variability,
            symmetry,
            step_length,
            config,
        } => cmd_classify(cadence, variability, symmetry, step_length, config.as_deref()),

        Commands::Config { file } => cmd_config(file.as_deref()),
    }
}

fn cmd_replay(
    input: &Path,
    config: Option<&Path>,
    profile: Option<&Path>,
    hardware_counter: bool,
    load_store: Option<&Path>,
    save_store: Option<&Path>,
    stop: bool,
) -> Result<(), GaitCliError> {
    let input_data = read_input(input)?;
    let events = parse_ndjson(&input_data)?;
    let (first_ts, last_ts) = match (events.first(), events.last()) {
        (Some(first), Some(last)) => (first.timestamp(), last.timestamp()),
        _ => return Err(GaitCliError::NoEvents),
    };

    let config = load_config(config)?;
    let profile = load_profile(profile)?;
    let store = match load_store {
        Some(path) => MemoryStore::from_json(&fs::read_to_string(path)?).map_err(MotionError::from)?,
        None => MemoryStore::new(),
    };

    let queue = Arc::new(PersistenceQueue::new(store)?);
    let mut processor = MotionProcessor::new(
        config,
        Arc::new(profile),
        Box::new(Arc::clone(&queue)),
        hardware_counter,
        first_ts,
    )?;
    let today = processor.session().current_day;
    if processor.restore_today(queue.read(|s| s.step_record_for_day(today))?, first_ts) {
        info!("Restored {} steps for {}", processor.session().step_count, today);
    }

    info!(
        "{} {}: replaying {} samples in {:?} mode",
        PRODUCER_NAME,
        MOBIGAIT_VERSION,
        events.len(),
        processor.counting_mode()
    );

    let mut stdout = io::stdout().lock();
    let mut emitted = 0usize;

    emitted += write_events(&mut stdout, &processor.start_tracking(first_ts))?;
    let sample_count = events.len();
    for event in events {
        let timestamp = event.timestamp();
        emitted += write_events(&mut stdout, &processor.maybe_roll_day(timestamp))?;
        emitted += write_events(&mut stdout, &processor.process_sample(event))?;
    }
    if stop {
        emitted += write_events(&mut stdout, &processor.stop_tracking(last_ts))?;
    }
    stdout.flush()?;

    queue.flush()?;
    if let Some(path) = save_store {
        fs::write(path, queue.read(|s| s.to_json())?)?;
    }

    info!(
        "Replayed {} samples: {} events, {} steps",
        sample_count,
        emitted,
        processor.session().step_count
    );
    Ok(())
}

fn cmd_metrics(
    steps: u32,
    duration_ms: Option<i64>,
    profile: Option<&Path>,
    gender_factor: bool,
) -> Result<(), GaitCliError> {
    let profile = load_profile(profile)?;
    let duration_ms = duration_ms.unwrap_or_else(|| estimated_duration_ms(steps));

    let metrics = MetricsAggregator::new(gender_factor).compute(steps, duration_ms, &profile);
    let report = MetricsReport {
        metrics,
        bmi: BodyMassIndex::from_profile(&profile),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_classify(
    cadence: f64,
    variability: f64,
    symmetry: f64,
    step_length: f64,
    config: Option<&Path>,
) -> Result<(), GaitCliError> {
    if ![cadence, variability, symmetry, step_length].iter().all(|v| v.is_finite() && *v >= 0.0) {
        return Err(GaitCliError::InvalidArgument(
            "Gait features must be finite and non-negative".to_string(),
        ));
    }
    let config = load_config(config)?;

    let features = GaitFeatures {
        cadence: correct_cadence_outlier(cadence, config.cadence_outlier_trigger, config.cadence_ceiling),
        step_variability: variability,
        symmetry_index: symmetry,
        step_length,
    };
    let result = GaitClassifier::evaluate(features, chrono::Utc::now().timestamp_millis());
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn cmd_config(file: Option<&Path>) -> Result<(), GaitCliError> {
    let config = load_config(file)?;
    println!("{}", config.to_json()?);
    Ok(())
}

fn read_input(input: &Path) -> Result<String, GaitCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            warn!("Reading sensor events from an interactive terminal; end input with Ctrl-D");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_ndjson(data: &str) -> Result<Vec<SensorEvent>, GaitCliError> {
    let mut events = Vec::new();
    for (index, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event: SensorEvent = serde_json::from_str(trimmed).map_err(|e| {
            GaitCliError::ParseError(format!("Failed to parse event on line {}: {}", index + 1, e))
        })?;
        events.push(event);
    }
    Ok(events)
}

fn load_config(path: Option<&Path>) -> Result<MotionConfig, GaitCliError> {
    match path {
        Some(path) => Ok(MotionConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(MotionConfig::default()),
    }
}

fn load_profile(path: Option<&Path>) -> Result<UserProfile, GaitCliError> {
    match path {
        Some(path) => Ok(UserProfile::from_json(&fs::read_to_string(path)?)?),
        None => Ok(UserProfile::default()),
    }
}

fn write_events(out: &mut impl Write, events: &[MotionEvent]) -> Result<usize, GaitCliError> {
    for event in events {
        writeln!(out, "{}", serde_json::to_string(event)?)?;
    }
    Ok(events.len())
}

// Error types

#[derive(Debug)]
enum GaitCliError {
    Io(io::Error),
    Motion(MotionError),
    Json(serde_json::Error),
    NoEvents,
    InvalidArgument(String),
    ParseError(String),
}

impl From<io::Error> for GaitCliError {
    fn from(e: io::Error) -> Self {
        GaitCliError::Io(e)
    }
}

impl From<MotionError> for GaitCliError {
    fn from(e: MotionError) -> Self {
        GaitCliError::Motion(e)
    }
}

impl From<serde_json::Error> for GaitCliError {
    fn from(e: serde_json::Error) -> Self {
        GaitCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<GaitCliError> for CliError {
    fn from(e: GaitCliError) -> Self {
        match e {
            GaitCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            GaitCliError::Motion(MotionError::InvalidConfig(msg)) => CliError {
                code: "INVALID_CONFIG".to_string(),
                message: msg,
                hint: Some("Run 'gait config' to see the defaults".to_string()),
            },
            GaitCliError::Motion(e) => CliError {
                code: "PIPELINE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            GaitCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            GaitCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No sensor events found in input".to_string(),
                hint: Some("Ensure input is NDJSON with one sensor event per line".to_string()),
            },
            GaitCliError::InvalidArgument(msg) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message: msg,
                hint: None,
            },
            GaitCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Events look like {\"sensor\":\"accelerometer\",\"timestamp\":0,\"x\":0,\"y\":9.8,\"z\":0}".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct MetricsReport {
    metrics: mobigait_core::StepMetrics,
    bmi: Option<BodyMassIndex>,
}
