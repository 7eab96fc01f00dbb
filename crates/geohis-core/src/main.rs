//! GeoHIS - Geohazard Susceptibility Engine
//!
//! The main entry point for `geohis`, handling:
//! - Flood and landslide analyses over point files
//! - Configuration inspection and validation
//! - JSON Schema output for every document the engine reads or writes

use clap::{Args, Parser, Subcommand};
use geohis_common::error::format_error_human;
use geohis_common::{Error, OutputFormat, StructuredError, StudyArea, SCHEMA_VERSION};
use geohis_core::config::{load_config, ConfigOptions, ResolvedConfig};
use geohis_core::coordinator::{AnalysisCoordinator, AnalysisFailure, CancellationToken};
use geohis_core::events::{JsonlSink, TelemetrySink};
use geohis_core::exit_codes::ExitCode;
use geohis_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use geohis_core::request::{AnalysisInput, AnalysisRequest, WeightsOverride};
use geohis_core::result::AnalysisResult;
use geohis_core::sampler::{table_layers, TableSource};
use geohis_core::schema::{
    available_schemas, format_schema, generate_all_schemas, generate_schema, SchemaFormat,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// GeoHIS - flood and landslide susceptibility for point sets
#[derive(Parser)]
#[command(name = "geohis")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Engine configuration file (JSON or TOML)
    #[arg(long, global = true, env = "GEOHIS_CONFIG")]
    config: Option<PathBuf>,

    /// Output format for stdout payloads
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format (human, json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a flood and landslide analysis over an input point file
    Analyze(AnalyzeArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Print JSON schemas for engine documents
    Schema(SchemaArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Input document: points with factor values, optional inventory
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Study area as "min_lat,max_lat,min_lon,max_lon"
    #[arg(long)]
    study_area: Option<String>,

    /// Weights override file (JSON)
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Random seed for bootstrap and cross-validation
    #[arg(long)]
    seed: Option<u64>,

    /// Result file, or directory receiving <session_id>.json
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Append stage events as JSON lines to this file
    #[arg(long)]
    events: Option<PathBuf>,

    /// Cancel the analysis after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the effective configuration and its provenance
    Show,
    /// Validate a configuration file
    Validate {
        /// File to validate (default: the resolved configuration)
        path: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Type to print
    name: Option<String>,

    /// List available types
    #[arg(long)]
    list: bool,

    /// Print every schema
    #[arg(long)]
    all: bool,

    /// Single-line JSON
    #[arg(long)]
    compact: bool,
}

// ============================================================================
// Main entry point
// ============================================================================

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    init_logging(&log_config);

    let exit_code = match &cli.command {
        Commands::Analyze(args) => run_analyze(&cli.global, args),
        Commands::Config(args) => run_config(&cli.global, args),
        Commands::Schema(args) => run_schema(&cli.global, args),
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// analyze
// ============================================================================

fn run_analyze(global: &GlobalOpts, args: &AnalyzeArgs) -> ExitCode {
    let resolved = match load_config(&ConfigOptions {
        config_path: global.config.clone(),
    }) {
        Ok(r) => r,
        Err(e) => return output_error(global, &e.into()),
    };

    let (mut request, table) = match read_input(&args.input) {
        Ok(parts) => parts,
        Err(e) => return output_error(global, &e),
    };
    if let Some(bbox) = &args.study_area {
        match StudyArea::parse_bbox("cli", bbox) {
            Ok(area) => request.study_area = Some(area),
            Err(e) => return output_error(global, &e),
        }
    }
    if let Some(path) = &args.weights {
        match read_weights(path) {
            Ok(w) => request.weights_override = Some(w),
            Err(e) => return output_error(global, &e),
        }
    }
    if let Some(seed) = args.seed {
        request.seed = Some(seed);
    }

    let mut coordinator =
        AnalysisCoordinator::new(resolved.engine, table_layers(Arc::new(table)));
    if let Some(path) = &args.events {
        match open_events(path) {
            Ok(sink) => coordinator = coordinator.with_sink(sink),
            Err(e) => return output_error(global, &e),
        }
    }

    let cancel = match args.timeout {
        Some(secs) => CancellationToken::with_timeout(Duration::from_secs(secs)),
        None => CancellationToken::new(),
    };

    match coordinator.run(&request, &cancel) {
        Ok(result) => {
            let code = if result.cancelled {
                ExitCode::Cancelled
            } else {
                ExitCode::Ok
            };
            match emit_result(global, args.output.as_deref(), &result) {
                Ok(()) => code,
                Err(e) => output_error(global, &e),
            }
        }
        Err(failure) => output_failure(global, &failure),
    }
}

fn read_input(path: &Path) -> Result<(AnalysisRequest, TableSource), Error> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::MalformedInput(format!("cannot read input {}: {}", path.display(), e))
    })?;
    Ok(AnalysisInput::from_json_str(&content)?.into_request())
}

fn read_weights(path: &Path) -> Result<WeightsOverride, Error> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::MalformedInput(format!("cannot read weights {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content)
        .map_err(|e| Error::MalformedInput(format!("weights file {}: {}", path.display(), e)))
}

fn open_events(path: &Path) -> Result<Arc<dyn TelemetrySink>, Error> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(Arc::new(JsonlSink::new(file)))
}

/// Persist the result (when `--output` is set) and print the payload.
fn emit_result(
    global: &GlobalOpts,
    output: Option<&Path>,
    result: &AnalysisResult,
) -> Result<(), Error> {
    let written = match output {
        Some(target) => {
            let path = if target.is_dir() {
                target.join(result.session_id.file_name())
            } else {
                target.to_path_buf()
            };
            std::fs::write(&path, result.to_json_pretty()?)?;
            tracing::info!(path = %path.display(), "result written");
            Some(path)
        }
        None => None,
    };

    let summary = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "session_id": result.session_id,
        "state": result.state,
        "cancelled": result.cancelled,
        "points": result.flood_scores.len(),
        "in_area": result.in_area_count,
        "warnings": result.warnings().count(),
        "auc": result.validation.as_ref().map(|v| v.auc),
        "output": written.as_ref().map(|p| p.display().to_string()),
    });

    match (global.format, &written) {
        (OutputFormat::Summary, _) => {
            println!(
                "[{}] {:?}: {} points ({} in area), {} warnings{}",
                result.session_id,
                result.state,
                result.flood_scores.len(),
                result.in_area_count,
                result.warnings().count(),
                written
                    .as_ref()
                    .map(|p| format!(", written to {}", p.display()))
                    .unwrap_or_default()
            );
        }
        (OutputFormat::Json, Some(_)) => println!("{}", serde_json::to_string(&summary)?),
        (OutputFormat::Pretty, Some(_)) => println!("{}", serde_json::to_string_pretty(&summary)?),
        (OutputFormat::Json, None) => println!("{}", serde_json::to_string(result)?),
        (OutputFormat::Pretty, None) => println!("{}", result.to_json_pretty()?),
    }
    Ok(())
}

// ============================================================================
// config
// ============================================================================

fn run_config(global: &GlobalOpts, args: &ConfigArgs) -> ExitCode {
    match &args.command {
        ConfigCommands::Show => run_config_show(global),
        ConfigCommands::Validate { path } => {
            let path = path.clone().or_else(|| global.config.clone());
            run_config_validate(global, path)
        }
    }
}

/// Display the effective configuration (built-in defaults if no file found).
fn run_config_show(global: &GlobalOpts) -> ExitCode {
    let resolved = match load_config(&ConfigOptions {
        config_path: global.config.clone(),
    }) {
        Ok(r) => r,
        Err(e) => return output_error(global, &e.into()),
    };
    let snapshot = resolved.snapshot();

    let response = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "source": &snapshot,
        "config": &resolved.engine,
    });
    match global.format {
        OutputFormat::Summary => {
            println!(
                "config: source={} hash={} flood={} landslide={}",
                snapshot.source,
                snapshot.short_id(),
                snapshot.summary.flood_factors.join(","),
                snapshot.summary.landslide_factors.join(",")
            );
            ExitCode::Ok
        }
        format => print_json(global, &response, format == OutputFormat::Pretty),
    }
}

fn run_config_validate(global: &GlobalOpts, path: Option<PathBuf>) -> ExitCode {
    let resolved = match load_config(&ConfigOptions { config_path: path }) {
        Ok(r) => r,
        Err(e) => return output_error(global, &e.into()),
    };
    let response = validate_response(&resolved);
    match global.format {
        OutputFormat::Summary => {
            println!("config validate: OK ({})", resolved.paths.source);
            ExitCode::Ok
        }
        format => print_json(global, &response, format == OutputFormat::Pretty),
    }
}

fn validate_response(resolved: &ResolvedConfig) -> serde_json::Value {
    let snapshot = resolved.snapshot();
    serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "status": "valid",
        "path": snapshot.config_path,
        "using_defaults": resolved.using_defaults(),
        "config_hash": snapshot.config_hash,
    })
}

// ============================================================================
// schema
// ============================================================================

fn run_schema(global: &GlobalOpts, args: &SchemaArgs) -> ExitCode {
    let format = if args.compact {
        SchemaFormat::JsonCompact
    } else {
        SchemaFormat::Json
    };

    if args.list || (args.name.is_none() && !args.all) {
        for (name, description) in available_schemas() {
            println!("{:<22} {}", name, description);
        }
        return ExitCode::Ok;
    }

    let value = if args.all {
        serde_json::to_value(generate_all_schemas()).map_err(Error::from)
    } else {
        let name = args.name.as_deref().unwrap_or_default();
        generate_schema(name).ok_or_else(|| {
            Error::MalformedInput(format!(
                "unknown schema type '{}'; see `geohis schema --list`",
                name
            ))
        })
    };

    match value.and_then(|v| format_schema(&v, format).map_err(Error::from)) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::Ok
        }
        Err(e) => output_error(global, &e),
    }
}

// ============================================================================
// Output helpers
// ============================================================================

fn print_json(global: &GlobalOpts, value: &serde_json::Value, pretty: bool) -> ExitCode {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match text {
        Ok(text) => {
            println!("{}", text);
            ExitCode::Ok
        }
        Err(e) => output_error(global, &e.into()),
    }
}

/// Report an error on stderr and map it to an exit code.
fn output_error(global: &GlobalOpts, error: &Error) -> ExitCode {
    match global.format {
        OutputFormat::Summary => {
            eprintln!("{}", format_error_human(error, std::io::stderr().is_terminal()));
        }
        _ => eprintln!("{}", StructuredError::from(error).to_json()),
    }
    ExitCode::from_error_kind(error.kind())
}

/// Report a terminal analysis failure on stderr.
fn output_failure(global: &GlobalOpts, failure: &AnalysisFailure) -> ExitCode {
    match global.format {
        OutputFormat::Summary => {
            eprintln!(
                "[{}] {:?} at {}: {}",
                failure.session_id, failure.kind, failure.stage, failure.detail
            );
        }
        _ => match serde_json::to_string(failure) {
            Ok(json) => eprintln!("{}", json),
            Err(_) => eprintln!("{}", failure),
        },
    }
    failure.exit_code()
}
