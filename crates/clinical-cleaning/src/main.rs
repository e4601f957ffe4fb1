//! CLI entry point for the clinical cleaning pipeline.

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use clinical_cleaning::{
    CleaningConfig, CleaningError, Exporter, Pipeline, PipelineResult, RuleSet,
};
use dotenv::dotenv;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Auditable cleaning pipeline for clinical CSV datasets",
    long_about = "Validates and cleans a clinical dataset, writing the cleaned CSV, \
                  quality metrics and a JSON Lines audit log.\n\n\
                  EXAMPLES:\n  \
                  # Clean with the default rules\n  \
                  clinical-cleaning -i raw/patients.csv -o output/patients_clean.csv\n\n  \
                  # Use a rule file\n  \
                  clinical-cleaning -i raw/patients.csv -o output/clean.csv -c rules.yaml\n\n  \
                  # Show the rules a configuration implies\n  \
                  clinical-cleaning -c rules.yaml --list-rules"
)]
struct Args {
    /// Path to the CSV file to clean
    #[arg(short, long, required_unless_present = "list_rules")]
    input: Option<PathBuf>,

    /// Path of the cleaned CSV file
    ///
    /// Its directory also receives the audit log and metrics. Defaults to
    /// the configured output directory and name.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON or YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the record key field
    #[arg(long)]
    key_field: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Output JSON to stdout instead of human-readable summary
    ///
    /// Disables all logs; only outputs the final JSON report.
    #[arg(long)]
    json: bool,

    /// Print the validation rules and exit
    #[arg(long)]
    list_rules: bool,

    /// Do not write any file (cleaned data, metrics or audit log)
    #[arg(long)]
    no_save: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    // Load environment variables first so RUST_LOG from .env applies
    dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level, args.quiet, args.json);

    let config = build_config(&args)?;

    if args.list_rules {
        return print_rules(&RuleSet::from_config(&config), args.json);
    }

    let input = args
        .input
        .as_deref()
        .ok_or_else(|| anyhow!("--input is required"))?;

    let pipeline = Pipeline::builder().config(config).build()?;

    match pipeline.process_file(input) {
        Ok(result) => handle_success(&result, input, &args),
        Err(e) => handle_failure(e, &args),
    }
}

/// Load the configuration file (if any) and apply CLI overrides.
fn build_config(args: &Args) -> Result<CleaningConfig> {
    let mut config = match &args.config {
        Some(path) => CleaningConfig::from_path(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => CleaningConfig::default(),
    };

    if let Some(key_field) = &args.key_field {
        config.key_field = key_field.clone();
    }

    if let Some(output) = &args.output {
        let is_csv = output
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv {
            bail!("--output must name a .csv file, got {}", output.display());
        }
        config.output_dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        config.output_name = extract_file_stem(output);
    }

    if args.no_save {
        config.save_to_disk = false;
    }

    config.validate()?;
    Ok(config)
}

/// Extract the file stem (name without extension) from a path.
fn extract_file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("cleaned_dataset")
        .to_string()
}

fn print_rules(rules: &RuleSet, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(rules)?);
        return Ok(());
    }

    for rule in rules.iter() {
        println!("{:<32} {:<14} {}", rule.id, format!("{:?}", rule.severity), rule.description);
    }
    Ok(())
}

/// Print the run outcome.
///
/// - Default: human-readable summary and audit narration
/// - `--json`: the full report as JSON, nothing else on stdout
fn handle_success(result: &PipelineResult, input: &Path, args: &Args) -> Result<()> {
    let report = Exporter::build_report(&input.display().to_string(), result);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("{}", "=".repeat(80));
    println!("CLEANING COMPLETE");
    println!("{}", "=".repeat(80));
    println!(
        "Input:  {} ({} records)",
        report.input_file, report.records_before
    );
    match &report.output_file {
        Some(output) => println!("Output: {} ({} records)", output, report.records_after),
        None => println!("Output: not written ({} records)", report.records_after),
    }
    if let Some(audit) = &report.audit_file {
        println!("Audit:  {}", audit);
    }
    if let Some(metrics) = &report.metrics_file {
        println!("Metrics: {}", metrics);
    }
    println!("Duration: {}ms", report.duration_ms);
    println!();
    print!("{}", Exporter::render_summary(&result.metrics, &result.audit));
    println!("{}", "=".repeat(80));

    info!("Run {} complete", result.run_id);
    Ok(())
}

/// Report a failed run and exit non-zero.
fn handle_failure(e: CleaningError, args: &Args) -> Result<()> {
    let audit_path = e.audit_path().map(|p| p.display().to_string());

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "error": &e,
                "audit_file": audit_path,
                "audit_entries": e.audit_log().map(|log| log.entries()),
            }))?
        );
    } else {
        error!("Cleaning failed: {}", e);
        if let Some(log) = e.audit_log() {
            for line in log.narrate() {
                eprintln!("  {}", line);
            }
        }
        if let Some(path) = &audit_path {
            eprintln!("Audit log written to {}", path);
        }
    }

    Err(anyhow!("{} ({})", e, e.error_code()))
}
