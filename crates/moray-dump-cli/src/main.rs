//! moray-dump CLI - extract Moray buckets from a `pg_dump` backup.

use clap::error::ErrorKind;
use clap::Parser;
use moray_dump::{extract_buckets_to_files, load_buckets_config, ExtractConfig, ExtractError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, Level};

/// Bad arguments or configuration file.
const EXIT_USAGE: u8 = 1;
/// Reading the bucket configuration failed.
const EXIT_CONFIG_PASS: u8 = 2;
/// Writing the bucket tables failed.
const EXIT_EXTRACT_PASS: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "moray-dump")]
#[command(about = "Extract Moray bucket contents from a gzip-compressed pg_dump file")]
#[command(version)]
struct Cli {
    /// Gzip-compressed pg_dump plain-text output
    input_file: PathBuf,

    /// Directory to create for the per-bucket JSON files (must not exist)
    output_dir: PathBuf,

    /// Path to YAML tuning file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log format: text or json
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", value_parser = ["debug", "info", "warn", "error"])]
    verbosity: String,

    /// Interval between throughput reports, in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    report_interval_ms: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(EXIT_USAGE),
            };
            let _ = e.print();
            return code;
        }
    };

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => return fail(&e, EXIT_USAGE),
    };

    let buckets = match load_buckets_config(&cli.input_file, &config).await {
        Ok(buckets) => buckets,
        Err(e) => return fail(&e, EXIT_CONFIG_PASS),
    };

    match extract_buckets_to_files(&cli.input_file, &cli.output_dir, &buckets, &config).await {
        Ok(summary) => {
            debug!("{}", summary.summary());
            eprintln!("ok");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e, EXIT_EXTRACT_PASS),
    }
}

fn fail(error: &ExtractError, code: u8) -> ExitCode {
    eprintln!("{}", error.format_detailed());
    ExitCode::from(code)
}

fn load_config(cli: &Cli) -> Result<ExtractConfig, ExtractError> {
    let mut config = match &cli.config {
        Some(path) => ExtractConfig::load(path).map_err(|e| match e {
            ExtractError::Io(io) => ExtractError::Config(format!("{}: {}", path.display(), io)),
            other => other,
        })?,
        None => ExtractConfig::default(),
    };

    if let Some(ms) = cli.report_interval_ms {
        config = config.with_report_interval(Duration::from_millis(ms));
    }

    if cli.input_file.as_os_str().is_empty() {
        return Err(ExtractError::Argument("input file must not be empty".into()));
    }
    if cli.output_dir.as_os_str().is_empty() {
        return Err(ExtractError::Argument("output directory must not be empty".into()));
    }

    Ok(config)
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout is left unused; all diagnostics go to stderr.
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
