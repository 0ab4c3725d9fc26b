use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crda_matcher::{
    config::Config,
    matcher::Matcher,
    output::{format_result_to_string, print_result, MatchReport, OutputFormat},
    BatchResult, PackageRecord, QueryFailure, Severity,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const CRITICAL_VULN: u8 = 2;
    pub const HIGH_VULN: u8 = 3;
    pub const MEDIUM_VULN: u8 = 4;
    pub const LOW_VULN: u8 = 5;
    pub const ERROR: u8 = 1;
}

#[derive(Parser)]
#[command(name = "crda-matcher")]
#[command(
    author,
    version,
    about = "Look up known vulnerabilities of packages with CodeReady Dependency Analytics"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query vulnerabilities for a list of packages
    Query {
        /// JSON file with an array of {id, name, version, ecosystem} records, or - for stdin
        #[arg(short, long)]
        input: String,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Write output to file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Read configuration from this file instead of the default location
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the service URL
        #[arg(long)]
        url: Option<String>,

        /// Override the access key
        #[arg(long)]
        api_key: Option<String>,

        /// Override the maximum number of concurrent requests
        #[arg(long)]
        concurrency: Option<usize>,

        /// Override the per-request timeout, in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Exit with error if vulnerabilities at or above this severity are found
        #[arg(long, value_enum)]
        fail_on: Option<FailLevel>,
    },

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FailLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl FailLevel {
    fn threshold(self) -> Severity {
        match self {
            FailLevel::Critical => Severity::Critical,
            FailLevel::High => Severity::High,
            FailLevel::Medium => Severity::Medium,
            FailLevel::Low => Severity::Low,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "crda_matcher=warn",
        1 => "crda_matcher=info",
        _ => "crda_matcher=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Commands::Query {
            input,
            format,
            output,
            config,
            url,
            api_key,
            concurrency,
            timeout,
            fail_on,
        } => {
            let mut config = match config {
                Some(path) => Config::load_from(&path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => Config::load()?,
            };
            if let Some(url) = url {
                config.url = url;
            }
            if let Some(key) = api_key {
                config.api_key = key;
            }
            if let Some(n) = concurrency {
                config.concurrency = n;
            }
            if let Some(secs) = timeout {
                config.request_timeout_secs = secs;
            }

            run_query(&config, &input, &format, output, fail_on).await
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

async fn run_query(
    config: &Config,
    input: &str,
    format: &str,
    output_file: Option<PathBuf>,
    fail_on: Option<FailLevel>,
) -> Result<u8> {
    let format = OutputFormat::from_str(format).map_err(|e| anyhow::anyhow!(e))?;
    let is_interactive = format == OutputFormat::Table && output_file.is_none();

    let (failures_tx, mut failures_rx) = mpsc::unbounded_channel();
    let matcher = config
        .build_matcher(None)?
        .with_failure_sink(failures_tx);

    let records: Vec<Arc<PackageRecord>> = read_records(input)?
        .into_iter()
        .filter(|r| matcher.filter(r))
        .map(PackageRecord::shared)
        .collect();
    info!(matcher = matcher.name(), records = records.len(), "loaded records");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, returning partial results");
            on_interrupt.cancel();
        }
    });

    let progress = if is_interactive {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Querying {} packages...", records.len()));
        Some(pb)
    } else {
        None
    };

    let results = matcher.query_remote_until(&records, &cancel).await?;
    drop(matcher);

    let mut failures: Vec<QueryFailure> = Vec::new();
    while let Some(failure) = failures_rx.recv().await {
        failures.push(failure);
    }

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let report = MatchReport {
        records: &records,
        results: &results,
        failures: &failures,
    };

    if let Some(path) = output_file {
        std::fs::write(&path, format_result_to_string(&report, format)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("Results written to: {}", path.display());
    } else {
        print_result(&report, format)?;
    }

    Ok(determine_exit_code(&results, fail_on))
}

fn read_records(input: &str) -> Result<Vec<PackageRecord>> {
    let content = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read records from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("failed to read {}", input))?
    };

    serde_json::from_str(&content).context("input must be a JSON array of package records")
}

/// Determine the exit code based on vulnerabilities found and --fail-on setting
fn determine_exit_code(results: &BatchResult, fail_on: Option<FailLevel>) -> u8 {
    let Some(fail_on) = fail_on else {
        return exit_codes::SUCCESS;
    };

    let worst = results
        .values()
        .flatten()
        .map(|v| v.normalized_severity)
        .max()
        .unwrap_or_default();

    if worst < fail_on.threshold() {
        return exit_codes::SUCCESS;
    }

    match worst {
        Severity::Critical => exit_codes::CRITICAL_VULN,
        Severity::High => exit_codes::HIGH_VULN,
        Severity::Medium => exit_codes::MEDIUM_VULN,
        _ => exit_codes::LOW_VULN,
    }
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        Config::default().save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    if config_path.exists() {
        println!("Config file: {}", config_path.display());
    } else {
        println!("No config file at {}, using defaults.", config_path.display());
        println!("Run 'crda-matcher config --init' to create one.");
    }
    println!();
    println!("Effective configuration:");
    let config = Config::load()?;
    println!("{}", toml::to_string_pretty(&config.redacted())?);

    Ok(())
}
