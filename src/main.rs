//! `cfgmatch` binary: run one match-parameter file.
//!
//! ```bash
//! cfgmatch ./match.yaml --log-level debug --log-format json
//! ```
//!
//! `RUST_LOG` takes precedence over `--log-level` when set.

use std::path::PathBuf;

use anyhow::{Context, Result};
use cfgmatch::{MatchParameters, run_match};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Link the records of two environment downloads.
#[derive(Debug, Parser)]
#[command(name = "cfgmatch", version, about)]
struct Cli {
    /// Match-parameter file (YAML).
    match_file: PathBuf,

    /// Log level or filter directive (`info`, `cfgmatch=debug,matcher=trace`).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level `{level}`"))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format)?;

    let params = MatchParameters::from_file(&cli.match_file).with_context(|| {
        format!(
            "failed to load match parameters from {}",
            cli.match_file.display()
        )
    })?;
    info!(
        file = %cli.match_file.display(),
        name = params.name.as_deref().unwrap_or(""),
        output_dir = %params.output_dir.display(),
        "match_parameters_loaded"
    );

    let stats = run_match(&params).context("match run failed")?;
    info!(types = stats.types.len(), "cfgmatch_done");
    Ok(())
}
