//! `invgate` -- consistency gates for securities-lending datasets.
//!
//! Loads a JSON document of datasets keyed by domain, runs every domain's
//! rule set plus the registered market rules, merges an optional
//! schema-layer result, and prints a report.
//!
//! Exits `0` only when both the schema layer and every consistency rule
//! pass; any violation or input failure exits `1`.
//!
//! # Environment variables
//!
//! | Variable                | Required | Default        | Description                        |
//! |-------------------------|----------|----------------|------------------------------------|
//! | `INVGATE_LOG`           | no       | `invgate=info` | `tracing` filter directive (plus the library crates) |
//! | `INVGATE_REPORT_FORMAT` | no       | `text`         | Report format when `--format` is unset |

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use invgate_cli::config::CliConfig;
use invgate_cli::report::ReportFormat;
use invgate_cli::run::{self, RunOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Consistency validation for market, position, calculation, reference
/// and inventory data.
#[derive(Parser, Debug)]
#[command(name = "invgate", version)]
struct Cli {
    /// Input document (defaults to the built-in sample)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Schema-layer result to merge, `{success, violations}`
    #[arg(long)]
    schema_result: Option<PathBuf>,

    /// Also write the rendered report to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Report format (overrides INVGATE_REPORT_FORMAT)
    #[arg(short, long, value_enum)]
    format: Option<ReportFormat>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // `--help` and `--version` exit here, before any environment is read.
    let cli = Cli::parse();

    let config = match CliConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invgate: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = RunOptions {
        input: cli.input,
        schema_result: cli.schema_result,
        output: cli.output,
        format: cli.format.unwrap_or(config.report_format),
    };

    match run::execute(&options).await {
        Ok(outcome) => {
            print!("{}", outcome.report);
            ExitCode::from(outcome.exit_code())
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Validation aborted");
            ExitCode::FAILURE
        }
    }
}
