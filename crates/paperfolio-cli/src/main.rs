mod cli;
mod commands;
mod error;
mod logging;
mod metadata;
mod output;

use std::process::ExitCode;

use clap::Parser;
use paperfolio_core::Envelope;
use serde_json::Value;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref());

    if let Err(error) = execute(&cli).await {
        eprintln!("paperfolio: {error}");
        return ExitCode::from(error.exit_code());
    }
    ExitCode::SUCCESS
}

async fn execute(cli: &Cli) -> Result<(), CliError> {
    let envelope = commands::run(cli).await?;
    output::render(&envelope, cli.format, cli.pretty)?;
    enforce_strict(&envelope, cli.strict)
}

/// Under `--strict` any warning or error fails the run, after the envelope
/// has been printed.
fn enforce_strict(envelope: &Envelope<Value>, strict: bool) -> Result<(), CliError> {
    let warning_count = envelope.meta.warnings.len();
    let error_count = envelope.errors.len();
    if strict && warning_count + error_count > 0 {
        return Err(CliError::StrictModeViolation {
            warning_count,
            error_count,
        });
    }
    Ok(())
}
