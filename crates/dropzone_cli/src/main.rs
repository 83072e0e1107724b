#![forbid(unsafe_code)]

mod error;
mod logging;
mod output;
mod run;
mod scan;
mod sweep;

use clap::{Parser, Subcommand};

use crate::error::CliError;

#[derive(Debug, Parser)]
#[command(name = "dropzone")]
#[command(about = "Ingest files dropped into a watched directory")]
#[command(version)]
struct Cli {
    /// Log filter directive (e.g. `debug`, `dropzone=trace`); overrides `RUST_LOG`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process files and print every record as a JSON line on stdout.
    Run(run::Args),
    /// List eligible files in the order they would be claimed.
    Scan(scan::Args),
    /// Run one retention pass and print what it removed.
    Sweep(sweep::Args),
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref())?;

    let result = match cli.command {
        Command::Run(args) => run::run(args).await,
        Command::Scan(args) => scan::run(args),
        Command::Sweep(args) => sweep::run(args).await,
    };
    if let Err(error) = &result {
        tracing::error!(%error, "dropzone failed");
    }
    result
}
