use std::{future, io, path::PathBuf};

use dropzone::DropzoneConfig;
use tracing::{info, warn};

use crate::error::CliError;
use crate::output::JsonLinesConsumer;

#[derive(Debug, clap::Parser)]
pub struct Args {
    /// Pipeline configuration (TOML).
    #[arg(long, short)]
    pub config: PathBuf,

    /// Process what is eligible now and exit instead of polling until Ctrl-C.
    #[arg(long)]
    pub once: bool,
}

pub async fn run(args: Args) -> Result<(), CliError> {
    let config = DropzoneConfig::load(&args.config)?;
    let pipeline = config.into_pipeline()?;
    info!(directory = ?pipeline.directory(), once = args.once, "starting pipeline");

    let mut consumer = JsonLinesConsumer::new(io::stdout().lock());
    let summary = if args.once {
        pipeline.drain_available(&mut consumer).await?
    } else {
        pipeline.run(&mut consumer, shutdown_signal()).await?
    };

    info!(
        files = summary.files,
        completed = summary.completed,
        failed = summary.failed,
        records = summary.records,
        "done"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(?error, "cannot listen for Ctrl-C; running until killed");
        future::pending::<()>().await;
    }
    info!("shutdown requested");
}
