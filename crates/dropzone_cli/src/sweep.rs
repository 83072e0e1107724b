use std::path::PathBuf;

use dropzone::{ClaimedFile, DropzoneConfig, RetentionSweeper};
use tokio::task;

use crate::error::CliError;

#[derive(Debug, clap::Parser)]
pub struct Args {
    /// Pipeline configuration (TOML).
    #[arg(long, short)]
    pub config: PathBuf,
}

pub async fn run(args: Args) -> Result<(), CliError> {
    let config = DropzoneConfig::load(&args.config)?;
    let policy = config.retention_policy();
    let directory = match config.retention_directory() {
        Some(directory) if policy.is_enabled() => directory.to_path_buf(),
        _ => return Err(CliError::RetentionDisabled),
    };

    // Nothing is claimed by this process; in-use files are still protected by
    // their locks.
    let sweeper = RetentionSweeper::new(directory, policy, ClaimedFile::new());
    let report = task::spawn_blocking(move || sweeper.sweep_once())
        .await
        .map_err(|err| CliError::Output(std::io::Error::other(err)))?;

    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
