use std::{path::PathBuf, time::UNIX_EPOCH};

use dropzone::DropzoneConfig;
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, clap::Parser)]
pub struct Args {
    /// Pipeline configuration (TOML).
    #[arg(long, short)]
    pub config: PathBuf,
}

#[derive(Debug, Serialize)]
struct CandidateLine {
    path: PathBuf,
    size: Option<u64>,
    modified_unix_secs: Option<u64>,
}

pub fn run(args: Args) -> Result<(), CliError> {
    let config = DropzoneConfig::load(&args.config)?;
    let pipeline = config.into_pipeline()?;
    let candidates = pipeline.scan().ok_or_else(|| CliError::Scan {
        directory: pipeline.directory().to_path_buf(),
    })?;

    for candidate in candidates {
        let line = CandidateLine {
            size: candidate.size(),
            modified_unix_secs: candidate
                .modified()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .map(|age| age.as_secs()),
            path: candidate.into_path(),
        };
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}
