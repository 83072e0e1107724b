use std::{io, path::PathBuf};

use dropzone::{ConfigError, PipelineError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("invalid log filter: {0}")]
    LogFilter(String),
    #[error("failed to install log subscriber: {0}")]
    Logging(String),
    #[error("failed to list `{directory}`")]
    Scan { directory: PathBuf },
    #[error("retention is not configured (set [retention] max_age_secs > 0 and a directory)")]
    RetentionDisabled,
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}
