use std::path::PathBuf;

use thiserror::Error;

/// Errors preparing or matching the watched directory.
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("`{path}` exists but is not a directory")]
    NotADirectory { path: PathBuf },
    #[error("failed to create directory `{path}`: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to resolve directory `{path}`: {source}")]
    ResolveDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid name pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Errors moving or deleting a file after its records were consumed.
#[derive(Debug, Error)]
pub enum DisposeError {
    #[error("failed to delete `{path}`: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create archive directory `{path}`: {source}")]
    CreateArchive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to archive `{from}` to `{to}`: {source}")]
    Archive {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("`{path}` has no file name")]
    NoFileName { path: PathBuf },
}

/// Errors starting or driving an external post-processing command.
///
/// These never leave [`crate::PostProcessor::run`]; they are logged there.
#[derive(Debug, Error)]
pub enum PostProcessError {
    #[error("post-process command must not be empty")]
    EmptyCommand,
    #[error("post-process command `{program}` could not be spawned: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("post-process stdout unavailable")]
    StdoutUnavailable,
    #[error("post-process stderr unavailable")]
    StderrUnavailable,
    #[error("failed to wait for post-process command: {source}")]
    Wait {
        #[source]
        source: std::io::Error,
    },
}

/// Errors loading or validating a TOML configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Claim(#[from] ClaimError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    PostProcess(#[from] PostProcessError),
}

/// Errors that stop the pipeline driver itself.
///
/// Per-file failures (parse errors, consumer rejections, disposition problems) are
/// reported through [`crate::FileReport`] instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Directory(#[from] ClaimError),
    #[error("failed to start parse worker for `{path}`: {source}")]
    SpawnWorker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Raised by a [`crate::RecordConsumer`] that refuses a record.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("{0}")]
    Rejected(String),
    #[error("{message}: {source}")]
    Failed {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ConsumerError {
    pub fn failed(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Failed {
            message: message.into(),
            source: Box::new(source),
        }
    }
}
