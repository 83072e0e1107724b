use std::io;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::error::CliError;

/// Logs go to stderr; stdout is reserved for JSON output.
pub fn init(level: Option<&str>) -> Result<(), CliError> {
    let filter = match level {
        Some(directives) => {
            EnvFilter::try_new(directives).map_err(|err| CliError::LogFilter(err.to_string()))?
        }
        None => EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy(),
    };

    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact();

    Registry::default()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|err| CliError::Logging(err.to_string()))
}
