use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by a format adapter while opening or reading a file.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to open `{path}`: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error while reading line {line_number}: {source}")]
    Read {
        line_number: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line_number} is not valid UTF-8")]
    InvalidUtf8 { line_number: usize },
    #[error("line too long (line={line_number}, observed_bytes={observed_bytes}, max_line_bytes={max_line_bytes})")]
    LineTooLong {
        line_number: usize,
        observed_bytes: usize,
        max_line_bytes: usize,
    },
    #[error("line {line_number}: {message}")]
    Malformed { line_number: usize, message: String },
    #[error("no schema available: header disabled and no schema configured")]
    MissingSchema,
    #[error("adapter used before open")]
    NotOpen,
}
