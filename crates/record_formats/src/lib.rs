#![forbid(unsafe_code)]
//! Record model and format adapters consumed by the `dropzone` pipeline.
//!
//! Adapters come in two shapes:
//! - [`RecordReader`]: pull-based, one [`Record`] per call.
//! - [`PushParser`]: event-driven, emits records through a callback.
//!
//! [`FormatSource`] wraps either shape so the pipeline can drive it uniformly. The
//! bundled adapters keep field conversion trivial: every value is text.

mod adapter;
mod delimited;
mod error;
mod lines;
mod raw;
mod reader;
mod record;

pub use adapter::{FormatSource, PushParser, RecordReader};
pub use delimited::{DelimitedOptions, DelimitedTextReader};
pub use error::FormatError;
pub use lines::{LineEventParser, LINE_FIELD, LINE_NUMBER_FIELD};
pub use raw::{RawBytesReader, CONTENT_FIELD, FILE_NAME_FIELD, SIZE_FIELD};
pub use reader::DEFAULT_MAX_LINE_BYTES;
pub use record::Record;
