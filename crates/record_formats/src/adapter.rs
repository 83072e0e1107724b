use std::path::Path;

use crate::{FormatError, Record};

/// Pull-style adapter: the caller asks for records one at a time.
pub trait RecordReader: Send {
    fn open(&mut self, path: &Path) -> Result<(), FormatError>;

    /// Returns `Ok(None)` at end of input.
    fn read_next(&mut self) -> Result<Option<Record>, FormatError>;

    fn close(&mut self) -> Result<(), FormatError>;

    /// Field names actually in effect; may differ from the configured schema once a
    /// header line has been read.
    fn actual_schema(&self) -> Vec<String>;
}

/// Push-style adapter: the parser drives itself and hands each record to `emit`.
///
/// `emit` returns `false` once the receiving side no longer accepts records; the
/// parser should stop and return `Ok(())`.
pub trait PushParser: Send {
    fn parse(
        &mut self,
        path: &Path,
        schema: &mut dyn FnMut(Vec<String>),
        emit: &mut dyn FnMut(Record) -> bool,
    ) -> Result<(), FormatError>;
}

/// A format adapter in whichever style it is written.
pub enum FormatSource {
    Pull(Box<dyn RecordReader>),
    Push(Box<dyn PushParser>),
}

impl FormatSource {
    pub fn pull(reader: impl RecordReader + 'static) -> Self {
        Self::Pull(Box::new(reader))
    }

    pub fn push(parser: impl PushParser + 'static) -> Self {
        Self::Push(Box::new(parser))
    }

    /// Runs the adapter to completion against `path`, calling `emit` for each record.
    ///
    /// Pull readers are always closed, even when reading fails; the read error wins
    /// over a close error.
    pub fn drive(
        self,
        path: &Path,
        schema: &mut dyn FnMut(Vec<String>),
        emit: &mut dyn FnMut(Record) -> bool,
    ) -> Result<(), FormatError> {
        match self {
            FormatSource::Push(mut parser) => parser.parse(path, schema, emit),
            FormatSource::Pull(mut reader) => {
                reader.open(path)?;
                schema(reader.actual_schema());
                let result = pull_all(reader.as_mut(), emit);
                let closed = reader.close();
                result.and(closed)
            }
        }
    }
}

impl std::fmt::Debug for FormatSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatSource::Pull(_) => f.write_str("FormatSource::Pull(..)"),
            FormatSource::Push(_) => f.write_str("FormatSource::Push(..)"),
        }
    }
}

fn pull_all(
    reader: &mut dyn RecordReader,
    emit: &mut dyn FnMut(Record) -> bool,
) -> Result<(), FormatError> {
    while let Some(record) = reader.read_next()? {
        if !emit(record) {
            break;
        }
    }
    Ok(())
}
