use std::{fs::File, path::Path};

use crate::reader::{BoundedLine, BoundedLineReader, DEFAULT_MAX_LINE_BYTES};
use crate::{FormatError, PushParser, Record};

pub const LINE_NUMBER_FIELD: &str = "line_number";
pub const LINE_FIELD: &str = "line";

/// Event-driven parser that emits one record per non-blank text line.
///
/// Records carry two fields: [`LINE_NUMBER_FIELD`] (1-based, counting blank lines)
/// and [`LINE_FIELD`].
#[derive(Debug, Clone)]
pub struct LineEventParser {
    max_line_bytes: usize,
    skip_blank: bool,
}

impl Default for LineEventParser {
    fn default() -> Self {
        Self {
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            skip_blank: true,
        }
    }
}

impl LineEventParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    pub fn skip_blank(mut self, skip_blank: bool) -> Self {
        self.skip_blank = skip_blank;
        self
    }
}

impl PushParser for LineEventParser {
    fn parse(
        &mut self,
        path: &Path,
        schema: &mut dyn FnMut(Vec<String>),
        emit: &mut dyn FnMut(Record) -> bool,
    ) -> Result<(), FormatError> {
        let file = File::open(path).map_err(|source| FormatError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        schema(vec![LINE_NUMBER_FIELD.to_string(), LINE_FIELD.to_string()]);

        for line in BoundedLineReader::new(file, self.max_line_bytes) {
            let (line_number, text) = match line {
                BoundedLine::Line { line_number, bytes } => match String::from_utf8(bytes) {
                    Ok(text) => (line_number, text),
                    Err(_) => return Err(FormatError::InvalidUtf8 { line_number }),
                },
                BoundedLine::LineTooLong {
                    line_number,
                    observed_bytes,
                    max_line_bytes,
                } => {
                    return Err(FormatError::LineTooLong {
                        line_number,
                        observed_bytes,
                        max_line_bytes,
                    })
                }
                BoundedLine::IoError {
                    line_number,
                    source,
                } => return Err(FormatError::Read {
                    line_number,
                    source,
                }),
            };

            if self.skip_blank && text.trim().is_empty() {
                continue;
            }

            let record = Record::from_pairs([
                (LINE_NUMBER_FIELD, line_number.to_string()),
                (LINE_FIELD, text),
            ]);
            if !emit(record) {
                tracing::debug!(path = ?path, line_number, "record receiver closed; stopping");
                break;
            }
        }
        Ok(())
    }
}
