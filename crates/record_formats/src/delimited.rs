use std::{fs::File, path::Path};

use crate::reader::{BoundedLine, BoundedLineReader, DEFAULT_MAX_LINE_BYTES};
use crate::{FormatError, Record, RecordReader};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedOptions {
    pub delimiter: char,
    /// `None` disables quoting entirely.
    pub quote: Option<char>,
    /// When set, the first line supplies the field names and `schema` is ignored.
    pub header: bool,
    pub schema: Vec<String>,
    pub max_line_bytes: usize,
}

impl Default for DelimitedOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: Some('"'),
            header: true,
            schema: Vec::new(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// Reads delimiter-separated text, one record per logical line.
///
/// Quoted fields may contain the delimiter, doubled quotes and line breaks. An
/// unquoted empty field is absent (`None`); a quoted empty field is `Some("")`.
#[derive(Debug)]
pub struct DelimitedTextReader {
    options: DelimitedOptions,
    lines: Option<BoundedLineReader<File>>,
    schema: Vec<String>,
}

impl DelimitedTextReader {
    pub fn new(options: DelimitedOptions) -> Self {
        let schema = if options.header {
            Vec::new()
        } else {
            options.schema.clone()
        };
        Self {
            options,
            lines: None,
            schema,
        }
    }

    /// Reads the next non-blank logical line, joining physical lines while a quoted
    /// field is still open.
    fn next_fields(&mut self) -> Result<Option<Vec<Option<String>>>, FormatError> {
        let delimiter = self.options.delimiter;
        let quote = self.options.quote;
        let lines = self.lines.as_mut().ok_or(FormatError::NotOpen)?;

        let mut logical: Option<(usize, String)> = None;
        loop {
            let Some(next) = lines.next() else {
                return match logical {
                    Some((line_number, _)) => Err(FormatError::Malformed {
                        line_number,
                        message: "unterminated quoted field at end of input".to_string(),
                    }),
                    None => Ok(None),
                };
            };

            let (line_number, text) = match next {
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

            let (start_line, joined) = match logical.take() {
                Some((start, mut pending)) => {
                    pending.push('\n');
                    pending.push_str(&text);
                    (start, pending)
                }
                None => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    (line_number, text)
                }
            };

            match split_fields(&joined, delimiter, quote) {
                Ok(Split::Complete(fields)) => return Ok(Some(fields)),
                Ok(Split::OpenQuote) => logical = Some((start_line, joined)),
                Err(message) => {
                    return Err(FormatError::Malformed {
                        line_number: start_line,
                        message,
                    })
                }
            }
        }
    }
}

impl RecordReader for DelimitedTextReader {
    fn open(&mut self, path: &Path) -> Result<(), FormatError> {
        let file = File::open(path).map_err(|source| FormatError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.lines = Some(BoundedLineReader::new(file, self.options.max_line_bytes));

        if !self.options.header {
            if self.schema.is_empty() {
                return Err(FormatError::MissingSchema);
            }
            return Ok(());
        }

        let header = self.next_fields()?.ok_or(FormatError::MissingSchema)?;
        let mut schema = Vec::with_capacity(header.len());
        for (idx, name) in header.into_iter().enumerate() {
            match name {
                Some(name) if !name.trim().is_empty() => schema.push(name.trim().to_string()),
                _ => {
                    return Err(FormatError::Malformed {
                        line_number: 1,
                        message: format!("header column {} has no name", idx + 1),
                    })
                }
            }
        }
        self.schema = schema;
        Ok(())
    }

    fn read_next(&mut self) -> Result<Option<Record>, FormatError> {
        let Some(values) = self.next_fields()? else {
            return Ok(None);
        };

        if values.len() > self.schema.len() {
            let line_number = self.lines.as_ref().map(|l| l.line_number()).unwrap_or(0);
            return Err(FormatError::Malformed {
                line_number,
                message: format!(
                    "expected at most {} fields, found {}",
                    self.schema.len(),
                    values.len()
                ),
            });
        }

        let mut values = values.into_iter();
        Ok(Some(Record::from_fields(
            self.schema
                .iter()
                .map(|name| (name.clone(), values.next().flatten())),
        )))
    }

    fn close(&mut self) -> Result<(), FormatError> {
        self.lines = None;
        Ok(())
    }

    fn actual_schema(&self) -> Vec<String> {
        self.schema.clone()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Split {
    Complete(Vec<Option<String>>),
    OpenQuote,
}

fn split_fields(line: &str, delimiter: char, quote: Option<char>) -> Result<Split, String> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        let mut value = String::new();
        let quoted = quote.is_some() && chars.peek().copied() == quote;

        if quoted {
            chars.next();
            let mut closed = false;
            while let Some(ch) = chars.next() {
                if Some(ch) == quote {
                    if chars.peek().copied() == quote {
                        chars.next();
                        value.push(ch);
                        continue;
                    }
                    closed = true;
                    break;
                }
                value.push(ch);
            }
            if !closed {
                return Ok(Split::OpenQuote);
            }
            match chars.next() {
                None => {
                    fields.push(Some(value));
                    return Ok(Split::Complete(fields));
                }
                Some(ch) if ch == delimiter => fields.push(Some(value)),
                Some(ch) => {
                    return Err(format!(
                        "unexpected character {ch:?} after closing quote in field {}",
                        fields.len() + 1
                    ))
                }
            }
        } else {
            let mut at_delimiter = false;
            for ch in chars.by_ref() {
                if ch == delimiter {
                    at_delimiter = true;
                    break;
                }
                value.push(ch);
            }
            fields.push((!value.is_empty()).then_some(value));
            if !at_delimiter {
                return Ok(Split::Complete(fields));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(line: &str) -> Vec<Option<String>> {
        match split_fields(line, ',', Some('"')).unwrap() {
            Split::Complete(fields) => fields,
            Split::OpenQuote => panic!("unexpected open quote in {line:?}"),
        }
    }

    #[test]
    fn empty_unquoted_is_absent_and_quoted_empty_is_present() {
        assert_eq!(
            complete(r#"a,,"",d,"#),
            vec![
                Some("a".to_string()),
                None,
                Some(String::new()),
                Some("d".to_string()),
                None
            ]
        );
    }

    #[test]
    fn quoted_fields_keep_delimiters_and_doubled_quotes() {
        assert_eq!(
            complete(r#""Doe, John","say ""hi""""#),
            vec![
                Some("Doe, John".to_string()),
                Some(r#"say "hi""#.to_string())
            ]
        );
    }

    #[test]
    fn open_quote_requests_more_input() {
        assert_eq!(
            split_fields(r#"a,"multi"#, ',', Some('"')).unwrap(),
            Split::OpenQuote
        );
    }

    #[test]
    fn garbage_after_closing_quote_is_rejected() {
        let err = split_fields(r#""a"b,c"#, ',', Some('"')).unwrap_err();
        assert!(err.contains("after closing quote"), "{err}");
    }

    #[test]
    fn quoting_disabled_treats_quotes_literally() {
        match split_fields(r#""a",b"#, ',', None).unwrap() {
            Split::Complete(fields) => {
                assert_eq!(fields[0].as_deref(), Some(r#""a""#));
            }
            Split::OpenQuote => panic!("quoting is disabled"),
        }
    }
}
