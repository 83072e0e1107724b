use std::io::{self, Read};

const CHUNK_SIZE_BYTES: usize = 8192;

pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
pub(crate) enum BoundedLine {
    Line {
        line_number: usize,
        bytes: Vec<u8>,
    },
    LineTooLong {
        line_number: usize,
        observed_bytes: usize,
        max_line_bytes: usize,
    },
    IoError {
        line_number: usize,
        source: io::Error,
    },
}

/// Splits a byte stream on `\n` without ever buffering more than `max_line_bytes`
/// of a single line. Oversized lines are reported once and skipped.
#[derive(Debug)]
pub(crate) struct BoundedLineReader<R: Read> {
    reader: R,
    max_line_bytes: usize,
    buffer: Box<[u8; CHUNK_SIZE_BYTES]>,
    buffer_pos: usize,
    buffer_len: usize,
    current_line: Vec<u8>,
    observed_bytes: usize,
    discard_mode: bool,
    line_number: usize,
    done: bool,
}

impl<R: Read> BoundedLineReader<R> {
    pub(crate) fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader,
            max_line_bytes,
            buffer: Box::new([0u8; CHUNK_SIZE_BYTES]),
            buffer_pos: 0,
            buffer_len: 0,
            current_line: Vec::new(),
            observed_bytes: 0,
            discard_mode: false,
            line_number: 0,
            done: false,
        }
    }

    pub(crate) fn line_number(&self) -> usize {
        self.line_number
    }

    fn finish_line(&mut self) -> BoundedLine {
        self.line_number += 1;
        let line_number = self.line_number;

        if self.discard_mode {
            let observed_bytes = self.observed_bytes;
            self.reset_line_state();
            return BoundedLine::LineTooLong {
                line_number,
                observed_bytes,
                max_line_bytes: self.max_line_bytes,
            };
        }

        let mut bytes = std::mem::take(&mut self.current_line);
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        self.reset_line_state();
        BoundedLine::Line { line_number, bytes }
    }

    fn reset_line_state(&mut self) {
        self.current_line.clear();
        self.observed_bytes = 0;
        self.discard_mode = false;
    }

    fn observe_bytes(&mut self, additional: usize) {
        self.observed_bytes = self.observed_bytes.saturating_add(additional);
        if self.observed_bytes > self.max_line_bytes && !self.discard_mode {
            self.discard_mode = true;
            self.current_line.clear();
        }
    }
}

impl<R: Read> Iterator for BoundedLineReader<R> {
    type Item = BoundedLine;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if self.buffer_pos >= self.buffer_len {
                self.buffer_pos = 0;
                match self.reader.read(&mut self.buffer[..]) {
                    Ok(0) => {
                        self.done = true;
                        if self.discard_mode || !self.current_line.is_empty() {
                            return Some(self.finish_line());
                        }
                        return None;
                    }
                    Ok(n) => self.buffer_len = n,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(source) => {
                        self.done = true;
                        return Some(BoundedLine::IoError {
                            line_number: self.line_number + 1,
                            source,
                        });
                    }
                }
            }

            let slice = &self.buffer[self.buffer_pos..self.buffer_len];
            let Some(newline_idx) = slice.iter().position(|b| *b == b'\n') else {
                let slice_len = slice.len();
                self.observe_bytes(slice_len);
                if !self.discard_mode {
                    self.current_line
                        .extend_from_slice(&self.buffer[self.buffer_pos..self.buffer_len]);
                }
                self.buffer_pos = self.buffer_len;
                continue;
            };

            self.observe_bytes(newline_idx);
            if !self.discard_mode {
                let end = self.buffer_pos + newline_idx;
                self.current_line
                    .extend_from_slice(&self.buffer[self.buffer_pos..end]);
            }
            self.buffer_pos += newline_idx + 1;
            return Some(self.finish_line());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_line_is_discarded_and_iteration_continues() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"ok\n");
        bytes.extend_from_slice(&[b'a'; 50]);
        bytes.extend_from_slice(b"\nnext\r\n");

        let reader = BoundedLineReader::new(std::io::Cursor::new(bytes), 16);
        let lines: Vec<_> = reader.collect();

        assert!(matches!(lines[0], BoundedLine::Line { line_number: 1, .. }));
        assert!(matches!(
            lines[1],
            BoundedLine::LineTooLong {
                line_number: 2,
                observed_bytes: 50,
                ..
            }
        ));
        match &lines[2] {
            BoundedLine::Line { line_number, bytes } => {
                assert_eq!(*line_number, 3);
                assert_eq!(bytes, b"next");
            }
            other => panic!("expected line, got {other:?}"),
        }
    }

    #[test]
    fn final_line_without_newline_is_returned() {
        let reader = BoundedLineReader::new(std::io::Cursor::new(b"a\nb".to_vec()), 16);
        let lines: Vec<_> = reader.collect();
        assert_eq!(lines.len(), 2);
    }
}
