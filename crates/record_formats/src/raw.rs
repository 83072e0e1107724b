use std::{fs::File, io::Read, path::Path};

use crate::{FormatError, Record, RecordReader};

pub const FILE_NAME_FIELD: &str = "file_name";
pub const SIZE_FIELD: &str = "size";
pub const CONTENT_FIELD: &str = "content";

const DEFAULT_MAX_BYTES: u64 = 16 * 1024 * 1024;

/// Turns a whole file into a single record; content is decoded lossily as UTF-8.
#[derive(Debug)]
pub struct RawBytesReader {
    max_bytes: u64,
    pending: Option<Record>,
    opened: bool,
}

impl Default for RawBytesReader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BYTES)
    }
}

impl RawBytesReader {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            pending: None,
            opened: false,
        }
    }
}

impl RecordReader for RawBytesReader {
    fn open(&mut self, path: &Path) -> Result<(), FormatError> {
        let open_err = |source| FormatError::Open {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(open_err)?;

        let mut bytes = Vec::new();
        file.take(self.max_bytes + 1)
            .read_to_end(&mut bytes)
            .map_err(|source| FormatError::Read {
                line_number: 0,
                source,
            })?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(FormatError::Malformed {
                line_number: 0,
                message: format!("file exceeds {} bytes", self.max_bytes),
            });
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.pending = Some(Record::from_pairs([
            (FILE_NAME_FIELD, file_name),
            (SIZE_FIELD, bytes.len().to_string()),
            (CONTENT_FIELD, String::from_utf8_lossy(&bytes).into_owned()),
        ]));
        self.opened = true;
        Ok(())
    }

    fn read_next(&mut self) -> Result<Option<Record>, FormatError> {
        if !self.opened {
            return Err(FormatError::NotOpen);
        }
        Ok(self.pending.take())
    }

    fn close(&mut self) -> Result<(), FormatError> {
        self.pending = None;
        self.opened = false;
        Ok(())
    }

    fn actual_schema(&self) -> Vec<String> {
        vec![
            FILE_NAME_FIELD.to_string(),
            SIZE_FIELD.to_string(),
            CONTENT_FIELD.to_string(),
        ]
    }
}
