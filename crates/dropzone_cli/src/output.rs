use std::{
    io::{self, Write},
    path::Path,
};

use dropzone::{ConsumerError, FileReport, RecordConsumer};
use record_formats::Record;
use serde::Serialize;
use tracing::warn;

#[derive(Serialize)]
struct RecordLine<'a> {
    file: &'a Path,
    record: &'a Record,
}

/// Writes `{"file": ..., "record": {...}}` per record, one JSON document per line.
pub struct JsonLinesConsumer<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesConsumer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, path: &Path, record: &Record) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, &RecordLine { file: path, record })?;
        self.writer.write_all(b"\n")
    }
}

impl<W: Write> RecordConsumer for JsonLinesConsumer<W> {
    fn consume(&mut self, path: &Path, record: Record) -> Result<(), ConsumerError> {
        self.write_line(path, &record)
            .map_err(|err| ConsumerError::failed("failed to write record", err))
    }

    fn finish_file(&mut self, report: &FileReport) {
        if let Err(error) = self.writer.flush() {
            warn!(?error, path = ?report.path, "failed to flush record output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_json_object_per_record() {
        let mut consumer = JsonLinesConsumer::new(Vec::new());
        let path = Path::new("/spool/users.csv");
        consumer
            .consume(path, Record::from_pairs([("id", "1"), ("name", "alice")]))
            .unwrap();
        consumer
            .consume(path, Record::from_fields([("id", Some("2".to_string())), ("name", None)]))
            .unwrap();

        let text = String::from_utf8(consumer.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"file":"/spool/users.csv","record":{"id":"1","name":"alice"}}"#,
                r#"{"file":"/spool/users.csv","record":{"id":"2","name":null}}"#,
            ]
        );
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_rejects_the_record() {
        let mut consumer = JsonLinesConsumer::new(Broken);
        let err = consumer
            .consume(Path::new("/a"), Record::from_pairs([("id", "1")]))
            .unwrap_err();
        assert!(matches!(err, ConsumerError::Failed { .. }));
    }
}
