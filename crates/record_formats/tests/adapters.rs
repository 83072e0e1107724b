use std::{fs, path::PathBuf};

use record_formats::{
    DelimitedOptions, DelimitedTextReader, FormatError, FormatSource, LineEventParser,
    RawBytesReader, Record, RecordReader, CONTENT_FIELD, LINE_FIELD, LINE_NUMBER_FIELD,
};
use tempfile::TempDir;

fn write_fixture(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write fixture");
    path
}

fn drive(
    source: FormatSource,
    path: &std::path::Path,
) -> (Vec<String>, Result<Vec<Record>, FormatError>) {
    let mut schema = Vec::new();
    let mut records = Vec::new();
    let result = source.drive(
        path,
        &mut |names| schema = names,
        &mut |record| {
            records.push(record);
            true
        },
    );
    (schema, result.map(|()| records))
}

#[test]
fn header_defines_schema_and_quoted_newlines_join_lines() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_fixture(
        &dir,
        "users.csv",
        "uid,cn,description\njdoe,\"Doe, John\",\"line one\nline two\"\n\nasmith,,\"\"\n",
    );

    let mut reader = DelimitedTextReader::new(DelimitedOptions::default());
    reader.open(&path).expect("open");
    assert_eq!(reader.actual_schema(), vec!["uid", "cn", "description"]);

    let first = reader.read_next().expect("read").expect("first record");
    assert_eq!(first.value("cn"), Some("Doe, John"));
    assert_eq!(first.value("description"), Some("line one\nline two"));

    let second = reader.read_next().expect("read").expect("second record");
    assert_eq!(second.value("uid"), Some("asmith"));
    assert_eq!(second.field("cn"), Some(None));
    assert_eq!(second.field("description"), Some(Some("")));

    assert!(reader.read_next().expect("read").is_none());
    reader.close().expect("close");
}

#[test]
fn configured_schema_is_used_without_header_and_short_rows_pad_with_absent() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_fixture(&dir, "rows.txt", "1;alpha\n2\n");

    let options = DelimitedOptions {
        delimiter: ';',
        header: false,
        schema: vec!["id".to_string(), "name".to_string()],
        ..DelimitedOptions::default()
    };
    let (schema, records) = drive(FormatSource::pull(DelimitedTextReader::new(options)), &path);
    let records = records.expect("records");

    assert_eq!(schema, vec!["id", "name"]);
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].value("id"), Some("2"));
    assert_eq!(records[1].field("name"), Some(None));
}

#[test]
fn too_many_fields_is_malformed() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_fixture(&dir, "bad.csv", "a,b\n1,2\n1,2,3\n");

    let (_, result) = drive(
        FormatSource::pull(DelimitedTextReader::new(DelimitedOptions::default())),
        &path,
    );
    match result {
        Err(FormatError::Malformed { line_number, message }) => {
            assert_eq!(line_number, 3);
            assert!(message.contains("at most 2"), "{message}");
        }
        other => panic!("expected malformed error, got {other:?}"),
    }
}

#[test]
fn missing_schema_without_header_fails_open() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_fixture(&dir, "rows.txt", "1,2\n");

    let mut reader = DelimitedTextReader::new(DelimitedOptions {
        header: false,
        ..DelimitedOptions::default()
    });
    assert!(matches!(reader.open(&path), Err(FormatError::MissingSchema)));
}

#[test]
fn line_parser_emits_until_receiver_declines() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_fixture(&dir, "events.log", "first\n\nsecond\nthird\n");

    let mut seen = Vec::new();
    let source = FormatSource::push(LineEventParser::new());
    let result = source.drive(&path, &mut |_| {}, &mut |record| {
        seen.push(record);
        seen.len() < 2
    });

    assert!(result.is_ok());
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].value(LINE_FIELD), Some("second"));
    assert_eq!(seen[1].value(LINE_NUMBER_FIELD), Some("3"));
}

#[test]
fn raw_reader_yields_single_record() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_fixture(&dir, "blob.bin", "payload");

    let (_, records) = drive(FormatSource::pull(RawBytesReader::default()), &path);
    let records = records.expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].value(CONTENT_FIELD), Some("payload"));
}

#[test]
fn raw_reader_rejects_oversized_files() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_fixture(&dir, "blob.bin", "0123456789");

    let mut reader = RawBytesReader::new(4);
    assert!(matches!(
        reader.open(&path),
        Err(FormatError::Malformed { .. })
    ));
}
