use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use run_journal::{JournalEntryKind, JournalError, RunJournal};
use serde_json::json;
use tempfile::TempDir;

fn write_journal_file(lines: &[String]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("run.jsonl");
    let mut file = File::create(&path).expect("journal file should be created");

    for line in lines {
        writeln!(file, "{line}").expect("line should be written");
    }

    (dir, path)
}

fn header_line() -> String {
    json!({
        "type": "run",
        "version": 1,
        "run_id": "run-1",
        "role": "CODER",
        "created_at": "2026-02-14T00:00:00Z",
    })
    .to_string()
}

fn prompt_line(seq: u64, ts: &str, text: &str) -> String {
    json!({
        "type": "entry",
        "seq": seq,
        "ts": ts,
        "record": { "kind": "prompt", "text": text },
    })
    .to_string()
}

#[test]
fn create_new_writes_header_and_appends_in_order() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let journal_dir = dir.path().join("logs");

    let mut journal = RunJournal::create_new(&journal_dir, "CODER").expect("journal created");
    journal.record_prompt("step prompt").expect("prompt recorded");
    journal
        .record_model_output("<COMMAND>...</COMMAND>")
        .expect("output recorded");
    journal
        .record_execute("read_file", vec!["a.txt".to_string()], "hello")
        .expect("execute recorded");

    assert_eq!(journal.header().role, "CODER");
    assert!(journal.path().starts_with(&journal_dir));
    assert!(journal
        .path()
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.contains("_coder_") && name.ends_with(".jsonl")));

    let reopened = RunJournal::open(journal.path()).expect("journal reopens");
    assert_eq!(reopened.header(), journal.header());
    let seqs: Vec<u64> = reopened.entries().iter().map(|entry| entry.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    assert_eq!(
        reopened.entries()[2].record,
        JournalEntryKind::Execute {
            opcode: "read_file".to_string(),
            arguments: vec!["a.txt".to_string()],
            result: "hello".to_string(),
        }
    );
}

#[test]
fn reopened_journal_continues_sequence() {
    let (_dir, path) = write_journal_file(&[
        header_line(),
        prompt_line(1, "2026-02-14T00:00:01Z", "first"),
    ]);

    let mut journal = RunJournal::open(&path).expect("journal opens");
    let entry = journal
        .append(JournalEntryKind::ModelOutput {
            text: "reply".to_string(),
        })
        .expect("append works");
    assert_eq!(entry.seq, 2);

    let contents = std::fs::read_to_string(&path).expect("read journal");
    assert_eq!(contents.lines().count(), 3);
}

#[test]
fn open_rejects_missing_header() {
    let (_dir, path) = write_journal_file(&[]);

    let error = RunJournal::open(&path).err().expect("empty file must fail");
    assert!(matches!(error, JournalError::MissingHeader { .. }));
}

#[test]
fn open_rejects_entry_as_first_line() {
    let (_dir, path) = write_journal_file(&[prompt_line(1, "2026-02-14T00:00:01Z", "x")]);

    let error = RunJournal::open(&path).err().expect("must fail");
    assert!(matches!(
        error,
        JournalError::InvalidHeaderRecord { line: 1, .. }
    ));
}

#[test]
fn open_rejects_out_of_order_sequence() {
    let (_dir, path) = write_journal_file(&[
        header_line(),
        prompt_line(1, "2026-02-14T00:00:01Z", "first"),
        prompt_line(3, "2026-02-14T00:00:02Z", "skipped"),
    ]);

    let error = RunJournal::open(&path).err().expect("must fail");
    assert!(matches!(
        error,
        JournalError::OutOfOrderEntry {
            line: 3,
            expected: 2,
            found: 3,
            ..
        }
    ));
}

#[test]
fn open_rejects_bad_timestamp_and_version() {
    let (_dir, path) = write_journal_file(&[header_line(), prompt_line(1, "yesterday", "x")]);
    let error = RunJournal::open(&path).err().expect("must fail");
    assert!(matches!(
        error,
        JournalError::InvalidTimestamp { field: "ts", .. }
    ));

    let header = json!({
        "type": "run",
        "version": 2,
        "run_id": "run-1",
        "role": "CODER",
        "created_at": "2026-02-14T00:00:00Z",
    })
    .to_string();
    let (_dir, path) = write_journal_file(&[header]);
    let error = RunJournal::open(&path).err().expect("must fail");
    assert!(matches!(
        error,
        JournalError::UnsupportedVersion { found: 2, .. }
    ));
}

#[test]
fn open_rejects_unknown_fields() {
    let line = json!({
        "type": "entry",
        "seq": 1,
        "ts": "2026-02-14T00:00:01Z",
        "record": { "kind": "prompt", "text": "x" },
        "extra": true,
    })
    .to_string();
    let (_dir, path) = write_journal_file(&[header_line(), line]);

    let error = RunJournal::open(&path).err().expect("must fail");
    assert!(matches!(error, JournalError::JsonLineParse { line: 2, .. }));
}
