use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunRecordType {
    Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryRecordType {
    Entry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JournalHeader {
    #[serde(rename = "type")]
    pub record_type: RunRecordType,
    pub version: u32,
    pub run_id: String,
    pub role: String,
    pub created_at: String,
}

impl JournalHeader {
    #[must_use]
    pub fn v1(
        run_id: impl Into<String>,
        role: impl Into<String>,
        created_at: impl Into<String>,
    ) -> Self {
        Self {
            record_type: RunRecordType::Run,
            version: 1,
            run_id: run_id.into(),
            role: role.into(),
            created_at: created_at.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JournalEntry {
    #[serde(rename = "type")]
    pub record_type: EntryRecordType,
    /// 1-based position among the entries of the run.
    pub seq: u64,
    pub ts: String,
    pub record: JournalEntryKind,
}

impl JournalEntry {
    #[must_use]
    pub fn new(seq: u64, ts: impl Into<String>, kind: JournalEntryKind) -> Self {
        Self {
            record_type: EntryRecordType::Entry,
            seq,
            ts: ts.into(),
            record: kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEntryKind {
    Prompt {
        text: String,
    },
    ModelOutput {
        text: String,
    },
    Execute {
        opcode: String,
        arguments: Vec<String>,
        result: String,
    },
}

pub(crate) enum JsonLine {
    Run(JournalHeader),
    Entry(JournalEntry),
}

impl JsonLine {
    /// Dispatches on the `type` field before decoding the full record.
    pub(crate) fn parse(line: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        match value.get("type").and_then(serde_json::Value::as_str) {
            Some("run") => serde_json::from_value(value).map(Self::Run),
            _ => serde_json::from_value(value).map(Self::Entry),
        }
    }
}
