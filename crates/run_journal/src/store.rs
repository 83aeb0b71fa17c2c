use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::JournalError;
use crate::paths::journal_file_name;
use crate::schema::{JournalEntry, JournalEntryKind, JournalHeader, JsonLine};

/// Open journal file of one run.
///
/// Every append is written and flushed immediately so a crashed run still
/// leaves its records on disk.
pub struct RunJournal {
    path: PathBuf,
    file: File,
    header: JournalHeader,
    entries: Vec<JournalEntry>,
}

impl RunJournal {
    /// Creates `dir` if needed and starts a new journal for `role`.
    pub fn create_new(dir: &Path, role: &str) -> Result<Self, JournalError> {
        fs::create_dir_all(dir)
            .map_err(|source| JournalError::io("create directory", dir, source))?;

        let created_at = now_rfc3339()?;
        let run_id = Uuid::new_v4().to_string();
        let path = dir.join(journal_file_name(&created_at, role, &run_id));
        let header = JournalHeader::v1(run_id, role.trim(), created_at);

        let mut file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|source| JournalError::io("create", &path, source))?;
        let line = serde_json::to_string(&header)
            .map_err(|source| JournalError::Encode {
                path: path.clone(),
                source,
            })?;
        write_line(&mut file, &path, &line)?;

        Ok(Self {
            path,
            file,
            header,
            entries: Vec::new(),
        })
    }

    /// Opens and validates an existing journal; further appends continue its sequence.
    pub fn open(path: &Path) -> Result<Self, JournalError> {
        let path = path.to_path_buf();
        let read_file = File::open(&path)
            .map_err(|source| JournalError::io("open", &path, source))?;
        let reader = BufReader::new(read_file);

        let mut header: Option<JournalHeader> = None;
        let mut entries = Vec::new();

        for (line_index, line_result) in reader.lines().enumerate() {
            let line_number = line_index + 1;
            let line =
                line_result.map_err(|source| JournalError::io("read", &path, source))?;
            let parsed = parse_json_line(&path, line_number, &line)?;

            if line_number == 1 {
                match parsed {
                    JsonLine::Run(parsed_header) => {
                        validate_header_line(&path, line_number, &parsed_header)?;
                        header = Some(parsed_header);
                    }
                    JsonLine::Entry(_) => {
                        return Err(JournalError::InvalidHeaderRecord {
                            path,
                            line: line_number,
                        });
                    }
                }

                continue;
            }

            match parsed {
                JsonLine::Run(_) => {
                    return Err(JournalError::DuplicateHeader {
                        path,
                        line: line_number,
                    });
                }
                JsonLine::Entry(entry) => {
                    validate_rfc3339(&path, line_number, "ts", &entry.ts)?;
                    let expected = entries.len() as u64 + 1;
                    if entry.seq != expected {
                        return Err(JournalError::OutOfOrderEntry {
                            path,
                            line: line_number,
                            expected,
                            found: entry.seq,
                        });
                    }
                    entries.push(entry);
                }
            }
        }

        let header = header.ok_or_else(|| JournalError::MissingHeader { path: path.clone() })?;

        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|source| JournalError::io("reopen for append", &path, source))?;

        Ok(Self {
            path,
            file,
            header,
            entries,
        })
    }

    pub fn append(&mut self, kind: JournalEntryKind) -> Result<&JournalEntry, JournalError> {
        let entry = JournalEntry::new(self.entries.len() as u64 + 1, now_rfc3339()?, kind);
        let line = serde_json::to_string(&entry)
            .map_err(|source| JournalError::Encode {
                path: self.path.clone(),
                source,
            })?;
        write_line(&mut self.file, &self.path, &line)?;

        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }

    pub fn record_prompt(&mut self, text: impl Into<String>) -> Result<(), JournalError> {
        self.append(JournalEntryKind::Prompt { text: text.into() })
            .map(|_| ())
    }

    pub fn record_model_output(&mut self, text: impl Into<String>) -> Result<(), JournalError> {
        self.append(JournalEntryKind::ModelOutput { text: text.into() })
            .map(|_| ())
    }

    pub fn record_execute(
        &mut self,
        opcode: impl Into<String>,
        arguments: Vec<String>,
        result: impl Into<String>,
    ) -> Result<(), JournalError> {
        self.append(JournalEntryKind::Execute {
            opcode: opcode.into(),
            arguments,
            result: result.into(),
        })
        .map(|_| ())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn header(&self) -> &JournalHeader {
        &self.header
    }

    #[must_use]
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }
}

fn write_line(file: &mut File, path: &Path, line: &str) -> Result<(), JournalError> {
    file.write_all(line.as_bytes())
        .and_then(|()| file.write_all(b"\n"))
        .and_then(|()| file.flush())
        .map_err(|source| JournalError::io("append to", path, source))
}

fn now_rfc3339() -> Result<String, JournalError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(JournalError::Clock)
}

fn parse_json_line(path: &Path, line_number: usize, line: &str) -> Result<JsonLine, JournalError> {
    JsonLine::parse(line).map_err(|source| JournalError::JsonLineParse {
        path: path.to_path_buf(),
        line: line_number,
        source,
    })
}

fn validate_header_line(
    path: &Path,
    line_number: usize,
    header: &JournalHeader,
) -> Result<(), JournalError> {
    if header.version != 1 {
        return Err(JournalError::UnsupportedVersion {
            path: path.to_path_buf(),
            line: line_number,
            found: header.version,
        });
    }

    validate_rfc3339(path, line_number, "created_at", &header.created_at)
}

fn validate_rfc3339(
    path: &Path,
    line_number: usize,
    field: &'static str,
    value: &str,
) -> Result<(), JournalError> {
    if OffsetDateTime::parse(value, &Rfc3339).is_err() {
        return Err(JournalError::InvalidTimestamp {
            path: path.to_path_buf(),
            line: line_number,
            field,
            value: value.to_string(),
        });
    }

    Ok(())
}
