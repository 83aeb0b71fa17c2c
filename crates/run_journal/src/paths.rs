#[must_use]
pub fn sanitize_timestamp_for_filename(timestamp: &str) -> String {
    timestamp
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' | ' ' => '-',
            _ => c,
        })
        .collect()
}

/// File name of a journal: `<timestamp>_<role>_<run id>.jsonl`, role lowercased.
#[must_use]
pub fn journal_file_name(created_at: &str, role: &str, run_id: &str) -> String {
    format!(
        "{}_{}_{}.jsonl",
        sanitize_timestamp_for_filename(created_at),
        role.trim().to_ascii_lowercase(),
        run_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_filesystem_safe() {
        assert_eq!(
            journal_file_name("2026-02-14T10:20:30Z", "CODER", "abc"),
            "2026-02-14T10-20-30Z_coder_abc.jsonl"
        );
    }
}
