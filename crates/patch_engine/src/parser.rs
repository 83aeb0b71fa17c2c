use crate::error::PatchError;
use crate::PatchBlock;

pub const SEARCH_MARKER: &str = "<<<<<<< SEARCH";
pub const DIVIDER_MARKER: &str = "=======";
pub const REPLACE_MARKER: &str = ">>>>>>> REPLACE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Outside,
    Search,
    Replace,
}

/// Returns true when `text` contains at least one SEARCH marker line.
#[must_use]
pub fn looks_like_search_replace(text: &str) -> bool {
    text.lines().any(|line| line.trim_end() == SEARCH_MARKER)
}

/// Parses SEARCH/REPLACE marker text into ordered patch blocks.
///
/// Text outside of blocks (code fences, commentary) is ignored.
pub fn parse_search_replace(text: &str) -> Result<Vec<PatchBlock>, PatchError> {
    let mut blocks = Vec::new();
    let mut state = ParseState::Outside;
    let mut search: Vec<String> = Vec::new();
    let mut replace: Vec<String> = Vec::new();

    for (index, line) in text.split('\n').enumerate() {
        let marker = line.trim_end();
        match state {
            ParseState::Outside => {
                if marker == SEARCH_MARKER {
                    state = ParseState::Search;
                } else if marker == DIVIDER_MARKER || marker == REPLACE_MARKER {
                    return Err(PatchError::BadPatch(format!(
                        "unexpected `{marker}` outside of a block on line {}",
                        index + 1
                    )));
                }
            }
            ParseState::Search => {
                if marker == DIVIDER_MARKER {
                    state = ParseState::Replace;
                } else if marker == SEARCH_MARKER || marker == REPLACE_MARKER {
                    return Err(PatchError::BadPatch(format!(
                        "missing `{DIVIDER_MARKER}` before line {}",
                        index + 1
                    )));
                } else {
                    search.push(line.to_string());
                }
            }
            ParseState::Replace => {
                if marker == REPLACE_MARKER {
                    let block = PatchBlock::from_lines(
                        std::mem::take(&mut search),
                        std::mem::take(&mut replace),
                    );
                    if block.search.is_empty() {
                        return Err(PatchError::BadPatch(format!(
                            "block {} has an empty search section",
                            blocks.len() + 1
                        )));
                    }
                    blocks.push(block);
                    state = ParseState::Outside;
                } else if marker == SEARCH_MARKER || marker == DIVIDER_MARKER {
                    return Err(PatchError::BadPatch(format!(
                        "missing `{REPLACE_MARKER}` before line {}",
                        index + 1
                    )));
                } else {
                    replace.push(line.to_string());
                }
            }
        }
    }

    if state != ParseState::Outside {
        return Err(PatchError::BadPatch(format!(
            "block {} is not terminated",
            blocks.len() + 1
        )));
    }

    if blocks.is_empty() {
        return Err(PatchError::BadPatch(
            "no SEARCH/REPLACE blocks found".to_string(),
        ));
    }

    Ok(blocks)
}
