//! Fuzzy SEARCH/REPLACE patch application for model-authored edits.
//!
//! A patch names the lines to change by quoting them; quotes are matched after
//! removing every whitespace character, so reindented or reflowed fragments
//! still locate their target. Every fragment must resolve to exactly one
//! location, otherwise the buffer is left untouched and a [`PatchError`] is
//! returned.

use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::Path;

use similar::TextDiff;

mod error;
mod parser;

pub use error::{PatchError, PatchFileError};
pub use parser::{
    looks_like_search_replace, parse_search_replace, DIVIDER_MARKER, REPLACE_MARKER,
    SEARCH_MARKER,
};

/// One SEARCH/REPLACE unit of a patch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchBlock {
    pub search: Vec<String>,
    pub replace: Vec<String>,
}

impl PatchBlock {
    /// Builds a block from raw fragment strings.
    ///
    /// A single trailing newline on either fragment does not produce an extra
    /// empty line, and an empty `replace` yields a deletion.
    #[must_use]
    pub fn new(search: &str, replace: &str) -> Self {
        Self::from_lines(split_fragment(search), split_fragment(replace))
    }

    #[must_use]
    pub fn from_lines(search: Vec<String>, replace: Vec<String>) -> Self {
        Self { search, replace }
    }
}

/// A patch request as issued by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchRequest {
    /// Single `find`/`replace` string pair.
    Literal { find: String, replace: String },
    /// Ordered multi-block form.
    Blocks(Vec<PatchBlock>),
}

/// Result of a successful patch application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub text: String,
    pub applied_blocks: usize,
    /// True when the literal fast path matched byte-for-byte.
    pub exact: bool,
}

/// Applies `request` to `source`.
pub fn apply_patch(source: &str, request: &PatchRequest) -> Result<PatchOutcome, PatchError> {
    match request {
        PatchRequest::Literal { find, replace } => apply_literal(source, find, replace),
        PatchRequest::Blocks(blocks) => apply_blocks(source, blocks),
    }
}

/// Applies a single `find`/`replace` pair.
///
/// An exact, unique occurrence of `find` is replaced verbatim. Without an exact
/// occurrence the pair is retried as a whitespace-insensitive line block.
pub fn apply_literal(source: &str, find: &str, replace: &str) -> Result<PatchOutcome, PatchError> {
    if find.trim().is_empty() {
        return Err(PatchError::BadPatch(
            "find fragment must not be empty".to_string(),
        ));
    }

    match count_occurrences(source, find) {
        0 => apply_blocks(source, &[PatchBlock::new(find, replace)]),
        1 => Ok(PatchOutcome {
            text: source.replacen(find, replace, 1),
            applied_blocks: 1,
            exact: true,
        }),
        count => Err(PatchError::AmbiguousMatch { block: 0, count }),
    }
}

/// Applies ordered blocks using whitespace-insensitive line matching.
///
/// Blocks are located in document order: each search starts right after the
/// lines matched by the previous block, so repeated fragments address
/// successive occurrences. All blocks are located before the buffer is
/// modified.
pub fn apply_blocks(source: &str, blocks: &[PatchBlock]) -> Result<PatchOutcome, PatchError> {
    if blocks.is_empty() {
        return Err(PatchError::BadPatch("patch contains no blocks".to_string()));
    }

    let lines: Vec<&str> = source.split('\n').collect();
    let normalized: Vec<String> = lines.iter().map(|line| normalize_line(line)).collect();
    let searches = blocks
        .iter()
        .enumerate()
        .map(|(index, block)| normalized_search(index, block))
        .collect::<Result<Vec<_>, _>>()?;
    let needles: Vec<&[String]> = searches.iter().map(|search| search.lines.as_slice()).collect();

    let mut located: Vec<(Range<usize>, &[String])> = Vec::with_capacity(blocks.len());
    let mut cursor = 0usize;
    let mut previous: Option<Range<usize>> = None;

    for (index, ((block, search), needle)) in blocks.iter().zip(&searches).zip(&needles).enumerate() {
        let candidates = find_windows(&normalized, needle, cursor, normalized.len());
        let Some(&start) = candidates.first() else {
            if let Some(previous) = &previous {
                let overlapping =
                    find_windows(&normalized, needle, previous.start + 1, previous.end);
                if !overlapping.is_empty() {
                    return Err(PatchError::OverlappingBlocks { block: index });
                }
            }
            return Err(PatchError::NotFound { block: index });
        };

        // Identical fragments later in the same request claim the following occurrences.
        let claimants = needles[index..]
            .iter()
            .filter(|&&other| other == *needle)
            .count();
        if candidates.len() > claimants {
            return Err(PatchError::AmbiguousMatch {
                block: index,
                count: candidates.len(),
            });
        }

        let window = start..start + needle.len();
        cursor = window.end;
        previous = Some(window.clone());
        located.push((window, search.replacement(&block.replace)));
    }

    let applied_blocks = located.len();
    let mut output: Vec<String> = lines.iter().map(|line| (*line).to_string()).collect();
    for (window, replace) in located.into_iter().rev() {
        output.splice(window, replace.iter().cloned());
    }

    Ok(PatchOutcome {
        text: output.join("\n"),
        applied_blocks,
        exact: false,
    })
}

/// Removes every whitespace character from `line`.
#[must_use]
pub fn normalize_line(line: &str) -> String {
    line.chars().filter(|ch| !ch.is_whitespace()).collect()
}

/// Renders a unified diff between two buffers, for logs and summaries.
#[must_use]
pub fn unified_diff(before: &str, after: &str, label: &str) -> String {
    TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(2)
        .header(label, label)
        .to_string()
}

/// Applies SEARCH/REPLACE marker text to the file at `path` in place and
/// writes a short summary with the resulting diff to `stdout`.
pub fn apply_patch_to_file(
    path: &Path,
    patch: &str,
    stdout: &mut impl Write,
) -> Result<PatchOutcome, PatchFileError> {
    let blocks = parse_search_replace(patch)?;
    let before = fs::read_to_string(path)
        .map_err(|source| PatchFileError::io("reading", path, source))?;
    let outcome = apply_blocks(&before, &blocks)?;

    fs::write(path, &outcome.text).map_err(|source| PatchFileError::io("writing", path, source))?;

    let label = path.display().to_string();
    write!(
        stdout,
        "Success. Applied {} block(s) to {label}\n{}",
        outcome.applied_blocks,
        unified_diff(&before, &outcome.text, &label)
    )
    .map_err(|source| PatchFileError::io("writing summary for", path, source))?;

    Ok(outcome)
}

fn split_fragment(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let text = text.strip_suffix('\n').unwrap_or(text);
    text.split('\n').map(str::to_string).collect()
}

/// A block's normalized search lines without blank edge lines, plus how many
/// blank lines were dropped at each edge.
struct NormalizedSearch {
    lines: Vec<String>,
    leading: usize,
    trailing: usize,
}

impl NormalizedSearch {
    /// Drops the blank replacement lines that pair with the dropped search
    /// edges, so the splice keeps `before - search + replace` lines.
    fn replacement<'a>(&self, replace: &'a [String]) -> &'a [String] {
        let is_blank = |line: &&String| line.trim().is_empty();
        let leading = replace.iter().take(self.leading).take_while(is_blank).count();
        let rest = &replace[leading..];
        let trailing = rest.iter().rev().take(self.trailing).take_while(is_blank).count();
        &rest[..rest.len() - trailing]
    }
}

/// Number of start offsets at which `find` occurs, overlapping ones included.
fn count_occurrences(source: &str, find: &str) -> usize {
    source
        .char_indices()
        .filter(|(offset, _)| source[*offset..].starts_with(find))
        .count()
}

fn normalized_search(index: usize, block: &PatchBlock) -> Result<NormalizedSearch, PatchError> {
    let normalized: Vec<String> = block.search.iter().map(|line| normalize_line(line)).collect();
    let Some(first) = normalized.iter().position(|line| !line.is_empty()) else {
        return Err(PatchError::BadPatch(format!(
            "search fragment of block {} must not be empty",
            index + 1
        )));
    };
    let last = normalized
        .iter()
        .rposition(|line| !line.is_empty())
        .unwrap_or(first);

    Ok(NormalizedSearch {
        lines: normalized[first..=last].to_vec(),
        leading: first,
        trailing: normalized.len() - 1 - last,
    })
}

/// Start offsets `s` in `from..until` where `needle` matches `haystack[s..s + needle.len()]`.
fn find_windows(haystack: &[String], needle: &[String], from: usize, until: usize) -> Vec<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return Vec::new();
    }

    let last_start = haystack.len() - needle.len();
    let until = until.min(last_start + 1);
    (from..until)
        .filter(|&start| haystack[start..start + needle.len()] == *needle)
        .collect()
}
