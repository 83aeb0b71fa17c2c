//! Decoder for the free-text tag protocol (`<COMMAND>`, `<OPCODE>`, `<ARG>`, ...).
//!
//! Matching is non-greedy and spans lines, so adjacent same-named tags are
//! captured independently. Nested same-named tags are not supported.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use regex::Regex;

/// One occurrence of a tag, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMatch {
    /// `(name, value)` of the attribute when the tag used the `<TAG name="x">` form.
    pub attribute: Option<(String, String)>,
    pub body: String,
}

struct TagPatterns {
    plain: Regex,
    attributed: Regex,
}

/// Returns every body enclosed by each of `tag_names`.
///
/// Plain `<TAG>` occurrences win over attributed `<TAG a=...>` ones: when a
/// tag appears in plain form at least once, attributed occurrences of it are
/// ignored. Tags that do not occur are absent from the map.
pub fn decode_tags(text: &str, tag_names: &[&str]) -> BTreeMap<String, Vec<String>> {
    let mut decoded = BTreeMap::new();

    for tag in tag_names {
        let matches = decode_attributed_tags(text, tag);
        let has_plain = matches.iter().any(|found| found.attribute.is_none());
        let bodies: Vec<String> = matches
            .into_iter()
            .filter(|found| found.attribute.is_none() == has_plain)
            .map(|found| found.body)
            .collect();

        if !bodies.is_empty() {
            decoded.insert((*tag).to_string(), bodies);
        }
    }

    decoded
}

/// Returns all occurrences of `tag_name` in both forms, in document order.
pub fn decode_attributed_tags(text: &str, tag_name: &str) -> Vec<TagMatch> {
    let patterns = patterns_for(tag_name);

    let mut found: Vec<(usize, TagMatch)> = patterns
        .plain
        .captures_iter(text)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let body = captures.get(1)?;
            Some((
                whole.start(),
                TagMatch {
                    attribute: None,
                    body: body.as_str().to_string(),
                },
            ))
        })
        .collect();

    found.extend(patterns.attributed.captures_iter(text).filter_map(|captures| {
        let whole = captures.get(0)?;
        let name = captures.get(1)?;
        let value = captures.get(2)?;
        let body = captures.get(3)?;
        Some((
            whole.start(),
            TagMatch {
                attribute: Some((
                    name.as_str().to_string(),
                    unquote(value.as_str().trim()).to_string(),
                )),
                body: body.as_str().to_string(),
            },
        ))
    }));

    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, found)| found).collect()
}

/// Removes every `<TAG>...</TAG>` block (both forms) and returns the remaining text, trimmed.
pub fn strip_tags(text: &str, tag_name: &str) -> String {
    let patterns = patterns_for(tag_name);
    let without_plain = patterns.plain.replace_all(text, "");
    patterns
        .attributed
        .replace_all(&without_plain, "")
        .trim()
        .to_string()
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .or_else(|| {
            value
                .strip_prefix('\'')
                .and_then(|rest| rest.strip_suffix('\''))
        })
        .unwrap_or(value)
}

fn patterns_for(tag_name: &str) -> Arc<TagPatterns> {
    static CACHE: OnceLock<Mutex<HashMap<String, Arc<TagPatterns>>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));

    let mut cache = lock_unpoisoned(cache);
    if let Some(patterns) = cache.get(tag_name) {
        return Arc::clone(patterns);
    }

    let tag = regex::escape(tag_name);
    let patterns = Arc::new(TagPatterns {
        plain: compile(&format!(r"(?s)<{tag}>(.*?)</{tag}>")),
        attributed: compile(&format!(
            r"(?s)<{tag}\s+([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*([^>]+)>(.*?)</{tag}>"
        )),
    });
    cache.insert(tag_name.to_string(), Arc::clone(&patterns));
    patterns
}

fn compile(pattern: &str) -> Regex {
    // Tag names are escaped, so the pattern is always well-formed.
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(error) => unreachable!("invalid tag pattern {pattern}: {error}"),
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
