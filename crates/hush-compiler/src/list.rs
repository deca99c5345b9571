//! Filter list bodies
//!
//! A downloaded list starts with an `[Adblock Plus x.y]` header, followed by
//! `! Key: value` metadata comments and the filter lines.

use hush_core::filter::Filter;
use hush_core::subscription::ListMetadata;

use crate::parser::{compile, normalize};

const HOUR_SECS: u64 = 60 * 60;
const DAY_SECS: u64 = 24 * HOUR_SECS;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedList {
    /// First line, when it is an `[Adblock ...]` header
    pub header: Option<String>,
    pub metadata: ListMetadata,
    /// Normalized lines, metadata and blank lines removed
    pub lines: Vec<String>,
}

impl ParsedList {
    pub fn has_valid_header(&self) -> bool {
        self.header.is_some()
    }

    /// Compile every line, in list order.
    pub fn compile(&self) -> Vec<Filter> {
        self.lines.iter().map(|line| compile(line)).collect()
    }
}

/// Split a list body into header, metadata and filter lines.
pub fn parse_list(body: &str) -> ParsedList {
    let mut lines = body.lines();
    let mut parsed = ParsedList::default();

    let mut pending = None;
    if let Some(first) = lines.next() {
        let first = first.trim();
        if is_header(first) {
            parsed.header = Some(first.to_string());
        } else {
            pending = Some(first);
        }
    }

    let mut in_preamble = true;
    for line in pending.into_iter().chain(lines) {
        let normalized = normalize(line);
        if normalized.is_empty() {
            continue;
        }

        if in_preamble {
            if let Some((key, value)) = metadata_entry(&normalized) {
                if apply_metadata(&mut parsed.metadata, &key, value) {
                    continue;
                }
            } else if !normalized.starts_with('!') {
                in_preamble = false;
            }
        }

        parsed.lines.push(normalized);
    }

    parsed
}

fn is_header(line: &str) -> bool {
    line.get(..8).map_or(false, |prefix| prefix.eq_ignore_ascii_case("[adblock"))
}

/// `! Key: value` → (lowercase key, trimmed value).
fn metadata_entry(line: &str) -> Option<(String, &str)> {
    let rest = line.strip_prefix('!')?.trim_start();
    let (key, value) = rest.split_once(':')?;
    let key = key.trim_end();
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return None;
    }
    Some((key.to_ascii_lowercase(), value.trim()))
}

fn apply_metadata(metadata: &mut ListMetadata, key: &str, value: &str) -> bool {
    let value_owned = Some(value.to_string());
    match key {
        "title" => metadata.title = value_owned,
        "homepage" => metadata.homepage = value_owned,
        "author" => metadata.author = value_owned,
        "version" => metadata.version = value_owned,
        "expires" => metadata.expires = parse_expires(value),
        "languages" => {
            metadata.languages = value
                .split(',')
                .map(str::trim)
                .filter(|lang| !lang.is_empty())
                .map(str::to_string)
                .collect();
        }
        _ => return false,
    }
    true
}

/// `4 days`, `12 hours`, `12h` → seconds. A bare number counts days.
pub fn parse_expires(value: &str) -> Option<u64> {
    let value = value.trim_start();
    let digits = value.bytes().take_while(u8::is_ascii_digit).count();
    let amount: u64 = value[..digits].parse().ok()?;
    let unit = value[digits..].trim_start();
    let secs = if unit.starts_with('h') || unit.starts_with('H') {
        HOUR_SECS
    } else {
        DAY_SECS
    };
    Some(amount.saturating_mul(secs))
}
