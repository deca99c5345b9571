//! Fast URL helpers for the hot path
//!
//! These functions avoid full URL parsing and work directly on string slices.

use std::collections::HashSet;

use crate::hash::hash_token;

// =============================================================================
// Scheme / Host
// =============================================================================

/// Get the position after "://".
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();
    let colon_pos = bytes.iter().position(|&b| b == b':')?;

    if bytes.len() > colon_pos + 2 && bytes[colon_pos + 1] == b'/' && bytes[colon_pos + 2] == b'/' {
        return Some(colon_pos + 3);
    }

    None
}

/// Get the start and end positions of the hostname in a URL.
/// Userinfo and port are excluded; IPv6 literals keep their brackets.
#[inline]
pub fn get_host_position(url: &str) -> Option<(usize, usize)> {
    let scheme_end = get_scheme_end(url)?;
    let bytes = url.as_bytes();

    // Authority ends at the first path, query or fragment delimiter
    let authority_end = bytes[scheme_end..]
        .iter()
        .position(|&b| b == b'/' || b == b'?' || b == b'#')
        .map_or(bytes.len(), |i| scheme_end + i);

    let host_start = bytes[scheme_end..authority_end]
        .iter()
        .rposition(|&b| b == b'@')
        .map_or(scheme_end, |i| scheme_end + i + 1);

    if bytes.get(host_start) == Some(&b'[') {
        let close = bytes[host_start..authority_end].iter().position(|&b| b == b']')?;
        return Some((host_start, host_start + close + 1));
    }

    let host_end = bytes[host_start..authority_end]
        .iter()
        .position(|&b| b == b':')
        .map_or(authority_end, |i| host_start + i);

    Some((host_start, host_end))
}

/// Fast host extraction without allocations.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (host_start, host_end) = get_host_position(url)?;
    Some(&url[host_start..host_end])
}

/// Normalized host of a URL: lowercase, no trailing dot.
/// Returns an empty string when the URL has no host (e.g. `about:blank`).
pub fn host_from_url(url: &str) -> String {
    extract_host(url)
        .map(|host| host.trim_end_matches('.').to_ascii_lowercase())
        .unwrap_or_default()
}

/// Positions in `url` where a `||` anchored pattern may start: right after
/// `scheme:/+` and after every `.` of the host part.
pub fn host_anchor_positions(url: &str) -> Vec<usize> {
    let bytes = url.as_bytes();
    let colon = match bytes.iter().position(|&b| b == b':') {
        Some(pos) if pos > 0 => pos,
        _ => return Vec::new(),
    };
    if !bytes[..colon]
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Vec::new();
    }

    let mut start = colon + 1;
    while start < bytes.len() && bytes[start] == b'/' {
        start += 1;
    }
    if start == colon + 1 {
        return Vec::new();
    }

    let mut positions = vec![start];
    for i in start..bytes.len() {
        match bytes[i] {
            b'/' => break,
            b'.' if i > start => positions.push(i + 1),
            _ => {}
        }
    }
    positions
}

// =============================================================================
// URL Tokenization
// =============================================================================

/// Minimum keyword length used for indexing.
pub const MIN_TOKEN_LEN: usize = 3;

/// Characters that make up keyword tokens.
#[inline]
pub fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'%'
}

/// Tokenize a URL into hashed, lowercased keyword tokens.
/// Every distinct token of at least [`MIN_TOKEN_LEN`] chars is returned once.
pub fn tokenize_url(url: &str) -> Vec<u32> {
    let bytes = url.as_bytes();
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    let mut token_start = None;
    let mut buf = String::new();

    for i in 0..=bytes.len() {
        let in_token = i < bytes.len() && is_token_char(bytes[i]);

        if in_token {
            if token_start.is_none() {
                token_start = Some(i);
            }
        } else if let Some(ts) = token_start.take() {
            if i - ts >= MIN_TOKEN_LEN {
                buf.clear();
                buf.extend(bytes[ts..i].iter().map(|b| b.to_ascii_lowercase() as char));
                let hash = hash_token(&buf);
                if seen.insert(hash) {
                    tokens.push(hash);
                }
            }
        }
    }

    tokens
}

// =============================================================================
// ABP Separator Check
// =============================================================================

/// Check if a byte is an ABP separator (what `^` matches).
///
/// Everything except letters, digits, `_`, `-`, `.`, `%` and non-ASCII bytes.
#[inline]
pub fn is_separator(c: u8) -> bool {
    !(c.is_ascii_alphanumeric() || c == b'_' || c == b'-' || c == b'.' || c == b'%' || c >= 0x80)
}

/// Check if position in string is at a separator or at the end.
#[inline]
pub fn is_at_separator(s: &str, pos: usize) -> bool {
    match s.as_bytes().get(pos) {
        None => true,
        Some(&b) => is_separator(b),
    }
}
