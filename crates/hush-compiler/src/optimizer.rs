//! List optimization passes

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DedupeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
}

/// Drop repeated lines, keeping the first occurrence of each.
///
/// Lines are expected to be normalized already, so equal text means an equal
/// filter.
pub fn dedupe(lines: &mut Vec<String>) -> DedupeStats {
    let before = lines.len();

    let mut seen: HashSet<String> = HashSet::with_capacity(before);
    let mut deduped = 0usize;
    lines.retain(|line| {
        if seen.contains(line) {
            deduped += 1;
            false
        } else {
            seen.insert(line.clone());
            true
        }
    });

    let after = lines.len();
    if deduped > 0 {
        log::debug!("Removed {} duplicate lines ({} -> {})", deduped, before, after);
    }

    DedupeStats {
        before,
        after,
        deduped,
    }
}
