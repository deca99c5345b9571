//! URL pattern matching
//!
//! Patterns use Adblock Plus syntax: `*` wildcard, `^` separator, `|` start or
//! end anchor and `||` host anchor. A pattern is split on `*` into segments;
//! segments are matched left to right, each at its leftmost position, which is
//! exact for `*`-separated globs.

use crate::url::{host_anchor_positions, is_separator, is_token_char, MIN_TOKEN_LEN};

// =============================================================================
// Pattern
// =============================================================================

/// Compiled URL pattern of a blocking or exception filter.
#[derive(Debug, Clone)]
pub enum Pattern {
    Glob(GlobPattern),
    Regex(regex::Regex),
}

impl Pattern {
    /// Compile a glob pattern (anything that is not `/regex/`).
    pub fn glob(text: &str, match_case: bool) -> Self {
        Self::Glob(GlobPattern::parse(text, match_case))
    }

    /// Compile a `/regex/` body.
    pub fn regex(source: &str, match_case: bool) -> Result<Self, regex::Error> {
        let re = regex::RegexBuilder::new(source)
            .case_insensitive(!match_case)
            .build()?;
        Ok(Self::Regex(re))
    }

    /// Test a URL against the pattern.
    #[inline]
    pub fn matches(&self, url: &str) -> bool {
        match self {
            Self::Glob(glob) => glob.matches(url),
            Self::Regex(re) => re.is_match(url),
        }
    }

    /// Lowercase keywords that any matching URL is guaranteed to contain as a
    /// whole token. Regex patterns have none.
    pub fn keywords(&self) -> Vec<String> {
        match self {
            Self::Glob(glob) => glob.keywords(),
            Self::Regex(_) => Vec::new(),
        }
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, Self::Regex(_))
    }
}

// =============================================================================
// Glob Pattern
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece {
    Literal(u8),
    Separator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorType {
    #[default]
    None,
    Left,
    Hostname,
}

/// Wildcard pattern split into `*`-separated segments.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    segments: Vec<Vec<Piece>>,
    anchor_type: AnchorType,
    right_anchor: bool,
    match_case: bool,
}

impl GlobPattern {
    pub fn parse(text: &str, match_case: bool) -> Self {
        let (mut anchor_type, rest) = if let Some(rest) = text.strip_prefix("||") {
            (AnchorType::Hostname, rest)
        } else if let Some(rest) = text.strip_prefix('|') {
            (AnchorType::Left, rest)
        } else {
            (AnchorType::None, text)
        };

        let (mut right_anchor, rest) = match rest.strip_suffix('|') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };

        let mut segments: Vec<Vec<Piece>> = rest
            .split('*')
            .map(|segment| {
                segment
                    .bytes()
                    .map(|b| if b == b'^' { Piece::Separator } else { Piece::Literal(b) })
                    .collect()
            })
            .collect();

        // A leading or trailing `*` cancels the anchor on that side
        if segments.len() > 1 {
            if segments.first().map_or(false, Vec::is_empty) {
                anchor_type = AnchorType::None;
            }
            if segments.last().map_or(false, Vec::is_empty) {
                right_anchor = false;
            }
        }
        segments.retain(|segment| !segment.is_empty());

        Self {
            segments,
            anchor_type,
            right_anchor,
            match_case,
        }
    }

    pub fn anchor_type(&self) -> AnchorType {
        self.anchor_type
    }

    pub fn matches(&self, url: &str) -> bool {
        let bytes = url.as_bytes();
        match self.anchor_type {
            AnchorType::None => self.match_segments(bytes, 0, false),
            AnchorType::Left => self.match_segments(bytes, 0, true),
            AnchorType::Hostname => host_anchor_positions(url)
                .into_iter()
                .any(|start| self.match_segments(bytes, start, true)),
        }
    }

    fn match_segments(&self, url: &[u8], mut pos: usize, mut fixed: bool) -> bool {
        let last = self.segments.len().saturating_sub(1);

        for (i, segment) in self.segments.iter().enumerate() {
            if i == last && self.right_anchor {
                if fixed {
                    return self.match_at(segment, url, pos) == Some(url.len());
                }
                return (pos..=url.len()).any(|start| self.match_at(segment, url, start) == Some(url.len()));
            }

            let end = if fixed {
                self.match_at(segment, url, pos)
            } else {
                (pos..=url.len()).find_map(|start| self.match_at(segment, url, start))
            };
            match end {
                Some(end) => pos = end,
                None => return false,
            }
            fixed = false;
        }

        true
    }

    /// Match one segment starting exactly at `start`; returns the end position.
    #[inline]
    fn match_at(&self, segment: &[Piece], url: &[u8], start: usize) -> Option<usize> {
        let mut pos = start;
        for piece in segment {
            match *piece {
                Piece::Literal(expected) => {
                    let actual = *url.get(pos)?;
                    let equal = if self.match_case {
                        actual == expected
                    } else {
                        actual.eq_ignore_ascii_case(&expected)
                    };
                    if !equal {
                        return None;
                    }
                    pos += 1;
                }
                Piece::Separator => match url.get(pos) {
                    // `^` also matches the end of the URL
                    None => {}
                    Some(&b) if is_separator(b) => pos += 1,
                    Some(_) => return None,
                },
            }
        }
        Some(pos)
    }

    /// Keyword candidates: token runs bounded on both sides by something that
    /// cannot be a token character in the URL.
    pub fn keywords(&self) -> Vec<String> {
        let mut keywords = Vec::new();
        let last = self.segments.len().saturating_sub(1);

        for (seg_idx, segment) in self.segments.iter().enumerate() {
            let left_fixed = seg_idx == 0 && self.anchor_type != AnchorType::None;
            let right_fixed = seg_idx == last && self.right_anchor;

            let mut run_start: Option<usize> = None;
            for i in 0..=segment.len() {
                let token_byte = match segment.get(i) {
                    Some(Piece::Literal(b)) if is_token_char(*b) => Some(*b),
                    _ => None,
                };
                if token_byte.is_some() {
                    if run_start.is_none() {
                        run_start = Some(i);
                    }
                    continue;
                }

                let Some(start) = run_start.take() else { continue };
                let bounded_left = start > 0 || left_fixed;
                let bounded_right = i < segment.len() || right_fixed;
                if bounded_left && bounded_right && i - start >= MIN_TOKEN_LEN {
                    let keyword: String = segment[start..i]
                        .iter()
                        .filter_map(|piece| match piece {
                            Piece::Literal(b) => Some(b.to_ascii_lowercase() as char),
                            Piece::Separator => None,
                        })
                        .collect();
                    keywords.push(keyword);
                }
            }
        }

        keywords
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob(text: &str) -> Pattern {
        Pattern::glob(text, false)
    }

    #[test]
    fn test_plain_substring() {
        assert!(glob("adbanner.gif").matches("http://example.org/adbanner.gif"));
        assert!(glob("adbanner.gif").matches("http://example.org/ADBANNER.GIF?x"));
        assert!(!glob("adbanner.gif").matches("http://example.org/banner.gif"));
    }

    #[test]
    fn test_empty_pattern_matches_everything() {
        assert!(glob("").matches("http://example.org/"));
        assert!(glob("*").matches("about:blank"));
    }

    #[test]
    fn test_wildcards() {
        let p = glob("/ads/*/banner");
        assert!(p.matches("http://x.com/ads/2024/banner.png"));
        assert!(!p.matches("http://x.com/ads/banner.png"));
        assert!(glob("a*b*c").matches("http://x/aXbYc"));
        assert!(!glob("a*b*c").matches("http://x/cba"));
    }

    #[test]
    fn test_separator() {
        let p = glob("/banner^");
        assert!(p.matches("http://x.com/banner?x=1"));
        assert!(p.matches("http://x.com/banner"));
        assert!(!p.matches("http://x.com/banner.gif"));
        assert!(!p.matches("http://x.com/banners"));
    }

    #[test]
    fn test_left_and_right_anchor() {
        assert!(glob("|http://x.com/").matches("http://x.com/a"));
        assert!(!glob("|x.com").matches("http://x.com/a"));
        assert!(glob(".gif|").matches("http://x.com/a.gif"));
        assert!(!glob(".gif|").matches("http://x.com/a.gif?x"));
        assert!(glob("|http://x.com/|").matches("http://x.com/"));
        assert!(!glob("|http://x.com/|").matches("http://x.com/a"));
    }

    #[test]
    fn test_host_anchor() {
        let p = glob("||example.com^");
        assert!(p.matches("https://example.com/ad.js"));
        assert!(p.matches("https://ads.example.com/ad.js"));
        assert!(p.matches("https://example.com:8080/"));
        assert!(!p.matches("https://badexample.com/"));
        assert!(!p.matches("https://example.com.evil.org/"));
        assert!(!p.matches("https://other.org/example.com/"));
    }

    #[test]
    fn test_match_case() {
        let p = Pattern::glob("Banner", true);
        assert!(p.matches("http://x.com/Banner"));
        assert!(!p.matches("http://x.com/banner"));
    }

    #[test]
    fn test_regex() {
        let p = Pattern::regex(r"banner\d+", false).expect("valid regex");
        assert!(p.matches("http://x.com/BANNER123"));
        assert!(!p.matches("http://x.com/banner"));
        assert!(Pattern::regex("(", false).is_err());
        assert!(p.keywords().is_empty());
    }

    #[test]
    fn test_keywords() {
        assert_eq!(glob("||ads.example.com^").keywords(), vec!["ads", "example", "com"]);
        // Unbounded edges are not keywords
        assert_eq!(glob("adbanner.gif").keywords(), Vec::<String>::new());
        assert_eq!(glob("/adbanner.gif").keywords(), vec!["adbanner"]);
        assert_eq!(glob("/ad*banner/").keywords(), Vec::<String>::new());
        assert_eq!(glob("/Track.gif|").keywords(), vec!["track", "gif"]);
    }
}
