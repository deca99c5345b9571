//! Core Matching Engine
//!
//! This is the hot path - every request goes through here.
//! Filters are bucketed by their rarest keyword; a request only visits the
//! buckets of its own URL tokens plus the keyword-less bucket.

use std::collections::HashMap;
use std::sync::Arc;

use crate::filter::Filter;
use crate::hash::{hash_token, NO_KEYWORD};
use crate::types::RequestContext;
use crate::url::tokenize_url;

// =============================================================================
// Keyword Index
// =============================================================================

#[derive(Debug)]
struct IndexedFilter {
    seq: u64,
    filter: Arc<Filter>,
}

#[derive(Debug, Default)]
struct KeywordIndex {
    buckets: HashMap<u32, Vec<IndexedFilter>>,
    keyword_by_text: HashMap<String, u32>,
}

impl KeywordIndex {
    fn bucket_len(&self, keyword: u32) -> usize {
        self.buckets.get(&keyword).map_or(0, Vec::len)
    }

    /// Pick the least crowded keyword; ties go to the longer one.
    fn choose_keyword(&self, filter: &Filter) -> u32 {
        let Some(pattern) = &filter.pattern else {
            return NO_KEYWORD;
        };

        let mut best: Option<(usize, usize, u32)> = None;
        for keyword in pattern.keywords() {
            let hash = hash_token(&keyword);
            let count = self.bucket_len(hash);
            let better = match best {
                None => true,
                Some((best_count, best_len, _)) => {
                    count < best_count || (count == best_count && keyword.len() > best_len)
                }
            };
            if better {
                best = Some((count, keyword.len(), hash));
            }
        }
        best.map_or(NO_KEYWORD, |(_, _, hash)| hash)
    }

    fn add(&mut self, filter: Arc<Filter>, seq: u64) -> bool {
        if self.keyword_by_text.contains_key(&filter.text) {
            return false;
        }
        let keyword = self.choose_keyword(&filter);
        self.keyword_by_text.insert(filter.text.clone(), keyword);
        self.buckets
            .entry(keyword)
            .or_default()
            .push(IndexedFilter { seq, filter });
        true
    }

    fn remove(&mut self, text: &str) -> bool {
        let Some(keyword) = self.keyword_by_text.remove(text) else {
            return false;
        };
        if let Some(bucket) = self.buckets.get_mut(&keyword) {
            bucket.retain(|entry| entry.filter.text != text);
            if bucket.is_empty() {
                self.buckets.remove(&keyword);
            }
        }
        true
    }

    fn len(&self) -> usize {
        self.keyword_by_text.len()
    }

    fn candidates<'a>(&'a self, tokens: &'a [u32]) -> impl Iterator<Item = &'a IndexedFilter> + 'a {
        tokens
            .iter()
            .chain(std::iter::once(&NO_KEYWORD))
            .filter_map(move |token| self.buckets.get(token))
            .flatten()
    }
}

// =============================================================================
// Matcher
// =============================================================================

/// Index statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatcherStats {
    pub blocking: usize,
    pub exceptions: usize,
    pub keywordless: usize,
}

/// URL filter matcher for blocking and exception filters.
#[derive(Debug, Default)]
pub struct Matcher {
    blocking: KeywordIndex,
    exceptions: KeywordIndex,
    next_seq: u64,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a filter. Non-network filters are ignored.
    pub fn add(&mut self, filter: &Arc<Filter>) -> bool {
        if !filter.filter_type.is_network() {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        if filter.is_exception() {
            self.exceptions.add(Arc::clone(filter), seq)
        } else {
            self.blocking.add(Arc::clone(filter), seq)
        }
    }

    pub fn remove(&mut self, filter: &Filter) -> bool {
        if filter.is_exception() {
            self.exceptions.remove(&filter.text)
        } else {
            self.blocking.remove(&filter.text)
        }
    }

    pub fn clear(&mut self) {
        self.blocking = KeywordIndex::default();
        self.exceptions = KeywordIndex::default();
    }

    pub fn stats(&self) -> MatcherStats {
        MatcherStats {
            blocking: self.blocking.len(),
            exceptions: self.exceptions.len(),
            keywordless: self.blocking.bucket_len(NO_KEYWORD) + self.exceptions.bucket_len(NO_KEYWORD),
        }
    }

    /// Find the filter deciding this request.
    ///
    /// Any matching exception wins over any blocking filter. Within a tier a
    /// domain-specific filter beats a generic one, then the earliest added wins.
    pub fn match_request(&self, ctx: &RequestContext<'_>) -> Option<Arc<Filter>> {
        if ctx.content_type.is_empty() {
            return None;
        }

        let tokens = tokenize_url(ctx.url);

        let mut best_allow: Option<MatchCandidate<'_>> = None;
        for entry in self.exceptions.candidates(&tokens) {
            if entry.filter.matches_request(ctx) {
                MatchCandidate::keep_best(&mut best_allow, entry);
            }
        }
        if let Some(c) = best_allow {
            return Some(Arc::clone(&c.entry.filter));
        }

        let mut best_block: Option<MatchCandidate<'_>> = None;
        for entry in self.blocking.candidates(&tokens) {
            if ctx.specific_only && entry.filter.is_generic() {
                continue;
            }
            if entry.filter.matches_request(ctx) {
                MatchCandidate::keep_best(&mut best_block, entry);
            }
        }
        best_block.map(|c| Arc::clone(&c.entry.filter))
    }
}

// =============================================================================
// Match Candidate
// =============================================================================

struct MatchCandidate<'a> {
    entry: &'a IndexedFilter,
    priority: (bool, u64),
}

impl<'a> MatchCandidate<'a> {
    fn keep_best(best: &mut Option<MatchCandidate<'a>>, entry: &'a IndexedFilter) {
        // Lower is better: specific before generic, then insertion order
        let priority = (entry.filter.is_generic(), entry.seq);
        if best.as_ref().map_or(true, |b| priority < b.priority) {
            *best = Some(MatchCandidate { entry, priority });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::DomainMap;
    use crate::pattern::Pattern;
    use crate::types::{ContentType, FilterType, PartyMask};

    fn filter(text: &str, pattern: &str, filter_type: FilterType) -> Arc<Filter> {
        Arc::new(Filter {
            text: text.to_string(),
            filter_type,
            pattern: Some(Pattern::glob(pattern, false)),
            domains: DomainMap::default(),
            content_types: ContentType::RESOURCE_TYPES,
            party: PartyMask::ALL,
            site_keys: Vec::new(),
            match_case: false,
            selector: None,
            reason: None,
        })
    }

    fn request(url: &str) -> RequestContext<'_> {
        RequestContext {
            url,
            content_type: ContentType::IMAGE,
            doc_domain: "",
            is_third_party: false,
            site_key: None,
            specific_only: false,
        }
    }

    #[test]
    fn test_exception_beats_block() {
        let mut matcher = Matcher::new();
        matcher.add(&filter("/banner", "/banner", FilterType::Blocking));
        matcher.add(&filter("@@/banner/", "/banner/", FilterType::Exception));

        let hit = matcher.match_request(&request("http://x.com/banner/a.gif"));
        assert_eq!(hit.map(|f| f.text.clone()), Some("@@/banner/".to_string()));

        let hit = matcher.match_request(&request("http://x.com/banner.gif"));
        assert_eq!(hit.map(|f| f.text.clone()), Some("/banner".to_string()));
    }

    #[test]
    fn test_first_inserted_wins_within_tier() {
        let mut matcher = Matcher::new();
        matcher.add(&filter("banner", "banner", FilterType::Blocking));
        matcher.add(&filter("/banner.", "/banner.", FilterType::Blocking));

        let hit = matcher.match_request(&request("http://x.com/banner.gif"));
        assert_eq!(hit.map(|f| f.text.clone()), Some("banner".to_string()));
    }

    #[test]
    fn test_remove_and_stats() {
        let mut matcher = Matcher::new();
        let f = filter("||ads.com^", "||ads.com^", FilterType::Blocking);
        assert!(matcher.add(&f));
        assert!(!matcher.add(&f));
        assert_eq!(matcher.stats().blocking, 1);
        assert!(matcher.match_request(&request("http://ads.com/x")).is_some());

        assert!(matcher.remove(&f));
        assert!(!matcher.remove(&f));
        assert!(matcher.match_request(&request("http://ads.com/x")).is_none());
        assert_eq!(matcher.stats(), MatcherStats::default());
    }

    #[test]
    fn test_keywordless_bucket() {
        let mut matcher = Matcher::new();
        matcher.add(&filter("ad", "ad", FilterType::Blocking));
        assert_eq!(matcher.stats().keywordless, 1);
        assert!(matcher.match_request(&request("http://x.com/load.js")).is_some());
    }

    #[test]
    fn test_empty_mask_never_matches() {
        let mut matcher = Matcher::new();
        matcher.add(&filter("banner", "banner", FilterType::Blocking));
        let mut ctx = request("http://x.com/banner");
        ctx.content_type = ContentType::empty();
        assert!(matcher.match_request(&ctx).is_none());
    }
}
