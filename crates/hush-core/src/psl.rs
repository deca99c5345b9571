//! Public Suffix List (PSL) utilities for eTLD+1 extraction
//!
//! Registrable domains decide whether a request is third-party. Rules can be
//! loaded from a `public_suffix_list.dat` file; until then a small table of
//! common two-part suffixes is used.
//!
//! # Examples
//!
//! ```
//! use hush_core::psl::get_etld1;
//!
//! assert_eq!(get_etld1("sub.example.com"), "example.com");
//! assert_eq!(get_etld1("sub.example.co.uk"), "example.co.uk");
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::IpAddr;

use parking_lot::{Mutex, RwLock};

use crate::hash::hash_domain;

// =============================================================================
// LRU Cache
// =============================================================================

/// Simple fixed-size cache for eTLD+1 lookups.
pub struct LruCache {
    capacity: usize,
    entries: HashMap<String, String>,
    order: VecDeque<String>,
}

impl LruCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<&str> {
        if self.entries.contains_key(key) {
            // Move to back (most recently used)
            self.order.retain(|k| k != key);
            self.order.push_back(key.to_string());
            self.entries.get(key).map(|s| s.as_str())
        } else {
            None
        }
    }

    pub fn insert(&mut self, key: String, value: String) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.retain(|k| *k != key);
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// PSL Hash Sets
// =============================================================================

/// PSL rule sets for suffix lookup, keyed by domain hash.
#[derive(Debug, Default)]
pub struct PslSets {
    /// Exact rules (e.g., "com", "co.uk")
    pub exact: HashSet<u64>,
    /// Wildcard rules (e.g., "*.ck" stored as "ck")
    pub wildcard: HashSet<u64>,
    /// Exception rules (e.g., "!www.ck" stored as "www.ck")
    pub exception: HashSet<u64>,
}

impl PslSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the text format of `public_suffix_list.dat`.
    pub fn parse(text: &str) -> Self {
        let mut sets = Self::new();
        for line in text.lines() {
            let rule = match line.split_whitespace().next() {
                Some(rule) if !rule.starts_with("//") => rule,
                _ => continue,
            };
            if let Some(rest) = rule.strip_prefix('!') {
                sets.exception.insert(hash_domain(rest).to_u64());
            } else if let Some(rest) = rule.strip_prefix("*.") {
                sets.wildcard.insert(hash_domain(rest).to_u64());
            } else {
                sets.exact.insert(hash_domain(rule).to_u64());
            }
        }
        sets
    }

    pub fn rule_count(&self) -> usize {
        self.exact.len() + self.wildcard.len() + self.exception.len()
    }

    #[inline]
    pub fn is_exact(&self, suffix: &str) -> bool {
        self.exact.contains(&hash_domain(suffix).to_u64())
    }

    #[inline]
    pub fn is_wildcard(&self, suffix: &str) -> bool {
        self.wildcard.contains(&hash_domain(suffix).to_u64())
    }

    #[inline]
    pub fn is_exception(&self, suffix: &str) -> bool {
        self.exception.contains(&hash_domain(suffix).to_u64())
    }
}

// =============================================================================
// Global PSL State
// =============================================================================

static PSL_SETS: RwLock<Option<PslSets>> = parking_lot::const_rwlock(None);

static ETLD1_CACHE: Mutex<Option<LruCache>> = parking_lot::const_mutex(None);

const ETLD1_CACHE_CAPACITY: usize = 4096;

/// Install PSL rules. Clears the eTLD+1 cache.
pub fn init_psl(sets: PslSets) {
    log::info!("Loaded {} public suffix rules", sets.rule_count());
    *PSL_SETS.write() = Some(sets);
    if let Some(cache) = ETLD1_CACHE.lock().as_mut() {
        cache.clear();
    }
}

pub fn is_psl_initialized() -> bool {
    PSL_SETS.read().is_some()
}

// =============================================================================
// eTLD+1 Extraction
// =============================================================================

/// Common two-part TLDs for fallback.
const COMMON_TWO_PART_TLDS: &[&str] = &[
    "co.uk", "co.jp", "co.nz", "co.za", "co.in", "co.kr",
    "com.au", "com.br", "com.cn", "com.mx", "com.tw", "com.hk",
    "net.au", "net.nz",
    "org.uk", "org.au",
    "gov.uk", "gov.au",
    "ac.uk", "ac.jp",
    "ne.jp", "or.jp",
];

/// Get the eTLD+1 (registrable domain) for a hostname.
///
/// IP addresses and single-label hosts are returned unchanged.
pub fn get_etld1(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    let host = host.trim_end_matches('.');

    if is_ip_host(host) || !host.contains('.') {
        return host.to_string();
    }

    if let Some(cached) = ETLD1_CACHE.lock().as_mut().and_then(|c| c.get(host).map(str::to_string)) {
        return cached;
    }

    let result = compute_etld1(host);

    ETLD1_CACHE
        .lock()
        .get_or_insert_with(|| LruCache::new(ETLD1_CACHE_CAPACITY))
        .insert(host.to_string(), result.clone());

    result
}

fn is_ip_host(host: &str) -> bool {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    bare.parse::<IpAddr>().is_ok()
}

/// Compute eTLD+1 without caching.
fn compute_etld1(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    let n = labels.len();

    if n <= 1 {
        return host.to_string();
    }

    if let Some(psl) = PSL_SETS.read().as_ref() {
        for i in 0..n {
            let suffix = labels[i..].join(".");

            // Exception rules override wildcards
            if psl.is_exception(&suffix) {
                return suffix;
            }

            if psl.is_exact(&suffix) {
                return if i > 0 { labels[i - 1..].join(".") } else { host.to_string() };
            }

            if i + 1 < n && psl.is_wildcard(&labels[i + 1..].join(".")) {
                return if i > 0 { labels[i - 1..].join(".") } else { host.to_string() };
            }
        }
    }

    fallback_etld1(&labels)
}

/// Fallback eTLD+1 heuristic.
fn fallback_etld1(labels: &[&str]) -> String {
    let n = labels.len();
    if n <= 2 {
        return labels.join(".");
    }

    let last_two = format!("{}.{}", labels[n - 2], labels[n - 1]);
    if COMMON_TWO_PART_TLDS.contains(&last_two.as_str()) {
        return labels[n - 3..].join(".");
    }

    labels[n - 2..].join(".")
}

/// Decide whether a request to `request_host` made by a document on
/// `document_host` is third-party.
///
/// Identical hosts are first-party, an unknown document is third-party,
/// everything else compares registrable domains.
pub fn is_third_party(request_host: &str, document_host: &str) -> bool {
    let request_host = request_host.trim_end_matches('.');
    let document_host = document_host.trim_end_matches('.');

    if request_host.eq_ignore_ascii_case(document_host) {
        return false;
    }
    if document_host.is_empty() || request_host.is_empty() {
        return true;
    }

    get_etld1(request_host) != get_etld1(document_host)
}

/// Get the parent domain (strip leftmost label).
pub fn get_parent_domain(host: &str) -> Option<&str> {
    match host.find('.') {
        Some(idx) if idx < host.len() - 1 => Some(&host[idx + 1..]),
        _ => None,
    }
}

/// Iterator over a domain and all of its parent domains, most specific first.
pub struct DomainSuffixes<'a> {
    current: Option<&'a str>,
}

impl<'a> Iterator for DomainSuffixes<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.current?;
        self.current = get_parent_domain(result);
        Some(result)
    }
}

/// Walk `foo.example.org`, `example.org`, `org`.
/// An empty domain yields nothing.
pub fn walk_domain_suffixes(domain: &str) -> DomainSuffixes<'_> {
    let domain = domain.trim_end_matches('.');
    DomainSuffixes {
        current: if domain.is_empty() { None } else { Some(domain) },
    }
}
