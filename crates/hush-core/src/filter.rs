//! Compiled filter model
//!
//! A [`Filter`] is immutable once built and identified by its normalized text.
//! `Arc<Filter>` is the value handle passed around by the store and engine.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::pattern::Pattern;
use crate::psl::walk_domain_suffixes;
use crate::types::{ContentType, FilterType, PartyMask, RequestContext};

// =============================================================================
// Invalid Filter Reasons
// =============================================================================

/// Why a filter compiled to [`FilterType::Invalid`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("Unknown filter option: {0}")]
    UnknownOption(String),
    #[error("Option requires a value: {0}")]
    MissingOptionValue(String),
    #[error("Filter matches no content type")]
    EmptyContentTypes,
    #[error("Invalid regular expression: {0}")]
    InvalidRegex(String),
    #[error("Element hiding filter has an empty selector")]
    EmptySelector,
    #[error("Invalid domain list in element hiding filter")]
    InvalidDomain,
    #[error("Element hiding emulation filter needs a specific domain")]
    EmulationWithoutDomain,
    #[error("Snippet filters are not supported")]
    SnippetUnsupported,
}

// =============================================================================
// Domain Restrictions
// =============================================================================

/// `domain=` / element hiding domain list: domain → included.
///
/// Later entries for the same domain override earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainMap {
    entries: BTreeMap<String, bool>,
    has_includes: bool,
}

impl DomainMap {
    /// Build from `(domain, included)` pairs; empty domains are skipped.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let mut map = Self::default();
        for (domain, included) in entries {
            let domain = domain.into();
            if domain.is_empty() {
                continue;
            }
            map.entries.insert(domain, included);
        }
        map.has_includes = map.entries.values().any(|&included| included);
        map
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_includes(&self) -> bool {
        self.has_includes
    }

    pub fn has_excludes(&self) -> bool {
        self.entries.values().any(|&included| !included)
    }

    /// Iterate `(domain, included)` in domain order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries.iter().map(|(d, &i)| (d.as_str(), i))
    }

    /// Look up an explicit entry.
    pub fn get(&self, domain: &str) -> Option<bool> {
        self.entries.get(domain).copied()
    }

    /// Is a filter with this domain list active on `doc_domain`?
    ///
    /// The most specific listed suffix decides; unlisted domains are covered
    /// only when the list has no included domain.
    pub fn is_active_on(&self, doc_domain: &str) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        for suffix in walk_domain_suffixes(doc_domain) {
            if let Some(included) = self.entries.get(suffix) {
                return *included;
            }
        }
        !self.has_includes
    }
}

// =============================================================================
// Filter
// =============================================================================

/// A compiled filter.
#[derive(Debug, Clone)]
pub struct Filter {
    /// Normalized text, the filter's identity
    pub text: String,
    pub filter_type: FilterType,
    /// URL pattern (blocking/exception family only)
    pub pattern: Option<Pattern>,
    pub domains: DomainMap,
    pub content_types: ContentType,
    pub party: PartyMask,
    /// Uppercased site keys; empty means no requirement
    pub site_keys: Vec<String>,
    pub match_case: bool,
    /// CSS selector (element hiding family only)
    pub selector: Option<String>,
    /// Set when `filter_type` is `Invalid`
    pub reason: Option<FilterError>,
}

impl Filter {
    /// A filter with no behavior (comments, blank lines).
    pub fn comment(text: impl Into<String>) -> Self {
        Self::inert(text.into(), FilterType::Comment, None)
    }

    /// An inert filter carrying the reason it was rejected.
    pub fn invalid(text: impl Into<String>, reason: FilterError) -> Self {
        Self::inert(text.into(), FilterType::Invalid, Some(reason))
    }

    fn inert(text: String, filter_type: FilterType, reason: Option<FilterError>) -> Self {
        Self {
            text,
            filter_type,
            pattern: None,
            domains: DomainMap::default(),
            content_types: ContentType::empty(),
            party: PartyMask::ALL,
            site_keys: Vec::new(),
            match_case: false,
            selector: None,
            reason,
        }
    }

    #[inline]
    pub fn is_exception(&self) -> bool {
        self.filter_type.is_exception()
    }

    /// Generic = applies on every domain not explicitly excluded.
    #[inline]
    pub fn is_generic(&self) -> bool {
        self.site_keys.is_empty() && !self.domains.has_includes()
    }

    /// Domain and site-key activation check.
    pub fn is_active_on_domain(&self, doc_domain: &str, site_key: Option<&str>) -> bool {
        if !self.site_keys.is_empty() {
            let Some(key) = site_key.filter(|k| !k.is_empty()) else {
                return false;
            };
            if !self.site_keys.iter().any(|k| k.eq_ignore_ascii_case(key)) {
                return false;
            }
        }
        self.domains.is_active_on(doc_domain)
    }

    /// Full network match test for a request.
    pub fn matches_request(&self, ctx: &RequestContext<'_>) -> bool {
        let Some(pattern) = &self.pattern else {
            return false;
        };
        self.content_types.intersects(ctx.content_type)
            && self.party.allows(ctx.is_third_party)
            && self.is_active_on_domain(ctx.doc_domain, ctx.site_key)
            && pattern.matches(ctx.url)
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for Filter {}

impl Hash for Filter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
