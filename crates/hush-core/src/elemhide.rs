//! Element hiding selector resolver
//!
//! Keeps element hiding filters bucketed by domain and resolves the selectors
//! that apply to a document domain:
//!
//! 1. unconditional selectors (generic filters nobody excepts), then
//! 2. conditional selectors found by walking the domain's suffixes from most
//!    specific to the generic `""` level.
//!
//! A filter excluded at a more specific level is skipped at every less
//! specific level. Distinct filters with the same selector are all kept.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::filter::Filter;
use crate::psl::walk_domain_suffixes;
use crate::types::{EmulationSelector, FilterType};

/// Maximum selectors per CSS rule in generated stylesheets.
pub const SELECTOR_GROUP_SIZE: usize = 1024;

const HIDE_DECLARATION: &str = "{display: none !important;}";

// =============================================================================
// Cancellation
// =============================================================================

/// Shared flag used to abort a long selector computation.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// =============================================================================
// Resolved Selectors
// =============================================================================

/// Selectors for one domain, split the way stylesheets are emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElemHideSelectors {
    pub unconditional: Vec<String>,
    pub conditional: Vec<String>,
}

impl ElemHideSelectors {
    pub fn is_empty(&self) -> bool {
        self.unconditional.is_empty() && self.conditional.is_empty()
    }

    /// Unconditional selectors followed by conditional ones.
    pub fn into_vec(self) -> Vec<String> {
        let mut all = self.unconditional;
        all.extend(self.conditional);
        all
    }

    /// Render as CSS, one rule per group of [`SELECTOR_GROUP_SIZE`] selectors.
    pub fn to_stylesheet(&self) -> String {
        let mut css = create_stylesheet(&self.unconditional);
        css.push_str(&create_stylesheet(&self.conditional));
        css
    }
}

/// `"a, b {display: none !important;}\n"` per selector group.
pub fn create_stylesheet(selectors: &[String]) -> String {
    selectors
        .chunks(SELECTOR_GROUP_SIZE)
        .map(|group| format!("{} {}\n", group.join(", "), HIDE_DECLARATION))
        .collect()
}

// =============================================================================
// Index
// =============================================================================

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    filter: Arc<Filter>,
    included: bool,
}

/// Element hiding filters indexed for selector lookup.
#[derive(Debug, Default)]
pub struct ElemHideIndex {
    next_seq: u64,
    known: HashSet<String>,
    /// Filters without any domain list, in insertion order
    generic: Vec<Entry>,
    /// Domain → (filter, included); `""` holds filters with a domain list
    by_domain: HashMap<String, Vec<Entry>>,
    /// Selector → exception filters
    exceptions: HashMap<String, Vec<Arc<Filter>>>,
    emulation: Vec<Entry>,
}

impl ElemHideIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Index an element hiding filter. Other filter types are ignored.
    pub fn add(&mut self, filter: &Arc<Filter>) -> bool {
        if !filter.filter_type.is_element_hiding() || self.known.contains(&filter.text) {
            return false;
        }
        let Some(selector) = filter.selector.clone() else {
            return false;
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        let entry = |included| Entry {
            seq,
            filter: Arc::clone(filter),
            included,
        };

        match filter.filter_type {
            FilterType::ElemHideException => {
                self.exceptions.entry(selector).or_default().push(Arc::clone(filter));
            }
            FilterType::ElemHideEmulation => self.emulation.push(entry(true)),
            _ if filter.domains.is_empty() => self.generic.push(entry(true)),
            _ => {
                for (domain, included) in filter.domains.iter() {
                    self.by_domain.entry(domain.to_string()).or_default().push(entry(included));
                }
                let generic_included = !filter.domains.has_includes();
                self.by_domain.entry(String::new()).or_default().push(entry(generic_included));
            }
        }

        self.known.insert(filter.text.clone());
        true
    }

    pub fn remove(&mut self, filter: &Filter) -> bool {
        if !self.known.remove(&filter.text) {
            return false;
        }
        let text = filter.text.as_str();

        match filter.filter_type {
            FilterType::ElemHideException => {
                if let Some(selector) = &filter.selector {
                    if let Some(list) = self.exceptions.get_mut(selector) {
                        list.retain(|f| f.text != text);
                        if list.is_empty() {
                            self.exceptions.remove(selector);
                        }
                    }
                }
            }
            FilterType::ElemHideEmulation => self.emulation.retain(|e| e.filter.text != text),
            _ if filter.domains.is_empty() => self.generic.retain(|e| e.filter.text != text),
            _ => {
                let mut keys: Vec<String> = filter.domains.iter().map(|(d, _)| d.to_string()).collect();
                keys.push(String::new());
                for key in keys {
                    if let Some(bucket) = self.by_domain.get_mut(&key) {
                        bucket.retain(|e| e.filter.text != text);
                        if bucket.is_empty() {
                            self.by_domain.remove(&key);
                        }
                    }
                }
            }
        }
        true
    }

    pub fn clear(&mut self) {
        *self = Self {
            next_seq: self.next_seq,
            ..Self::default()
        };
    }

    /// Is there an element hiding exception for `selector` active on `domain`?
    pub fn exception_for(&self, selector: &str, domain: &str) -> Option<&Arc<Filter>> {
        self.exceptions
            .get(selector)?
            .iter()
            .find(|exception| exception.is_active_on_domain(domain, None))
    }

    /// Resolve the selectors for `domain`.
    ///
    /// Returns `None` when `cancel` fires before the walk completes.
    pub fn selectors(
        &self,
        domain: &str,
        specific_only: bool,
        cancel: Option<&CancelFlag>,
    ) -> Option<ElemHideSelectors> {
        let domain = normalize_domain(domain);
        let cancelled = || cancel.map_or(false, CancelFlag::is_cancelled);

        let mut result = ElemHideSelectors::default();

        if !specific_only {
            for entry in &self.generic {
                let selector = entry.filter.selector.as_deref().unwrap_or_default();
                if !self.exceptions.contains_key(selector) {
                    result.unconditional.push(selector.to_string());
                }
            }
        }

        let mut levels: Vec<&str> = walk_domain_suffixes(&domain).collect();
        if !specific_only {
            levels.push("");
        }

        let mut excluded: HashSet<&str> = HashSet::new();
        let mut emitted: HashSet<&str> = HashSet::new();

        for level in levels {
            if cancelled() {
                log::debug!("Selector computation for '{}' cancelled", domain);
                return None;
            }

            for entry in self.level_entries(level) {
                let text = entry.filter.text.as_str();
                if !entry.included {
                    excluded.insert(text);
                    continue;
                }
                if excluded.contains(text) || emitted.contains(text) {
                    continue;
                }
                let selector = entry.filter.selector.as_deref().unwrap_or_default();
                if self.exception_for(selector, &domain).is_some() {
                    continue;
                }
                emitted.insert(text);
                result.conditional.push(selector.to_string());
            }
        }

        Some(result)
    }

    /// Entries of one domain level. The generic level also carries generic
    /// filters whose selector has an exception somewhere, in insertion order.
    fn level_entries(&self, level: &str) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self
            .by_domain
            .get(level)
            .map(|bucket| bucket.iter().collect())
            .unwrap_or_default();

        if level.is_empty() {
            entries.extend(self.generic.iter().filter(|entry| {
                let selector = entry.filter.selector.as_deref().unwrap_or_default();
                self.exceptions.contains_key(selector)
            }));
            entries.sort_by_key(|entry| entry.seq);
        }
        entries
    }

    /// Emulation selectors active on `domain`, in insertion order.
    ///
    /// An element hiding exception with the same selector suppresses them.
    pub fn emulation_selectors(&self, domain: &str) -> Vec<EmulationSelector> {
        let domain = normalize_domain(domain);
        if domain.is_empty() {
            return Vec::new();
        }

        self.emulation
            .iter()
            .filter(|entry| entry.filter.is_active_on_domain(&domain, None))
            .filter_map(|entry| {
                let selector = entry.filter.selector.as_deref()?;
                if self.exception_for(selector, &domain).is_some() {
                    return None;
                }
                Some(EmulationSelector {
                    selector: selector.to_string(),
                    text: entry.filter.text.clone(),
                })
            })
            .collect()
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::DomainMap;
    use crate::types::{ContentType, PartyMask};

    fn elemhide(filter_type: FilterType, domains: &[(&str, bool)], selector: &str) -> Arc<Filter> {
        let prefix: Vec<String> = domains
            .iter()
            .map(|(d, inc)| if *inc { d.to_string() } else { format!("~{d}") })
            .collect();
        let marker = match filter_type {
            FilterType::ElemHideException => "#@#",
            FilterType::ElemHideEmulation => "#?#",
            _ => "##",
        };
        Arc::new(Filter {
            text: format!("{}{}{}", prefix.join(","), marker, selector),
            filter_type,
            pattern: None,
            domains: DomainMap::from_entries(domains.iter().map(|(d, i)| (d.to_string(), *i))),
            content_types: ContentType::empty(),
            party: PartyMask::ALL,
            site_keys: Vec::new(),
            match_case: false,
            selector: Some(selector.to_string()),
            reason: None,
        })
    }

    fn hide(domains: &[(&str, bool)], selector: &str) -> Arc<Filter> {
        elemhide(FilterType::ElemHide, domains, selector)
    }

    #[test]
    fn test_generic_then_specific() {
        let mut index = ElemHideIndex::new();
        index.add(&hide(&[], "#id"));
        index.add(&hide(&[("example.org", true)], "#id"));
        index.add(&hide(&[("othersite.com", true)], "#id"));

        let selectors = index.selectors("example.org", false, None).unwrap_or_default();
        assert_eq!(selectors.into_vec(), vec!["#id", "#id"]);
    }

    #[test]
    fn test_excluded_subdomain() {
        let mut index = ElemHideIndex::new();
        index.add(&hide(&[("example.org", true)], ".c"));
        index.add(&hide(&[("foo.example.org", false), ("example.org", true)], ".c"));

        let selectors = index.selectors("foo.example.org", false, None).unwrap_or_default();
        assert_eq!(selectors.into_vec(), vec![".c"]);

        let selectors = index.selectors("bar.example.org", false, None).unwrap_or_default();
        assert_eq!(selectors.into_vec(), vec![".c", ".c"]);
    }

    #[test]
    fn test_exception_moves_generic_to_conditional() {
        let mut index = ElemHideIndex::new();
        index.add(&hide(&[], ".ad"));
        index.add(&hide(&[], ".banner"));
        index.add(&elemhide(FilterType::ElemHideException, &[("example.org", true)], ".ad"));

        let on_example = index.selectors("example.org", false, None).unwrap_or_default();
        assert_eq!(on_example.unconditional, vec![".banner"]);
        assert!(on_example.conditional.is_empty());

        let elsewhere = index.selectors("example.com", false, None).unwrap_or_default();
        assert_eq!(elsewhere.unconditional, vec![".banner"]);
        assert_eq!(elsewhere.conditional, vec![".ad"]);
    }

    #[test]
    fn test_specific_only_skips_generic() {
        let mut index = ElemHideIndex::new();
        index.add(&hide(&[], ".generic"));
        index.add(&hide(&[("example.com", false)], ".not-on-example"));
        index.add(&hide(&[("example.org", true)], ".specific"));

        let all = index.selectors("example.org", false, None).unwrap_or_default();
        assert_eq!(all.into_vec(), vec![".generic", ".specific", ".not-on-example"]);

        let specific = index.selectors("example.org", true, None).unwrap_or_default();
        assert_eq!(specific.into_vec(), vec![".specific"]);
    }

    #[test]
    fn test_empty_domain_uses_generic_level_only() {
        let mut index = ElemHideIndex::new();
        index.add(&hide(&[], ".a"));
        index.add(&hide(&[("example.com", false)], ".b"));
        index.add(&hide(&[("example.org", true)], ".c"));

        let selectors = index.selectors("", false, None).unwrap_or_default();
        assert_eq!(selectors.into_vec(), vec![".a", ".b"]);
    }

    #[test]
    fn test_remove() {
        let mut index = ElemHideIndex::new();
        let filter = hide(&[("example.org", true)], ".c");
        assert!(index.add(&filter));
        assert!(!index.add(&filter));
        assert!(index.remove(&filter));
        assert!(!index.remove(&filter));
        assert!(index.selectors("example.org", false, None).unwrap_or_default().is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_stylesheet_format() {
        let selectors = ElemHideSelectors {
            unconditional: vec!["#a".to_string()],
            conditional: vec!["#a".to_string(), ".b".to_string()],
        };
        assert_eq!(
            selectors.to_stylesheet(),
            "#a {display: none !important;}\n#a, .b {display: none !important;}\n"
        );
        assert_eq!(ElemHideSelectors::default().to_stylesheet(), "");
    }

    #[test]
    fn test_stylesheet_groups() {
        let many: Vec<String> = (0..SELECTOR_GROUP_SIZE + 1).map(|i| format!(".s{i}")).collect();
        let css = create_stylesheet(&many);
        assert_eq!(css.lines().count(), 2);
        assert!(css.ends_with(&format!(".s{} {}\n", SELECTOR_GROUP_SIZE, HIDE_DECLARATION)));
    }

    #[test]
    fn test_emulation_selectors() {
        let mut index = ElemHideIndex::new();
        index.add(&elemhide(FilterType::ElemHideEmulation, &[("example.org", true)], "div:-abp-has(>span)"));
        index.add(&elemhide(FilterType::ElemHideEmulation, &[("example.org", true)], "p:-abp-contains(ad)"));
        index.add(&elemhide(FilterType::ElemHideException, &[("foo.example.org", true)], "p:-abp-contains(ad)"));

        let on_example = index.emulation_selectors("example.org");
        assert_eq!(on_example.len(), 2);
        assert_eq!(on_example[0].selector, "div:-abp-has(>span)");
        assert_eq!(on_example[0].text, "example.org#?#div:-abp-has(>span)");

        let on_foo = index.emulation_selectors("foo.example.org");
        assert_eq!(on_foo.len(), 1);
        assert!(index.emulation_selectors("").is_empty());
        assert!(index.emulation_selectors("example.com").is_empty());
    }

    #[test]
    fn test_cancelled_walk() {
        let mut index = ElemHideIndex::new();
        index.add(&hide(&[("example.org", true)], ".c"));
        let cancel = CancelFlag::new();
        cancel.cancel();
        assert!(index.selectors("example.org", false, Some(&cancel)).is_none());
    }
}
