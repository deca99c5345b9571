//! Rule Store
//!
//! Owns every filter and subscription record and the indices built over the
//! active set. The active set is the custom filters plus the filters of every
//! listed, enabled subscription. Contributions are counted per filter text so
//! a filter stays indexed while anything still contributes it.
//!
//! Mutations return the events they caused; the caller decides when to
//! deliver them.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use crate::elemhide::ElemHideIndex;
use crate::filter::Filter;
use crate::matcher::{Matcher, MatcherStats};
use crate::psl::is_third_party;
use crate::subscription::{ListMetadata, Subscription, SyncStatus};
use crate::types::{ContentType, RequestContext};
use crate::url::host_from_url;

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventAction {
    FilterAdded,
    FilterRemoved,
    SubscriptionAdded,
    SubscriptionRemoved,
    SubscriptionDisabled,
    SubscriptionUpdated,
    SubscriptionTitle,
    SubscriptionDownloadStatus,
}

impl EventAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FilterAdded => "filter.added",
            Self::FilterRemoved => "filter.removed",
            Self::SubscriptionAdded => "subscription.added",
            Self::SubscriptionRemoved => "subscription.removed",
            Self::SubscriptionDisabled => "subscription.disabled",
            Self::SubscriptionUpdated => "subscription.updated",
            Self::SubscriptionTitle => "subscription.title",
            Self::SubscriptionDownloadStatus => "subscription.downloadStatus",
        }
    }
}

/// A change to the store, carrying a snapshot of its subject.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Filter {
        action: EventAction,
        filter: Arc<Filter>,
    },
    Subscription {
        action: EventAction,
        subscription: Subscription,
    },
}

impl StoreEvent {
    pub fn action(&self) -> EventAction {
        match self {
            Self::Filter { action, .. } | Self::Subscription { action, .. } => *action,
        }
    }
}

// =============================================================================
// Store
// =============================================================================

#[derive(Debug)]
struct SubscriptionEntry {
    info: Subscription,
    filters: Vec<Arc<Filter>>,
}

/// Store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub active_filters: usize,
    pub custom_filters: usize,
    pub listed_subscriptions: usize,
    pub matcher: MatcherStats,
    pub elemhide_filters: usize,
}

#[derive(Debug, Default)]
pub struct RuleStore {
    /// Interned filters by text; entries die with their last owner
    known: HashMap<String, Weak<Filter>>,
    custom: Vec<Arc<Filter>>,
    custom_texts: HashSet<String>,
    subscriptions: HashMap<String, SubscriptionEntry>,
    listed: Vec<String>,
    /// Contribution count of every active filter text
    active: HashMap<String, usize>,
    matcher: Matcher,
    elemhide: ElemHideIndex,
    acceptable_ads_url: Option<String>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Filter arena
    // -------------------------------------------------------------------------

    /// Reuse the stored instance of a filter with the same text, if any.
    pub fn intern(&mut self, filter: Arc<Filter>) -> Arc<Filter> {
        if let Some(existing) = self.known.get(&filter.text).and_then(Weak::upgrade) {
            return existing;
        }
        self.known.insert(filter.text.clone(), Arc::downgrade(&filter));
        filter
    }

    /// Stored filter for `text`, if anything still holds it.
    pub fn known_filter(&self, text: &str) -> Option<Arc<Filter>> {
        self.known.get(text).and_then(Weak::upgrade)
    }

    fn prune_known(&mut self) {
        self.known.retain(|_, weak| weak.strong_count() > 0);
    }

    fn activate(&mut self, filter: &Arc<Filter>) {
        let count = self.active.entry(filter.text.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.matcher.add(filter);
            self.elemhide.add(filter);
        }
    }

    fn release(&mut self, filter: &Filter) {
        let Some(count) = self.active.get_mut(&filter.text) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.active.remove(&filter.text);
            self.matcher.remove(filter);
            self.elemhide.remove(filter);
        }
    }

    pub fn is_active(&self, text: &str) -> bool {
        self.active.contains_key(text)
    }

    // -------------------------------------------------------------------------
    // Custom filters
    // -------------------------------------------------------------------------

    /// Add a custom filter. Adding a filter already present is a no-op.
    pub fn add_filter(&mut self, filter: Arc<Filter>) -> Option<StoreEvent> {
        if self.custom_texts.contains(&filter.text) {
            return None;
        }
        let filter = self.intern(filter);
        self.custom_texts.insert(filter.text.clone());
        self.custom.push(Arc::clone(&filter));
        self.activate(&filter);

        log::debug!("Added custom filter '{}'", filter.text);
        Some(StoreEvent::Filter {
            action: EventAction::FilterAdded,
            filter,
        })
    }

    /// Remove a custom filter. Removing an absent filter is a no-op.
    pub fn remove_filter(&mut self, filter: &Filter) -> Option<StoreEvent> {
        if !self.custom_texts.remove(&filter.text) {
            return None;
        }
        let index = self.custom.iter().position(|f| f.text == filter.text)?;
        let removed = self.custom.remove(index);
        self.release(&removed);
        self.prune_known();

        log::debug!("Removed custom filter '{}'", removed.text);
        Some(StoreEvent::Filter {
            action: EventAction::FilterRemoved,
            filter: removed,
        })
    }

    /// Custom filters in insertion order.
    pub fn list_filters(&self) -> Vec<Arc<Filter>> {
        self.custom.clone()
    }

    pub fn has_filter(&self, text: &str) -> bool {
        self.custom_texts.contains(text)
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    pub fn set_acceptable_ads_url(&mut self, url: Option<String>) {
        for (sub_url, entry) in &mut self.subscriptions {
            entry.info.is_acceptable_ads = url.as_deref() == Some(sub_url.as_str());
        }
        self.acceptable_ads_url = url;
    }

    pub fn acceptable_ads_url(&self) -> Option<&str> {
        self.acceptable_ads_url.as_deref()
    }

    fn entry_mut(&mut self, url: &str) -> &mut SubscriptionEntry {
        let acceptable_ads = self.acceptable_ads_url.as_deref() == Some(url);
        self.subscriptions.entry(url.to_string()).or_insert_with(|| {
            let mut info = Subscription::new(url);
            info.is_acceptable_ads = acceptable_ads;
            SubscriptionEntry {
                info,
                filters: Vec::new(),
            }
        })
    }

    fn subscription_event(&self, url: &str, action: EventAction) -> Option<StoreEvent> {
        let entry = self.subscriptions.get(url)?;
        Some(StoreEvent::Subscription {
            action,
            subscription: entry.info.clone(),
        })
    }

    /// Look up a subscription, creating an unlisted record if it is unknown.
    pub fn get_subscription(&mut self, url: &str) -> Subscription {
        self.entry_mut(url).info.clone()
    }

    /// Look up a subscription without creating it.
    pub fn find_subscription(&self, url: &str) -> Option<Subscription> {
        self.subscriptions.get(url).map(|entry| entry.info.clone())
    }

    /// Listed subscriptions in the order they were added.
    pub fn list_subscriptions(&self) -> Vec<Subscription> {
        self.listed
            .iter()
            .filter_map(|url| self.subscriptions.get(url))
            .map(|entry| entry.info.clone())
            .collect()
    }

    pub fn subscription_filters(&self, url: &str) -> Vec<Arc<Filter>> {
        self.subscriptions
            .get(url)
            .map(|entry| entry.filters.clone())
            .unwrap_or_default()
    }

    fn activate_all(&mut self, filters: &[Arc<Filter>]) {
        for filter in filters {
            self.activate(filter);
        }
    }

    fn release_all(&mut self, filters: &[Arc<Filter>]) {
        for filter in filters {
            self.release(filter);
        }
    }

    pub fn add_subscription(&mut self, url: &str) -> Option<StoreEvent> {
        let entry = self.entry_mut(url);
        if entry.info.listed {
            return None;
        }
        entry.info.listed = true;
        let contributing = entry.info.is_contributing();
        let filters = entry.filters.clone();

        self.listed.push(url.to_string());
        if contributing {
            self.activate_all(&filters);
        }
        log::info!("Subscription '{}' added ({} filters)", url, filters.len());
        self.subscription_event(url, EventAction::SubscriptionAdded)
    }

    pub fn remove_subscription(&mut self, url: &str) -> Option<StoreEvent> {
        let entry = self.subscriptions.get_mut(url)?;
        if !entry.info.listed {
            return None;
        }
        let was_contributing = entry.info.is_contributing();
        entry.info.listed = false;
        let filters = entry.filters.clone();

        self.listed.retain(|listed| listed != url);
        if was_contributing {
            self.release_all(&filters);
        }
        log::info!("Subscription '{}' removed", url);
        self.subscription_event(url, EventAction::SubscriptionRemoved)
    }

    /// Toggle a subscription's participation in matching. Fires only on change.
    pub fn set_disabled(&mut self, url: &str, disabled: bool) -> Option<StoreEvent> {
        let entry = self.entry_mut(url);
        if entry.info.disabled == disabled {
            return None;
        }
        let was_contributing = entry.info.is_contributing();
        entry.info.disabled = disabled;
        let is_contributing = entry.info.is_contributing();
        let filters = entry.filters.clone();

        match (was_contributing, is_contributing) {
            (false, true) => self.activate_all(&filters),
            (true, false) => self.release_all(&filters),
            _ => {}
        }
        self.subscription_event(url, EventAction::SubscriptionDisabled)
    }

    /// Install a freshly downloaded filter list for a subscription.
    ///
    /// New contributions are activated before the old ones are released, so
    /// filters common to both lists are never dropped from the indices.
    pub fn replace_subscription_filters(
        &mut self,
        url: &str,
        filters: Vec<Arc<Filter>>,
        metadata: &ListMetadata,
        now: u64,
    ) -> Vec<StoreEvent> {
        let mut seen = HashSet::new();
        let mut new_filters = Vec::with_capacity(filters.len());
        for filter in filters {
            if seen.insert(filter.text.clone()) {
                new_filters.push(self.intern(filter));
            }
        }

        let entry = self.entry_mut(url);
        let contributing = entry.info.is_contributing();
        let title_changed = entry.info.apply_metadata(metadata, now);
        entry.info.filter_count = new_filters.len();
        let old_filters = std::mem::replace(&mut entry.filters, new_filters.clone());

        if contributing {
            self.activate_all(&new_filters);
            self.release_all(&old_filters);
        }
        drop(old_filters);
        self.prune_known();

        log::info!("Subscription '{}' now has {} filters", url, new_filters.len());

        let mut events = Vec::new();
        if title_changed {
            events.extend(self.subscription_event(url, EventAction::SubscriptionTitle));
        }
        events.extend(self.subscription_event(url, EventAction::SubscriptionUpdated));
        events
    }

    /// Record a synchronization state change. Failures bump the error count.
    pub fn set_synchronization_status(&mut self, url: &str, status: SyncStatus) -> Option<StoreEvent> {
        let entry = self.subscriptions.get_mut(url)?;
        entry.info.synchronization_status = status;
        if status.is_error() {
            entry.info.error_count = entry.info.error_count.saturating_add(1);
        } else if status == SyncStatus::SynchronizeOk {
            entry.info.error_count = 0;
        }
        self.subscription_event(url, EventAction::SubscriptionDownloadStatus)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn elemhide(&self) -> &ElemHideIndex {
        &self.elemhide
    }

    /// Match a request against the active network filters.
    ///
    /// `document_chain` runs from the immediate parent to the top frame.
    pub fn matches<S: AsRef<str>>(
        &self,
        url: &str,
        content_type: ContentType,
        document_chain: &[S],
        site_key: Option<&str>,
        specific_only: bool,
    ) -> Option<Arc<Filter>> {
        let doc_domain = document_chain
            .first()
            .map(|parent| host_from_url(parent.as_ref()))
            .unwrap_or_default();
        let top_host = document_chain
            .last()
            .map(|top| host_from_url(top.as_ref()))
            .unwrap_or_default();
        let request_host = host_from_url(url);

        let ctx = RequestContext {
            url,
            content_type,
            doc_domain: &doc_domain,
            is_third_party: is_third_party(&request_host, &top_host),
            site_key,
            specific_only,
        };
        self.matcher.match_request(&ctx)
    }

    /// Is any document of the chain allowlisted for `content_type`?
    ///
    /// Each `chain[i]` is checked with `chain[i + 1..]` as its parents. An
    /// empty chain checks `url` itself. A top-level document is its own
    /// parent, so `$domain=` exceptions see the document's host.
    pub fn is_content_allowlisted<S: AsRef<str>>(
        &self,
        url: &str,
        content_type: ContentType,
        document_chain: &[S],
        site_key: Option<&str>,
    ) -> bool {
        let is_exception = |hit: Option<Arc<Filter>>| hit.map_or(false, |f| f.is_exception());

        if document_chain.is_empty() {
            return is_exception(self.matches(url, content_type, &[url], site_key, false));
        }

        (0..document_chain.len()).any(|i| {
            let document = document_chain[i].as_ref();
            let parents = match &document_chain[i + 1..] {
                [] => std::slice::from_ref(&document_chain[i]),
                parents => parents,
            };
            is_exception(self.matches(document, content_type, parents, site_key, false))
        })
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            active_filters: self.active.len(),
            custom_filters: self.custom.len(),
            listed_subscriptions: self.listed.len(),
            matcher: self.matcher.stats(),
            elemhide_filters: self.elemhide.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::DomainMap;
    use crate::pattern::Pattern;
    use crate::types::{FilterType, PartyMask};

    fn network(text: &str) -> Arc<Filter> {
        let (filter_type, pattern) = match text.strip_prefix("@@") {
            Some(rest) => (FilterType::Exception, rest),
            None => (FilterType::Blocking, text),
        };
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

    fn hit(store: &RuleStore, url: &str) -> Option<String> {
        store
            .matches::<&str>(url, ContentType::IMAGE, &[], None, false)
            .map(|f| f.text.clone())
    }

    const LIST: &str = "https://lists.example/list.txt";

    #[test]
    fn test_idempotent_add_and_remove() {
        let mut store = RuleStore::new();
        assert!(store.add_filter(network("adbanner.gif")).is_some());
        assert!(store.add_filter(network("adbanner.gif")).is_none());
        assert_eq!(store.list_filters().len(), 1);

        let filter = network("adbanner.gif");
        let event = store.remove_filter(&filter).map(|e| e.action());
        assert_eq!(event, Some(EventAction::FilterRemoved));
        assert!(store.remove_filter(&filter).is_none());
        assert!(store.list_filters().is_empty());
    }

    #[test]
    fn test_list_filters_in_insertion_order() {
        let mut store = RuleStore::new();
        for text in ["b", "a", "c"] {
            store.add_filter(network(text));
        }
        let texts: Vec<String> = store.list_filters().iter().map(|f| f.text.clone()).collect();
        assert_eq!(texts, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_subscription_lifecycle() {
        let mut store = RuleStore::new();
        let sub = store.get_subscription(LIST);
        assert!(!sub.listed);
        assert!(store.list_subscriptions().is_empty());

        store.replace_subscription_filters(LIST, vec![network("adbanner.gif")], &ListMetadata::default(), 0);
        assert_eq!(hit(&store, "http://x/adbanner.gif"), None, "unlisted lists do not match");

        assert_eq!(store.add_subscription(LIST).map(|e| e.action()), Some(EventAction::SubscriptionAdded));
        assert!(store.add_subscription(LIST).is_none());
        assert_eq!(hit(&store, "http://x/adbanner.gif"), Some("adbanner.gif".to_string()));

        assert!(store.set_disabled(LIST, true).is_some());
        assert!(store.set_disabled(LIST, true).is_none());
        assert_eq!(hit(&store, "http://x/adbanner.gif"), None);
        assert_eq!(store.subscription_filters(LIST).len(), 1);

        assert!(store.set_disabled(LIST, false).is_some());
        assert!(store.remove_subscription(LIST).is_some());
        assert!(store.remove_subscription(LIST).is_none());
        assert_eq!(hit(&store, "http://x/adbanner.gif"), None);
    }

    #[test]
    fn test_shared_text_survives_removal() {
        let mut store = RuleStore::new();
        store.add_filter(network("adbanner.gif"));
        store.replace_subscription_filters(LIST, vec![network("adbanner.gif")], &ListMetadata::default(), 0);
        store.add_subscription(LIST);
        assert_eq!(store.stats().active_filters, 1);

        store.remove_subscription(LIST);
        assert_eq!(hit(&store, "http://x/adbanner.gif"), Some("adbanner.gif".to_string()));
        assert_eq!(store.list_filters().len(), 1);
    }

    #[test]
    fn test_replace_keeps_common_filters_indexed() {
        let mut store = RuleStore::new();
        store.add_subscription(LIST);
        store.replace_subscription_filters(
            LIST,
            vec![network("adbanner.gif"), network("old.gif")],
            &ListMetadata::default(),
            0,
        );
        let events = store.replace_subscription_filters(
            LIST,
            vec![network("adbanner.gif"), network("new.gif"), network("new.gif")],
            &ListMetadata {
                title: Some("Example list".to_string()),
                ..ListMetadata::default()
            },
            0,
        );

        let actions: Vec<EventAction> = events.iter().map(StoreEvent::action).collect();
        assert_eq!(actions, vec![EventAction::SubscriptionTitle, EventAction::SubscriptionUpdated]);
        assert_eq!(hit(&store, "http://x/adbanner.gif"), Some("adbanner.gif".to_string()));
        assert_eq!(hit(&store, "http://x/new.gif"), Some("new.gif".to_string()));
        assert_eq!(hit(&store, "http://x/old.gif"), None);
        assert_eq!(store.get_subscription(LIST).filter_count, 2);
        assert!(store.known_filter("old.gif").is_none());
    }

    #[test]
    fn test_sync_status_counts_errors() {
        let mut store = RuleStore::new();
        assert!(store.set_synchronization_status(LIST, SyncStatus::SynchronizeOk).is_none());

        store.add_subscription(LIST);
        store.set_synchronization_status(LIST, SyncStatus::SynchronizeConnectionError);
        store.set_synchronization_status(LIST, SyncStatus::SynchronizeInvalidData);
        assert_eq!(store.get_subscription(LIST).error_count, 2);

        let event = store.set_synchronization_status(LIST, SyncStatus::SynchronizeInProgress);
        assert_eq!(event.map(|e| e.action()), Some(EventAction::SubscriptionDownloadStatus));
        assert!(store.get_subscription(LIST).is_updating());
    }

    #[test]
    fn test_acceptable_ads_flag() {
        let mut store = RuleStore::new();
        store.get_subscription(LIST);
        store.set_acceptable_ads_url(Some(LIST.to_string()));
        assert!(store.get_subscription(LIST).is_acceptable_ads);
        assert!(!store.get_subscription("https://other.example/").is_acceptable_ads);
    }

    #[test]
    fn test_content_allowlisted_walks_chain() {
        let mut store = RuleStore::new();
        store.add_filter(network("@@||allowed.example^"));

        let chain = ["http://frame.example/", "http://allowed.example/"];
        assert!(store.is_content_allowlisted("http://x/", ContentType::IMAGE, &chain, None));
        assert!(!store.is_content_allowlisted("http://x/", ContentType::IMAGE, &chain[..1], None));
        assert!(store.is_content_allowlisted::<&str>("http://allowed.example/", ContentType::IMAGE, &[], None));
    }

    #[test]
    fn test_top_document_is_its_own_parent() {
        let mut store = RuleStore::new();
        let filter = Filter {
            text: "@@||mine.example^$document,domain=mine.example".into(),
            content_types: ContentType::DOCUMENT,
            domains: DomainMap::from_entries([("mine.example", true)]),
            ..(*network("@@||mine.example^")).clone()
        };
        store.add_filter(Arc::new(filter));

        let doc = ContentType::DOCUMENT;
        assert!(store.is_content_allowlisted::<&str>("http://mine.example/", doc, &[], None));
        assert!(store.is_content_allowlisted("http://x/", doc, &["http://mine.example/page"], None));
        assert!(!store.is_content_allowlisted("http://x/", doc, &["http://mine.example/", "http://other.example/"], None));
    }
}
