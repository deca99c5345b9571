//! Thread-safe filter engine handle
//!
//! The store sits behind a `parking_lot::RwLock`: matching and selector
//! queries share the read lock, mutations take the write lock. Events are
//! gathered under the lock and dispatched after it is released.

use std::collections::HashSet;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hush_compiler::{compile, dedupe, normalize, parse_list};
use hush_core::elemhide::{CancelFlag, ElemHideSelectors};
use hush_core::filter::Filter;
use hush_core::psl::{init_psl, PslSets};
use hush_core::store::{RuleStore, StoreEvent, StoreStats};
use hush_core::subscription::{Subscription, SyncStatus};
use hush_core::types::{ContentType, EmulationSelector};
use parking_lot::RwLock;
use serde_json::Value;

use crate::cache::{CachedList, ListCache};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{FilterChangeListener, ListenerId, Listeners};
use crate::prefs::{self, PrefValue, Preferences};
use crate::sync::{ConnectionGate, WebRequest};

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// =============================================================================
// Request Decision
// =============================================================================

/// Why a request was let through.
#[derive(Debug, Clone)]
pub enum AllowReason {
    /// A document of the chain is allowlisted with `$document`
    Document,
    /// An exception filter matched the request itself
    Filter(Arc<Filter>),
}

/// Outcome of a full request check.
#[derive(Debug, Clone)]
pub enum RequestDecision {
    Allowed(AllowReason),
    Blocked(Arc<Filter>),
    NoMatch,
}

impl RequestDecision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }
}

// =============================================================================
// Engine
// =============================================================================

pub struct FilterEngine {
    pub(crate) config: EngineConfig,
    enabled: AtomicBool,
    pub(crate) store: RwLock<RuleStore>,
    prefs: RwLock<Preferences>,
    listeners: Listeners,
    pub(crate) cache: Option<ListCache>,
    pub(crate) web_request: Arc<dyn WebRequest>,
    pub(crate) connection_gate: Option<Arc<dyn ConnectionGate>>,
}

impl FilterEngine {
    pub fn new(config: EngineConfig, web_request: Arc<dyn WebRequest>) -> Result<Self, EngineError> {
        let prefs = Preferences::new(&config)?;

        if let Some(path) = &config.psl_path {
            let rules = fs::read_to_string(path)?;
            init_psl(PslSets::parse(&rules));
        }

        let mut store = RuleStore::new();
        store.set_acceptable_ads_url(prefs.get_string(prefs::ACCEPTABLE_ADS_URL));

        let cache = config.base_path.as_ref().map(|dir| ListCache::new(dir.clone()));
        match &cache {
            Some(cache) => log::info!("Filter engine created, list cache at {}", cache.dir().display()),
            None => log::info!("Filter engine created without list cache"),
        }

        Ok(Self {
            config,
            enabled: AtomicBool::new(true),
            store: RwLock::new(store),
            prefs: RwLock::new(prefs),
            listeners: Listeners::new(),
            cache,
            web_request,
            connection_gate: None,
        })
    }

    /// Ask `gate` before every subscription download.
    pub fn with_connection_gate(mut self, gate: Arc<dyn ConnectionGate>) -> Self {
        self.connection_gate = Some(gate);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A disabled engine matches nothing and hides nothing. Filters and
    /// subscriptions are kept.
    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::SeqCst) != enabled {
            log::info!("Filter engine {}", if enabled { "enabled" } else { "disabled" });
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Run a mutation under the write lock, then deliver its events.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut RuleStore) -> (R, Vec<StoreEvent>)) -> R {
        let (result, events) = {
            let mut store = self.store.write();
            f(&mut store)
        };
        self.listeners.dispatch(&events);
        result
    }

    // -------------------------------------------------------------------------
    // Filters
    // -------------------------------------------------------------------------

    /// Compile `text`, reusing the stored filter with the same normalized text.
    pub fn get_filter(&self, text: &str) -> Arc<Filter> {
        let normalized = normalize(text);
        if let Some(existing) = self.store.read().known_filter(&normalized) {
            return existing;
        }
        Arc::new(compile(&normalized))
    }

    pub fn add_filter(&self, filter: &Arc<Filter>) {
        self.mutate(|store| ((), store.add_filter(Arc::clone(filter)).into_iter().collect()));
    }

    pub fn remove_filter(&self, filter: &Filter) {
        self.mutate(|store| ((), store.remove_filter(filter).into_iter().collect()));
    }

    pub fn list_filters(&self) -> Vec<Arc<Filter>> {
        self.store.read().list_filters()
    }

    // -------------------------------------------------------------------------
    // Domain Allowlisting
    // -------------------------------------------------------------------------

    /// Allowlist every page on `domain` and its subdomains.
    pub fn add_domain_allowlisting_filter(&self, domain: &str) {
        self.add_filter(&self.get_filter(&domain_allowlisting_filter_text(domain)));
    }

    pub fn remove_domain_allowlisting_filter(&self, domain: &str) {
        self.remove_filter(&self.get_filter(&domain_allowlisting_filter_text(domain)));
    }

    /// Add an allowlisting filter for each domain in one store update.
    pub fn init_allowlisted_domains<S: AsRef<str>>(&self, domains: &[S]) {
        let filters: Vec<Arc<Filter>> = domains
            .iter()
            .map(|domain| self.get_filter(&domain_allowlisting_filter_text(domain.as_ref())))
            .collect();
        self.mutate(|store| {
            let events = filters.into_iter().filter_map(|filter| store.add_filter(filter)).collect();
            ((), events)
        });
    }

    /// Domains with an active allowlisting filter, in filter order.
    pub fn list_allowlisted_domains(&self) -> Vec<String> {
        self.list_filters()
            .iter()
            .filter_map(|filter| allowlisted_domain(&filter.text))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    pub fn get_subscription(&self, url: &str) -> Subscription {
        self.store.write().get_subscription(url)
    }

    pub fn list_subscriptions(&self) -> Vec<Subscription> {
        self.store.read().list_subscriptions()
    }

    pub fn subscription_filters(&self, url: &str) -> Vec<Arc<Filter>> {
        self.store.read().subscription_filters(url)
    }

    /// List a subscription. A never-downloaded list is filled from the cache.
    pub fn add_subscription(&self, url: &str) {
        let needs_body = self.store.read().subscription_filters(url).is_empty();
        let cached = if needs_body { self.load_cached(url) } else { None };

        self.mutate(|store| {
            let Some(added) = store.add_subscription(url) else {
                return ((), Vec::new());
            };
            let mut events = vec![added];
            if let Some(cached) = cached {
                if store.subscription_filters(url).is_empty() {
                    log::info!("Loading '{}' from cache", url);
                    events.extend(install_list(store, url, &cached.body, cached.saved_at).unwrap_or_default());
                }
            }
            ((), events)
        });
    }

    pub fn remove_subscription(&self, url: &str) {
        self.mutate(|store| ((), store.remove_subscription(url).into_iter().collect()));
    }

    pub fn set_subscription_disabled(&self, url: &str, disabled: bool) {
        self.mutate(|store| ((), store.set_disabled(url, disabled).into_iter().collect()));
    }

    /// Make `urls` the exact set of listed subscriptions. Lists already
    /// listed keep their filters and state.
    pub fn set_subscriptions<S: AsRef<str>>(&self, urls: &[S]) {
        let wanted: HashSet<&str> = urls.iter().map(AsRef::as_ref).collect();
        let stale: Vec<String> = self
            .list_subscriptions()
            .into_iter()
            .map(|sub| sub.url)
            .filter(|url| !wanted.contains(url.as_str()))
            .collect();

        for url in &stale {
            self.remove_subscription(url);
        }
        for url in urls {
            self.add_subscription(url.as_ref());
        }
        log::debug!("Subscriptions set: {} listed, {} removed", wanted.len(), stale.len());
    }

    pub fn clear_subscriptions(&self) {
        self.mutate(|store| {
            let urls: Vec<String> = store.list_subscriptions().into_iter().map(|sub| sub.url).collect();
            let events = urls.iter().filter_map(|url| store.remove_subscription(url)).collect();
            ((), events)
        });
    }

    fn load_cached(&self, url: &str) -> Option<CachedList> {
        let cache = self.cache.as_ref()?;
        match cache.load(url) {
            Ok(cached) => cached,
            Err(err) => {
                log::warn!("Ignoring cached list for '{}': {}", url, err);
                None
            }
        }
    }

    /// Store a downloaded body: install its filters and mark the list fresh.
    ///
    /// A body without an `[Adblock` header leaves the old filters in place.
    pub(crate) fn finish_download(&self, url: &str, body: &str, now: u64) -> Result<(), EngineError> {
        let installed = self.mutate(|store| match install_list(store, url, body, now) {
            Some(mut events) => {
                events.extend(store.set_synchronization_status(url, SyncStatus::SynchronizeOk));
                (true, events)
            }
            None => {
                let events = store.set_synchronization_status(url, SyncStatus::SynchronizeInvalidData);
                (false, events.into_iter().collect())
            }
        });

        if !installed {
            log::warn!("Subscription '{}' returned a list without header", url);
            return Err(EngineError::InvalidList(url.to_string()));
        }

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.store(url, body, now) {
                log::warn!("Failed to cache '{}': {}", url, err);
            }
        }
        Ok(())
    }

    pub(crate) fn set_sync_status(&self, url: &str, status: SyncStatus) {
        self.mutate(|store| ((), store.set_synchronization_status(url, status).into_iter().collect()));
    }

    // -------------------------------------------------------------------------
    // Matching
    // -------------------------------------------------------------------------

    /// Filter deciding a request, `None` when nothing matches.
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
        if !self.is_enabled() {
            return None;
        }
        self.store
            .read()
            .matches(url, content_type, document_chain, site_key, specific_only)
    }

    pub fn is_content_allowlisted<S: AsRef<str>>(
        &self,
        url: &str,
        content_type: ContentType,
        document_chain: &[S],
        site_key: Option<&str>,
    ) -> bool {
        self.store
            .read()
            .is_content_allowlisted(url, content_type, document_chain, site_key)
    }

    #[deprecated(note = "use is_content_allowlisted with ContentType::GENERICBLOCK")]
    pub fn is_generic_block_allowlisted<S: AsRef<str>>(&self, url: &str, document_chain: &[S], site_key: Option<&str>) -> bool {
        self.is_content_allowlisted(url, ContentType::GENERICBLOCK, document_chain, site_key)
    }

    #[deprecated(note = "use is_content_allowlisted with ContentType::DOCUMENT")]
    pub fn is_document_allowlisted<S: AsRef<str>>(&self, url: &str, document_chain: &[S], site_key: Option<&str>) -> bool {
        self.is_content_allowlisted(url, ContentType::DOCUMENT, document_chain, site_key)
    }

    #[deprecated(note = "use is_content_allowlisted with ContentType::ELEMHIDE")]
    pub fn is_elemhide_allowlisted<S: AsRef<str>>(&self, url: &str, document_chain: &[S], site_key: Option<&str>) -> bool {
        self.is_content_allowlisted(url, ContentType::ELEMHIDE, document_chain, site_key)
    }

    /// Full check of a subresource request.
    ///
    /// An allowlisted document lets everything through. A `$genericblock`
    /// exception on any document of the chain restricts matching to specific
    /// filters.
    pub fn check_request<S: AsRef<str>>(
        &self,
        url: &str,
        content_type: ContentType,
        document_chain: &[S],
        site_key: Option<&str>,
    ) -> RequestDecision {
        if !self.is_enabled() {
            return RequestDecision::NoMatch;
        }
        let store = self.store.read();

        if store.is_content_allowlisted(url, ContentType::DOCUMENT, document_chain, site_key) {
            return RequestDecision::Allowed(AllowReason::Document);
        }

        let specific_only = !document_chain.is_empty()
            && store.is_content_allowlisted(url, ContentType::GENERICBLOCK, document_chain, site_key);

        match store.matches(url, content_type, document_chain, site_key, specific_only) {
            Some(filter) if filter.is_exception() => RequestDecision::Allowed(AllowReason::Filter(filter)),
            Some(filter) => RequestDecision::Blocked(filter),
            None => RequestDecision::NoMatch,
        }
    }

    // -------------------------------------------------------------------------
    // Element Hiding
    // -------------------------------------------------------------------------

    fn elemhide_enabled(&self) -> bool {
        self.prefs.read().get_bool(prefs::ELEMHIDE_ENABLED)
    }

    /// Resolve selectors, `None` when cancelled.
    pub fn resolve_selectors(
        &self,
        domain: &str,
        specific_only: bool,
        cancel: Option<&CancelFlag>,
    ) -> Option<ElemHideSelectors> {
        if !self.is_enabled() || !self.elemhide_enabled() {
            return Some(ElemHideSelectors::default());
        }
        self.store.read().elemhide().selectors(domain, specific_only, cancel)
    }

    pub fn element_hiding_selectors(&self, domain: &str, specific_only: bool) -> Vec<String> {
        self.resolve_selectors(domain, specific_only, None)
            .map(ElemHideSelectors::into_vec)
            .unwrap_or_default()
    }

    pub fn element_hiding_stylesheet(&self, domain: &str, specific_only: bool) -> String {
        self.resolve_selectors(domain, specific_only, None)
            .map(|selectors| selectors.to_stylesheet())
            .unwrap_or_default()
    }

    pub fn element_hiding_emulation_selectors(&self, domain: &str) -> Vec<EmulationSelector> {
        if !self.is_enabled() || !self.elemhide_enabled() {
            return Vec::new();
        }
        self.store.read().elemhide().emulation_selectors(domain)
    }

    /// How element hiding applies to a page: `None` when the page or one of
    /// its parents is allowlisted with `$document` or `$elemhide`, otherwise
    /// whether only specific selectors apply.
    ///
    /// `page_url` is the document being styled; `document_chain` holds its
    /// parents, immediate parent first.
    pub fn page_hiding_mode<S: AsRef<str>>(
        &self,
        page_url: &str,
        document_chain: &[S],
        site_key: Option<&str>,
        specific_only: bool,
    ) -> Option<bool> {
        let chain: Vec<&str> = std::iter::once(page_url)
            .chain(document_chain.iter().map(AsRef::as_ref))
            .collect();
        let store = self.store.read();
        let allowlisted = |mask| store.is_content_allowlisted(page_url, mask, &chain, site_key);

        if allowlisted(ContentType::DOCUMENT) || allowlisted(ContentType::ELEMHIDE) {
            return None;
        }
        Some(specific_only || allowlisted(ContentType::GENERICHIDE))
    }

    /// Selectors for a page, honoring allowlisting of the page and its parents.
    pub fn page_element_hiding_selectors<S: AsRef<str>>(
        &self,
        page_url: &str,
        domain: &str,
        document_chain: &[S],
        site_key: Option<&str>,
        specific_only: bool,
    ) -> Vec<String> {
        match self.page_hiding_mode(page_url, document_chain, site_key, specific_only) {
            Some(specific_only) => self.element_hiding_selectors(domain, specific_only),
            None => Vec::new(),
        }
    }

    pub fn page_element_hiding_stylesheet<S: AsRef<str>>(
        &self,
        page_url: &str,
        domain: &str,
        document_chain: &[S],
        site_key: Option<&str>,
        specific_only: bool,
    ) -> String {
        match self.page_hiding_mode(page_url, document_chain, site_key, specific_only) {
            Some(specific_only) => self.element_hiding_stylesheet(domain, specific_only),
            None => String::new(),
        }
    }

    pub fn page_element_hiding_emulation_selectors<S: AsRef<str>>(
        &self,
        page_url: &str,
        domain: &str,
        document_chain: &[S],
        site_key: Option<&str>,
    ) -> Vec<EmulationSelector> {
        match self.page_hiding_mode(page_url, document_chain, site_key, false) {
            Some(_) => self.element_hiding_emulation_selectors(domain),
            None => Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    pub fn add_filter_change_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.listeners.add(Arc::new(listener))
    }

    pub fn remove_filter_change_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn set_filter_change_callback<F>(&self, callback: F)
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        let callback: Arc<FilterChangeListener> = Arc::new(callback);
        self.listeners.set_callback(Some(callback));
    }

    pub fn remove_filter_change_callback(&self) {
        self.listeners.set_callback(None);
    }

    // -------------------------------------------------------------------------
    // Preferences
    // -------------------------------------------------------------------------

    pub fn get_pref(&self, name: &str) -> Option<PrefValue> {
        self.prefs.read().get(name).cloned()
    }

    pub fn set_pref(&self, name: &str, value: PrefValue) -> Result<(), EngineError> {
        self.prefs.write().set(name, value)?;
        if name == prefs::ACCEPTABLE_ADS_URL {
            let url = self.prefs.read().get_string(prefs::ACCEPTABLE_ADS_URL);
            self.store.write().set_acceptable_ads_url(url);
        }
        Ok(())
    }

    pub fn allowed_connection_type(&self) -> Option<String> {
        self.prefs.read().get_string(prefs::ALLOWED_CONNECTION_TYPE)
    }

    pub fn set_allowed_connection_type(&self, value: Option<&str>) {
        let value = PrefValue::String(value.unwrap_or_default().to_string());
        if let Err(err) = self.prefs.write().set(prefs::ALLOWED_CONNECTION_TYPE, value) {
            log::warn!("Cannot set allowed connection type: {}", err);
        }
    }

    // -------------------------------------------------------------------------
    // Acceptable Ads
    // -------------------------------------------------------------------------

    pub fn acceptable_ads_subscription_url(&self) -> Option<String> {
        self.prefs.read().get_string(prefs::ACCEPTABLE_ADS_URL)
    }

    /// Listed and not disabled.
    pub fn is_acceptable_ads_enabled(&self) -> bool {
        let Some(url) = self.acceptable_ads_subscription_url() else {
            return false;
        };
        self.store
            .read()
            .find_subscription(&url)
            .map_or(false, |sub| sub.listed && !sub.disabled)
    }

    pub fn set_acceptable_ads_enabled(&self, enabled: bool) {
        let Some(url) = self.acceptable_ads_subscription_url() else {
            log::warn!("No acceptable ads subscription configured");
            return;
        };
        if enabled {
            self.add_subscription(&url);
            self.set_subscription_disabled(&url, false);
        } else {
            self.remove_subscription(&url);
        }
    }

    pub fn stats(&self) -> StoreStats {
        self.store.read().stats()
    }
}

impl std::fmt::Debug for FilterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterEngine")
            .field("enabled", &self.is_enabled())
            .field("stats", &self.stats())
            .field("listeners", &self.listeners)
            .finish()
    }
}

/// `@@||example.com^$document,domain=example.com`
pub fn domain_allowlisting_filter_text(domain: &str) -> String {
    format!("@@||{0}^$document,domain={0}", domain)
}

fn allowlisted_domain(text: &str) -> Option<String> {
    let rest = text.strip_prefix("@@||")?;
    let (domain, options) = rest.split_once("^$")?;
    (options == format!("document,domain={}", domain)).then(|| domain.to_string())
}

/// Parse, dedupe and compile a list body into a subscription.
/// Returns `None` when the body has no `[Adblock` header.
fn install_list(store: &mut RuleStore, url: &str, body: &str, now: u64) -> Option<Vec<StoreEvent>> {
    let mut parsed = parse_list(body);
    if !parsed.has_valid_header() {
        return None;
    }

    let stats = dedupe(&mut parsed.lines);
    log::debug!(
        "List '{}': {} lines, {} duplicates removed",
        url,
        stats.before,
        stats.deduped
    );

    let filters = parsed.compile().into_iter().map(Arc::new).collect();
    Some(store.replace_subscription_filters(url, filters, &parsed.metadata, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct Offline;

    impl WebRequest for Offline {
        fn get(&self, _url: &str, _timeout: Duration) -> Result<String, FetchError> {
            Err(FetchError::Connection("offline".into()))
        }
    }

    fn engine() -> FilterEngine {
        FilterEngine::new(EngineConfig::default(), Arc::new(Offline)).expect("engine")
    }

    fn record_events(engine: &FilterEngine) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.add_filter_change_listener(move |action, _| sink.lock().push(action.to_string()));
        seen
    }

    const LIST: &str = "https://lists.example/list.txt";

    #[test]
    fn test_get_filter_normalizes() {
        let engine = engine();
        let a = engine.get_filter("foo");
        let b = engine.get_filter("  foo  ");
        assert_eq!(a, b);
        assert_eq!(a.filter_type, b.filter_type);

        engine.add_filter(&a);
        assert!(Arc::ptr_eq(&engine.get_filter(" foo"), &engine.list_filters()[0]));
    }

    #[test]
    fn test_filter_events_fire_once() {
        let engine = engine();
        let seen = record_events(&engine);
        let filter = engine.get_filter("foo");

        engine.add_filter(&filter);
        engine.add_filter(&filter);
        engine.remove_filter(&filter);
        engine.remove_filter(&filter);
        assert_eq!(*seen.lock(), vec!["filter.added", "filter.removed"]);
    }

    #[test]
    fn test_listener_can_reenter_engine() {
        let engine = Arc::new(engine());
        let inner = Arc::clone(&engine);
        let counts = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&counts);
        engine.add_filter_change_listener(move |_, _| sink.lock().push(inner.list_filters().len()));

        engine.add_filter(&engine.get_filter("foo"));
        assert_eq!(*counts.lock(), vec![1]);
    }

    #[test]
    fn test_callback_receives_properties() {
        let engine = engine();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.set_filter_change_callback(move |action, props| {
            sink.lock().push(format!("{} {}", action, props["text"].as_str().unwrap_or_default()));
        });

        engine.add_filter(&engine.get_filter("adbanner.gif"));
        engine.remove_filter_change_callback();
        engine.add_filter(&engine.get_filter("other.gif"));
        assert_eq!(*seen.lock(), vec!["filter.added adbanner.gif"]);
    }

    #[test]
    fn test_subscription_events() {
        let engine = engine();
        let seen = record_events(&engine);

        engine.add_subscription(LIST);
        engine.add_subscription(LIST);
        engine.set_subscription_disabled(LIST, true);
        engine.set_subscription_disabled(LIST, true);
        engine.remove_subscription(LIST);
        engine.remove_subscription(LIST);

        assert_eq!(
            *seen.lock(),
            vec!["subscription.added", "subscription.disabled", "subscription.removed"]
        );
        assert!(engine.list_subscriptions().is_empty());
    }

    #[test]
    fn test_finish_download_and_invalid_body() {
        let engine = engine();
        engine.add_subscription(LIST);

        engine
            .finish_download(LIST, "[Adblock Plus 2.0]\n! Title: Example\n||ads.example^\n", 100)
            .expect("valid list");
        let sub = engine.get_subscription(LIST);
        assert_eq!(sub.title, "Example");
        assert_eq!(sub.synchronization_status, SyncStatus::SynchronizeOk);
        assert_eq!(sub.last_download, Some(100));

        let err = engine.finish_download(LIST, "||other.example^\n", 200);
        assert!(matches!(err, Err(EngineError::InvalidList(_))));
        let sub = engine.get_subscription(LIST);
        assert_eq!(sub.synchronization_status, SyncStatus::SynchronizeInvalidData);
        assert_eq!(sub.error_count, 1);
        assert!(engine
            .matches::<&str>("http://ads.example/x", ContentType::SCRIPT, &[], None, false)
            .is_some());
    }

    #[test]
    fn test_check_request() {
        let engine = engine();
        for text in ["||ads.example^", "||track.example^$domain=news.example", "@@||safe.example^$document", "@@||news.example^$genericblock", "@@||ads.example/ok^"] {
            engine.add_filter(&engine.get_filter(text));
        }
        let script = ContentType::SCRIPT;

        let decision = engine.check_request("http://ads.example/a.js", script, &["http://blog.example/"], None);
        assert!(decision.is_blocked());

        let decision = engine.check_request("http://ads.example/a.js", script, &["http://safe.example/"], None);
        assert!(matches!(decision, RequestDecision::Allowed(AllowReason::Document)));

        let decision = engine.check_request("http://ads.example/ok/a.js", script, &["http://blog.example/"], None);
        assert!(matches!(decision, RequestDecision::Allowed(AllowReason::Filter(_))));

        let chain = ["http://news.example/"];
        assert!(matches!(
            engine.check_request("http://ads.example/a.js", script, &chain, None),
            RequestDecision::NoMatch
        ));
        assert!(engine.check_request("http://track.example/a.js", script, &chain, None).is_blocked());
    }

    #[test]
    fn test_genericblock_on_nested_frame() {
        let engine = engine();
        for text in ["/ad.js", "||x.example/specific.js$domain=frame.example", "@@||frame.example^$genericblock"] {
            engine.add_filter(&engine.get_filter(text));
        }
        let script = ContentType::SCRIPT;
        let nested = ["http://frame.example/", "http://top.example/"];

        assert!(!engine.check_request("http://x.example/ad.js", script, &nested, None).is_blocked());
        assert!(!engine.check_request("http://x.example/ad.js", script, &nested[..1], None).is_blocked());
        assert!(engine.check_request("http://x.example/specific.js", script, &nested, None).is_blocked());

        let elsewhere = ["http://other.example/", "http://top.example/"];
        assert!(engine.check_request("http://x.example/ad.js", script, &elsewhere, None).is_blocked());
    }

    #[test]
    #[allow(deprecated)]
    fn test_allowlist_wrappers() {
        let engine = engine();
        engine.add_filter(&engine.get_filter("@@||example.org^$document,elemhide,genericblock"));
        let chain = ["http://example.org/"];
        assert!(engine.is_document_allowlisted("http://x.example/", &chain, None));
        assert!(engine.is_elemhide_allowlisted("http://x.example/", &chain, None));
        assert!(engine.is_generic_block_allowlisted("http://x.example/", &chain, None));
        assert!(!engine.is_document_allowlisted("http://x.example/", &["http://example.com/"], None));
    }

    #[test]
    fn test_element_hiding() {
        let engine = engine();
        for text in ["###testcase-eh-id", "example.org###testcase-eh-id", "example.org##.testcase-eh-class", "example.org#?#div:-abp-has(> .ad)"] {
            engine.add_filter(&engine.get_filter(text));
        }

        assert_eq!(
            engine.element_hiding_stylesheet("example.org", false),
            "#testcase-eh-id {display: none !important;}\n\
             #testcase-eh-id, .testcase-eh-class {display: none !important;}\n"
        );
        assert_eq!(engine.element_hiding_selectors("example.org", true), vec!["#testcase-eh-id", ".testcase-eh-class"]);
        assert_eq!(engine.element_hiding_emulation_selectors("example.org").len(), 1);

        engine
            .set_pref(prefs::ELEMHIDE_ENABLED, PrefValue::Bool(false))
            .expect("known pref");
        assert!(engine.element_hiding_selectors("example.org", false).is_empty());
        assert!(engine.element_hiding_emulation_selectors("example.org").is_empty());
    }

    #[test]
    fn test_page_element_hiding_honors_allowlisting() {
        let engine = engine();
        for text in ["###generic-ad", "example.org##.site-ad", "example.org#?#div:-abp-has(> .ad)", "@@||example.org^$elemhide", "@@||quiet.example^$generichide"] {
            engine.add_filter(&engine.get_filter(text));
        }
        let top: [&str; 0] = [];

        let page = "http://example.org/article";
        assert_eq!(engine.page_hiding_mode(page, &top, None, false), None);
        assert!(engine.page_element_hiding_selectors(page, "example.org", &top, None, false).is_empty());
        assert!(engine.page_element_hiding_stylesheet(page, "example.org", &top, None, false).is_empty());
        assert!(engine.page_element_hiding_emulation_selectors(page, "example.org", &top, None).is_empty());
        assert_eq!(engine.element_hiding_selectors("example.org", false).len(), 2);

        // a frame inside the allowlisted page inherits it
        let frame = "http://ads.example/frame";
        assert!(engine.page_element_hiding_selectors(frame, "ads.example", &[page], None, false).is_empty());
        assert_eq!(
            engine.page_element_hiding_selectors(frame, "ads.example", &["http://news.example/"], None, false),
            vec!["#generic-ad"]
        );

        let quiet = "http://quiet.example/";
        assert_eq!(engine.page_hiding_mode(quiet, &top, None, false), Some(true));
        assert!(engine.page_element_hiding_selectors(quiet, "quiet.example", &top, None, false).is_empty());
    }

    #[test]
    fn test_domain_allowlisting() {
        let engine = engine();
        engine.add_filter(&engine.get_filter("||ads.example^"));
        assert_eq!(
            domain_allowlisting_filter_text("mine.example"),
            "@@||mine.example^$document,domain=mine.example"
        );

        let script = ContentType::SCRIPT;
        let chain = ["http://mine.example/"];
        assert!(engine.check_request("http://ads.example/a.js", script, &chain, None).is_blocked());

        engine.add_domain_allowlisting_filter("mine.example");
        assert!(matches!(
            engine.check_request("http://ads.example/a.js", script, &chain, None),
            RequestDecision::Allowed(AllowReason::Document)
        ));
        assert!(engine
            .check_request("http://ads.example/a.js", script, &["http://other.example/"], None)
            .is_blocked());

        engine.init_allowlisted_domains(&["a.example", "b.example", "mine.example"]);
        assert_eq!(engine.list_allowlisted_domains(), vec!["mine.example", "a.example", "b.example"]);

        engine.remove_domain_allowlisting_filter("mine.example");
        assert_eq!(engine.list_allowlisted_domains(), vec!["a.example", "b.example"]);
        assert!(engine.check_request("http://ads.example/a.js", script, &chain, None).is_blocked());
    }

    #[test]
    fn test_disabled_engine_matches_nothing() {
        let engine = engine();
        for text in ["||ads.example^", "example.org##.ad"] {
            engine.add_filter(&engine.get_filter(text));
        }
        assert!(engine.is_enabled());

        engine.set_enabled(false);
        assert!(!engine.is_enabled());
        assert!(engine
            .matches::<&str>("http://ads.example/", ContentType::IMAGE, &[], None, false)
            .is_none());
        assert!(matches!(
            engine.check_request::<&str>("http://ads.example/", ContentType::IMAGE, &[], None),
            RequestDecision::NoMatch
        ));
        assert!(engine.element_hiding_selectors("example.org", false).is_empty());
        assert_eq!(engine.list_filters().len(), 2);

        engine.set_enabled(true);
        assert!(engine
            .check_request::<&str>("http://ads.example/", ContentType::IMAGE, &[], None)
            .is_blocked());
    }

    #[test]
    fn test_set_and_clear_subscriptions() {
        let engine = engine();
        let seen = record_events(&engine);
        let a = "https://lists.example/a.txt";
        let b = "https://lists.example/b.txt";
        let c = "https://lists.example/c.txt";

        engine.set_subscriptions(&[a, b]);
        engine.finish_download(b, "[Adblock Plus 2.0]\n||ads.example^\n", 10).expect("valid list");
        seen.lock().clear();

        engine.set_subscriptions(&[b, c]);
        let urls: Vec<String> = engine.list_subscriptions().into_iter().map(|sub| sub.url).collect();
        assert_eq!(urls, vec![b, c]);
        assert_eq!(*seen.lock(), vec!["subscription.removed", "subscription.added"]);
        assert_eq!(engine.subscription_filters(b).len(), 1);

        engine.clear_subscriptions();
        assert!(engine.list_subscriptions().is_empty());
        assert!(engine
            .matches::<&str>("http://ads.example/", ContentType::IMAGE, &[], None, false)
            .is_none());
    }

    #[test]
    fn test_prefs() {
        let engine = engine();
        assert!(matches!(
            engine.set_pref("nope", PrefValue::Bool(true)),
            Err(EngineError::UnknownPref(_))
        ));
        assert_eq!(engine.allowed_connection_type(), None);
        engine.set_allowed_connection_type(Some("wifi"));
        assert_eq!(engine.allowed_connection_type().as_deref(), Some("wifi"));
        engine.set_allowed_connection_type(None);
        assert_eq!(engine.allowed_connection_type(), None);
    }

    #[test]
    fn test_acceptable_ads() {
        let engine = engine();
        let url = engine.acceptable_ads_subscription_url().expect("default url");
        assert!(!engine.is_acceptable_ads_enabled());

        engine.set_acceptable_ads_enabled(true);
        assert!(engine.is_acceptable_ads_enabled());
        assert!(engine.get_subscription(&url).is_acceptable_ads);

        engine.set_subscription_disabled(&url, true);
        assert!(!engine.is_acceptable_ads_enabled());

        engine.set_acceptable_ads_enabled(false);
        assert!(!engine.is_acceptable_ads_enabled());
        assert!(engine.list_subscriptions().is_empty());

        engine
            .set_pref(prefs::ACCEPTABLE_ADS_URL, PrefValue::String("https://aa.example/".into()))
            .expect("known pref");
        assert!(engine.get_subscription("https://aa.example/").is_acceptable_ads);
        assert!(!engine.get_subscription(&url).is_acceptable_ads);
    }

    #[test]
    fn test_cached_list_loaded_on_listing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = EngineConfig {
            base_path: Some(dir.path().to_path_buf()),
            ..EngineConfig::default()
        };

        ListCache::new(dir.path())
            .store(LIST, "[Adblock Plus 2.0]\n||cached.example^\n", 50)
            .expect("store");

        let engine = FilterEngine::new(config, Arc::new(Offline)).expect("engine");
        engine.add_subscription(LIST);
        assert!(engine
            .matches::<&str>("http://cached.example/", ContentType::IMAGE, &[], None, false)
            .is_some());
        assert_eq!(engine.get_subscription(LIST).last_download, Some(50));
    }
}
