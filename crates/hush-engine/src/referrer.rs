//! URL → referrer bookkeeping for building document chains

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::Mutex;

/// Entries kept by [`ReferrerMap::new`].
pub const DEFAULT_MAX_REFERRERS: usize = 1000;

#[derive(Debug, Default)]
struct Entries {
    referrers: HashMap<String, String>,
    /// Insertion order, oldest first
    order: VecDeque<String>,
}

/// Records which document loaded which URL.
///
/// Holds at most `max_entries` urls; the oldest recorded url is forgotten
/// first.
#[derive(Debug)]
pub struct ReferrerMap {
    entries: Mutex<Entries>,
    max_chain: usize,
    max_entries: usize,
}

impl ReferrerMap {
    pub fn new(max_chain: usize) -> Self {
        Self::with_capacity(max_chain, DEFAULT_MAX_REFERRERS)
    }

    pub fn with_capacity(max_chain: usize, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            max_chain,
            max_entries: max_entries.max(1),
        }
    }

    /// Remember that `url` was requested by `referrer`. Self references are
    /// ignored.
    pub fn add(&self, url: &str, referrer: &str) {
        if url == referrer || referrer.is_empty() {
            log::debug!("Ignoring referrer '{}' for '{}'", referrer, url);
            return;
        }

        let mut entries = self.entries.lock();
        if entries.referrers.insert(url.to_string(), referrer.to_string()).is_some() {
            return;
        }
        entries.order.push_back(url.to_string());

        while entries.order.len() > self.max_entries {
            if let Some(oldest) = entries.order.pop_front() {
                entries.referrers.remove(&oldest);
                log::trace!("Forgot referrer of '{}'", oldest);
            }
        }
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.referrers.clear();
        entries.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().referrers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().referrers.is_empty()
    }

    /// Document chain for `url`, from its immediate parent to the top frame.
    ///
    /// A cycle or an overlong chain ends the walk.
    pub fn build_chain(&self, url: &str) -> Vec<String> {
        let entries = self.entries.lock();
        let referrers = &entries.referrers;
        let mut chain = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        seen.insert(url);

        let mut current = url;
        while let Some(parent) = referrers.get(current) {
            if !seen.insert(parent.as_str()) {
                log::debug!("Referrer loop at '{}', chain truncated", parent);
                break;
            }
            if chain.len() >= self.max_chain {
                log::debug!("Referrer chain for '{}' truncated at {} entries", url, self.max_chain);
                break;
            }
            chain.push(parent.clone());
            current = parent;
        }
        chain
    }
}
