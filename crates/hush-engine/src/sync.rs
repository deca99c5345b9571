//! Subscription downloads
//!
//! Fetching is delegated to a host-supplied [`WebRequest`]. The blocking call
//! runs on tokio's blocking pool so the store stays usable while a list
//! is in flight.

use std::sync::Arc;
use std::time::Duration;

use hush_core::subscription::SyncStatus;

use crate::engine::{now_secs, FilterEngine};
use crate::error::{EngineError, FetchError};
use crate::prefs;

/// Blocking HTTP GET supplied by the host.
pub trait WebRequest: Send + Sync {
    fn get(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}

/// Decides whether a download may use the current connection.
pub trait ConnectionGate: Send + Sync {
    /// `allowed_type` is the `allowed_connection_type` preference, if set.
    fn is_connection_allowed(&self, allowed_type: Option<&str>) -> bool;
}

impl<F> ConnectionGate for F
where
    F: Fn(Option<&str>) -> bool + Send + Sync,
{
    fn is_connection_allowed(&self, allowed_type: Option<&str>) -> bool {
        self(allowed_type)
    }
}

/// Marks an update as failed if its future is dropped before the download
/// settles, so the subscription does not stay `SynchronizeInProgress`.
struct UpdateGuard<'a> {
    engine: &'a FilterEngine,
    url: &'a str,
    armed: bool,
}

impl<'a> UpdateGuard<'a> {
    fn new(engine: &'a FilterEngine, url: &'a str) -> Self {
        Self { engine, url, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            log::warn!("Update of '{}' abandoned before the download finished", self.url);
            self.engine
                .set_sync_status(self.url, SyncStatus::SynchronizeConnectionError);
        }
    }
}

impl FilterEngine {
    /// Download a subscription and install its filters.
    ///
    /// On a fetch failure the status becomes `SynchronizeConnectionError` and
    /// the previously installed filters stay active. Dropping the future
    /// mid-download has the same effect.
    pub async fn update_subscription(&self, url: &str) -> Result<(), EngineError> {
        if let Some(gate) = &self.connection_gate {
            let allowed_type = self.allowed_connection_type();
            if !gate.is_connection_allowed(allowed_type.as_deref()) {
                log::info!("Skipping update of '{}': connection not allowed", url);
                return Err(FetchError::ConnectionNotAllowed(allowed_type.unwrap_or_default()).into());
            }
        }

        let started = self.mutate(|store| {
            if store.get_subscription(url).is_updating() {
                return (false, Vec::new());
            }
            let events = store.set_synchronization_status(url, SyncStatus::SynchronizeInProgress);
            (true, events.into_iter().collect())
        });
        if !started {
            return Err(EngineError::AlreadyUpdating(url.to_string()));
        }

        let guard = UpdateGuard::new(self, url);
        log::info!("Downloading subscription '{}'", url);
        let fetcher = Arc::clone(&self.web_request);
        let target = url.to_string();
        let timeout = Duration::from_secs(self.config.download_timeout_secs);

        let fetched = tokio::task::spawn_blocking(move || fetcher.get(&target, timeout))
            .await
            .map_err(|err| FetchError::Task(err.to_string()))
            .and_then(|result| result);
        guard.disarm();

        match fetched {
            Ok(body) => self.finish_download(url, &body, now_secs()),
            Err(err) => {
                log::warn!("Download of '{}' failed: {}", url, err);
                self.set_sync_status(url, SyncStatus::SynchronizeConnectionError);
                Err(err.into())
            }
        }
    }

    /// Update every listed subscription whose list has expired.
    ///
    /// Returns the number of lists refreshed. Does nothing while the
    /// `subscriptions_autoupdate` preference is off.
    pub async fn update_due_subscriptions(&self) -> usize {
        let auto_update = self
            .get_pref(prefs::AUTO_UPDATE)
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        if !auto_update {
            log::debug!("Automatic updates disabled");
            return 0;
        }

        let now = now_secs();
        let due: Vec<String> = self
            .list_subscriptions()
            .into_iter()
            .filter(|sub| sub.is_due(now))
            .map(|sub| sub.url)
            .collect();

        let mut updated = 0;
        for url in &due {
            match self.update_subscription(url).await {
                Ok(()) => updated += 1,
                Err(err) => log::warn!("Update of '{}' failed: {}", url, err),
            }
        }
        log::info!("Updated {}/{} due subscriptions", updated, due.len());
        updated
    }
}
