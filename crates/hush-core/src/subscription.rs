//! Subscription records and list metadata

use serde::{Deserialize, Serialize};

/// Validity assumed for lists that carry no `! Expires:` header (5 days).
pub const DEFAULT_EXPIRATION_SECS: u64 = 5 * 24 * 60 * 60;

/// Lower bound for an `! Expires:` header (1 hour).
pub const MIN_EXPIRATION_SECS: u64 = 60 * 60;

/// Upper bound for an `! Expires:` header (14 days).
pub const MAX_EXPIRATION_SECS: u64 = 14 * 24 * 60 * 60;

// =============================================================================
// Synchronization Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    None,
    SynchronizeInProgress,
    SynchronizeOk,
    SynchronizeConnectionError,
    SynchronizeInvalidData,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SynchronizeInProgress => "synchronize_in_progress",
            Self::SynchronizeOk => "synchronize_ok",
            Self::SynchronizeConnectionError => "synchronize_connection_error",
            Self::SynchronizeInvalidData => "synchronize_invalid_data",
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, Self::SynchronizeConnectionError | Self::SynchronizeInvalidData)
    }
}

// =============================================================================
// List Metadata
// =============================================================================

/// Header comments of a downloaded list (`! Title: ...` and friends).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMetadata {
    pub title: Option<String>,
    pub homepage: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
    /// Validity in seconds as written in the list
    pub expires: Option<u64>,
    pub languages: Vec<String>,
}

// =============================================================================
// Subscription
// =============================================================================

/// Value snapshot of a subscription. The store owns the live record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub url: String,
    pub title: String,
    pub homepage: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
    /// Unix time after which the list should be refreshed
    pub expires: Option<u64>,
    pub languages: Vec<String>,
    pub disabled: bool,
    pub listed: bool,
    pub synchronization_status: SyncStatus,
    /// Unix time of the last successful download
    pub last_download: Option<u64>,
    pub error_count: u32,
    pub filter_count: usize,
    pub is_acceptable_ads: bool,
}

impl Subscription {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            title: url.clone(),
            url,
            homepage: None,
            author: None,
            version: None,
            expires: None,
            languages: Vec::new(),
            disabled: false,
            listed: false,
            synchronization_status: SyncStatus::None,
            last_download: None,
            error_count: 0,
            filter_count: 0,
            is_acceptable_ads: false,
        }
    }

    pub fn is_updating(&self) -> bool {
        self.synchronization_status == SyncStatus::SynchronizeInProgress
    }

    /// Listed and enabled subscriptions contribute filters to matching.
    pub fn is_contributing(&self) -> bool {
        self.listed && !self.disabled
    }

    /// Should a background update refresh this list at `now`?
    pub fn is_due(&self, now: u64) -> bool {
        if !self.listed || self.is_updating() {
            return false;
        }
        if self.last_download.is_none() || self.synchronization_status.is_error() {
            return true;
        }
        self.expires.map_or(true, |expires| now >= expires)
    }

    /// Apply downloaded metadata. Returns true when the title changed.
    pub(crate) fn apply_metadata(&mut self, metadata: &ListMetadata, now: u64) -> bool {
        let mut title_changed = false;
        if let Some(title) = &metadata.title {
            title_changed = *title != self.title;
            self.title = title.clone();
        }
        self.homepage = metadata.homepage.clone();
        self.author = metadata.author.clone();
        self.version = metadata.version.clone();
        self.languages = metadata.languages.clone();

        let validity = metadata
            .expires
            .unwrap_or(DEFAULT_EXPIRATION_SECS)
            .clamp(MIN_EXPIRATION_SECS, MAX_EXPIRATION_SECS);
        self.expires = Some(now.saturating_add(validity));
        self.last_download = Some(now);
        title_changed
    }
}
