//! hush Engine
//!
//! Thread-safe handle around the rule store: filter and subscription
//! management, change events, preferences, list downloads and caching.
//!
//! # Modules
//!
//! - `engine`: [`FilterEngine`], the locked store and its public operations
//! - `sync`: Subscription downloads through a host [`WebRequest`]
//! - `cache`: CRC-checked on-disk list cache
//! - `events`: Filter change listeners
//! - `prefs`: Typed preference map
//! - `config`: JSON engine configuration
//! - `provider`: Reference-counted engine lifetime
//! - `job`: Selector computation on a worker thread
//! - `referrer`: Referrer chain tracking
//! - `sitekey`: Site key header verification

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod job;
pub mod prefs;
pub mod provider;
pub mod referrer;
pub mod sitekey;
pub mod sync;

pub use cache::{CachedList, ListCache};
pub use config::EngineConfig;
pub use engine::{domain_allowlisting_filter_text, AllowReason, FilterEngine, RequestDecision};
pub use error::{CacheError, EngineError, FetchError};
pub use events::{FilterChangeEvent, FilterChangeListener, ListenerId};
pub use job::SelectorJob;
pub use prefs::{PrefValue, Preferences};
pub use provider::EngineProvider;
pub use referrer::ReferrerMap;
pub use sitekey::{SignatureVerifier, SiteKeyError, SiteKeyVerifier};
pub use sync::{ConnectionGate, WebRequest};

pub use hush_core::url::host_from_url;
