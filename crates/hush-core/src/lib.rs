//! hush Core Library
//!
//! This crate provides the data model and the match engine for Adblock Plus
//! style filter lists.
//!
//! # Architecture
//!
//! Compiled [`Filter`]s live in a [`RuleStore`], which keeps the custom filters
//! and subscription lists and indexes the active set. Network requests are
//! decided by the keyword-indexed [`Matcher`]; element hiding selectors come
//! from the [`ElemHideIndex`]. Both only read the store.
//!
//! # Modules
//!
//! - `hash`: Murmur3 hashing for tokens, cache keys and CRC32 framing
//! - `psl`: Public Suffix List for eTLD+1 extraction and third-party checks
//! - `url`: Fast URL helpers without full parsing
//! - `pattern`: Glob and regex URL patterns
//! - `filter`: Compiled filter model
//! - `matcher`: Core request matching engine
//! - `elemhide`: Element hiding selector resolver
//! - `subscription`: Subscription records and list metadata
//! - `store`: Rule store and change events
//! - `types`: Shared type definitions

pub mod elemhide;
pub mod filter;
pub mod hash;
pub mod matcher;
pub mod pattern;
pub mod psl;
pub mod store;
pub mod subscription;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use elemhide::{CancelFlag, ElemHideIndex, ElemHideSelectors};
pub use filter::{DomainMap, Filter, FilterError};
pub use hash::{cache_key, crc32, hash_token};
pub use matcher::Matcher;
pub use psl::{get_etld1, is_third_party};
pub use store::{EventAction, RuleStore, StoreEvent};
pub use subscription::{ListMetadata, Subscription, SyncStatus};
pub use types::{ContentType, EmulationSelector, FilterType, PartyMask, RequestContext};
pub use url::host_from_url;
