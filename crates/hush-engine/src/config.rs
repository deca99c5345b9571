//! Engine configuration
//!
//! Loaded from JSON; every field has a default so a partial file is fine.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::prefs::PrefValue;
use crate::referrer::DEFAULT_MAX_REFERRERS;

pub const DEFAULT_ACCEPTABLE_ADS_URL: &str = "https://easylist-downloads.adblockplus.org/exceptionrules.txt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory for cached list bodies; no caching when unset
    pub base_path: Option<PathBuf>,
    /// `public_suffix_list.dat` to load at startup
    pub psl_path: Option<PathBuf>,
    pub acceptable_ads_url: String,
    pub download_timeout_secs: u64,
    /// Longest referrer chain built for a request
    pub max_referrer_chain: usize,
    /// Urls remembered by a referrer map before the oldest is dropped
    pub max_referrer_entries: usize,
    pub elemhide_enabled: bool,
    /// Initial preference values, applied over the defaults
    pub prefs: BTreeMap<String, PrefValue>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_path: None,
            psl_path: None,
            acceptable_ads_url: DEFAULT_ACCEPTABLE_ADS_URL.to_string(),
            download_timeout_secs: 30,
            max_referrer_chain: 32,
            max_referrer_entries: DEFAULT_MAX_REFERRERS,
            elemhide_enabled: true,
            prefs: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        log::debug!("Loaded engine config from {}", path.display());
        Ok(config)
    }
}
