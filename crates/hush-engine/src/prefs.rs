//! Typed engine preferences
//!
//! Only known preferences can be set, and a value must keep its type.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::EngineError;

pub const ALLOWED_CONNECTION_TYPE: &str = "allowed_connection_type";
pub const ACCEPTABLE_ADS_URL: &str = "subscriptions_exceptionsurl";
pub const AUTO_UPDATE: &str = "subscriptions_autoupdate";
pub const ELEMHIDE_ENABLED: &str = "elemhide_enabled";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl PrefValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::String(_) => "string",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for PrefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    values: BTreeMap<String, PrefValue>,
}

impl Preferences {
    /// Defaults derived from `config`, then the config's own overrides.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let defaults = [
            (ALLOWED_CONNECTION_TYPE, PrefValue::String(String::new())),
            (ACCEPTABLE_ADS_URL, PrefValue::String(config.acceptable_ads_url.clone())),
            (AUTO_UPDATE, PrefValue::Bool(true)),
            (ELEMHIDE_ENABLED, PrefValue::Bool(config.elemhide_enabled)),
        ];
        let mut prefs = Self {
            values: defaults
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        };
        for (name, value) in &config.prefs {
            prefs.set(name, value.clone())?;
        }
        Ok(prefs)
    }

    pub fn get(&self, name: &str) -> Option<&PrefValue> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: &str, value: PrefValue) -> Result<(), EngineError> {
        let current = self
            .values
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownPref(name.to_string()))?;
        if std::mem::discriminant(current) != std::mem::discriminant(&value) {
            return Err(EngineError::PrefType {
                name: name.to_string(),
                expected: current.type_name(),
            });
        }
        *current = value;
        Ok(())
    }

    pub fn get_bool(&self, name: &str) -> bool {
        self.get(name).and_then(PrefValue::as_bool).unwrap_or(false)
    }

    /// String preference, `None` when unset or empty.
    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(PrefValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PrefValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
