//! Site key verification
//!
//! Pages prove ownership of a key with an `X-Adblock-Key: <key>_<signature>`
//! header. The signature covers `path?query \0 host \0 user-agent`. Verified
//! keys are remembered per URL and offered to the matcher.

use std::collections::HashMap;
use std::sync::Arc;

use hush_core::url::{get_host_position, get_scheme_end};
use parking_lot::Mutex;

pub const SITEKEY_HEADER: &str = "X-Adblock-Key";

#[derive(Debug, thiserror::Error)]
pub enum SiteKeyError {
    #[error("Expected '<key>_<signature>', got {0} parts")]
    Malformed(usize),
    #[error("Cannot extract host from '{0}'")]
    InvalidUrl(String),
    #[error("Signature check failed: {0}")]
    Verification(String),
}

/// Cryptographic check of a signature, provided by the host application.
pub trait SignatureVerifier: Send + Sync {
    /// Keys and signatures are base64 as sent in the header.
    fn verify(&self, public_key: &str, data: &[u8], signature: &str) -> Result<bool, SiteKeyError>;
}

pub struct SiteKeyVerifier {
    verifier: Arc<dyn SignatureVerifier>,
    keys: Mutex<HashMap<String, String>>,
}

impl SiteKeyVerifier {
    pub fn new(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            verifier,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Verify a header value and remember the key for `url` on success.
    pub fn verify(&self, url: &str, user_agent: Option<&str>, value: &str) -> Result<bool, SiteKeyError> {
        let parts: Vec<&str> = value.split('_').collect();
        let [public_key, signature] = parts.as_slice() else {
            return Err(SiteKeyError::Malformed(parts.len()));
        };

        let url = strip_fragment(url);
        let data = signed_data(url, user_agent.unwrap_or_default())?;
        if !self.verifier.verify(public_key, &data, signature)? {
            return Ok(false);
        }

        self.keys.lock().insert(url.to_string(), public_key.to_string());
        Ok(true)
    }

    /// Like [`verify`](Self::verify), but failures only log and count as no key.
    pub fn verify_header(&self, url: &str, user_agent: Option<&str>, value: &str) -> bool {
        match self.verify(url, user_agent, value) {
            Ok(true) => {
                log::debug!("Site key for {} verified", url);
                true
            }
            Ok(false) => {
                log::warn!("Site key for {} did not verify", url);
                false
            }
            Err(err) => {
                log::warn!("Failed to verify site key for {}: {}", url, err);
                false
            }
        }
    }

    /// Key verified for any document of `chain`, without base64 padding.
    pub fn key_for_chain<S: AsRef<str>>(&self, chain: &[S]) -> Option<String> {
        let keys = self.keys.lock();
        chain
            .iter()
            .find_map(|url| keys.get(strip_fragment(url.as_ref())))
            .map(|key| strip_padding(key).to_string())
    }

    pub fn clear(&self) {
        self.keys.lock().clear();
    }
}

impl std::fmt::Debug for SiteKeyVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteKeyVerifier")
            .field("keys", &self.keys.lock().len())
            .finish()
    }
}

fn strip_fragment(url: &str) -> &str {
    url.split('#').next().unwrap_or(url)
}

pub fn strip_padding(key: &str) -> &str {
    key.trim_end_matches('=')
}

/// `path?query \0 authority \0 user-agent`
fn signed_data(url: &str, user_agent: &str) -> Result<Vec<u8>, SiteKeyError> {
    let invalid = || SiteKeyError::InvalidUrl(url.to_string());
    let scheme_end = get_scheme_end(url).ok_or_else(invalid)?;
    let (host_start, _) = get_host_position(url).ok_or_else(invalid)?;
    if host_start >= url.len() {
        return Err(invalid());
    }

    let authority_end = url[scheme_end..]
        .find(|c: char| c == '/' || c == '?')
        .map_or(url.len(), |i| scheme_end + i);
    let authority = &url[host_start..authority_end];
    if authority.is_empty() {
        return Err(invalid());
    }

    let rest = &url[authority_end..];
    let path_and_query = if rest.is_empty() || rest.starts_with('?') {
        format!("/{rest}")
    } else {
        rest.to_string()
    };

    let mut data = Vec::with_capacity(path_and_query.len() + authority.len() + user_agent.len() + 2);
    data.extend_from_slice(path_and_query.as_bytes());
    data.push(0);
    data.extend_from_slice(authority.as_bytes());
    data.push(0);
    data.extend_from_slice(user_agent.as_bytes());
    Ok(data)
}
