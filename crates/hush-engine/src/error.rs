//! Engine error types

use std::io;

/// Subscription download failures.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Connection type '{0}' is not allowed")]
    ConnectionNotAllowed(String),
    #[error("Server responded with HTTP {0}")]
    Status(u16),
    #[error("Download timed out")]
    Timeout,
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Download task failed: {0}")]
    Task(String),
}

/// List cache failures.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Cache file has bad magic")]
    BadMagic,
    #[error("Cache file is truncated")]
    Truncated,
    #[error("Cache checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    Checksum { expected: u32, actual: u32 },
    #[error("Cached list is not valid UTF-8")]
    Encoding,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown preference: {0}")]
    UnknownPref(String),
    #[error("Preference '{name}' expects a {expected} value")]
    PrefType { name: String, expected: &'static str },
    #[error("Subscription '{0}' returned an invalid filter list")]
    InvalidList(String),
    #[error("Subscription '{0}' is already updating")]
    AlreadyUpdating(String),
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("Engine was not retained before waiting for it")]
    NotRetained,
    #[error("Engine creation failed: {0}")]
    Creation(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
