//! On-disk cache of downloaded list bodies
//!
//! One file per subscription, named by a hash of its URL. Layout:
//!
//! ```text
//! magic "HUSH" | saved_at u64 LE | crc32 u32 LE | length u32 LE | body
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use hush_core::hash::{cache_key, crc32};

use crate::error::CacheError;

const MAGIC: &[u8; 4] = b"HUSH";
const HEADER_LEN: usize = 4 + 8 + 4 + 4;

/// A cached list body and the time it was downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedList {
    pub saved_at: u64,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct ListCache {
    dir: PathBuf,
}

impl ListCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.list", cache_key(url)))
    }

    pub fn store(&self, url: &str, body: &str, saved_at: u64) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;

        let body_len = u32::try_from(body.len()).map_err(|_| CacheError::Truncated)?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&saved_at.to_le_bytes());
        bytes.extend_from_slice(&crc32(body.as_bytes()).to_le_bytes());
        bytes.extend_from_slice(&body_len.to_le_bytes());
        bytes.extend_from_slice(body.as_bytes());

        // Write then rename so readers never see a partial file
        let path = self.path_for(url);
        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;

        log::debug!("Cached {} bytes for {} at {}", body.len(), url, path.display());
        Ok(())
    }

    /// Load a cached body. A missing file is `Ok(None)`.
    pub fn load(&self, url: &str) -> Result<Option<CachedList>, CacheError> {
        let bytes = match fs::read(self.path_for(url)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        decode(&bytes).map(Some)
    }

    pub fn remove(&self, url: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.path_for(url)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn read_u64(bytes: &[u8], offset: usize) -> Option<u64> {
    let raw: [u8; 8] = bytes.get(offset..offset + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(raw))
}

fn decode(bytes: &[u8]) -> Result<CachedList, CacheError> {
    if bytes.len() < HEADER_LEN {
        return Err(CacheError::Truncated);
    }
    if &bytes[..4] != MAGIC {
        return Err(CacheError::BadMagic);
    }

    let saved_at = read_u64(bytes, 4).ok_or(CacheError::Truncated)?;
    let expected = read_u32(bytes, 12).ok_or(CacheError::Truncated)?;
    let len = read_u32(bytes, 16).ok_or(CacheError::Truncated)? as usize;

    let body = bytes.get(HEADER_LEN..HEADER_LEN + len).ok_or(CacheError::Truncated)?;
    let actual = crc32(body);
    if actual != expected {
        return Err(CacheError::Checksum { expected, actual });
    }

    let body = String::from_utf8(body.to_vec()).map_err(|_| CacheError::Encoding)?;
    Ok(CachedList { saved_at, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://lists.example/easylist.txt";

    #[test]
    fn test_store_and_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = ListCache::new(dir.path().join("lists"));

        assert_eq!(cache.load(URL).expect("load"), None);
        cache.store(URL, "[Adblock Plus 2.0]\n||ads.example^\n", 42).expect("store");

        let cached = cache.load(URL).expect("load").expect("cached");
        assert_eq!(cached.saved_at, 42);
        assert!(cached.body.ends_with("||ads.example^\n"));

        cache.remove(URL).expect("remove");
        cache.remove(URL).expect("remove twice");
        assert_eq!(cache.load(URL).expect("load"), None);
    }

    #[test]
    fn test_corruption_is_detected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = ListCache::new(dir.path());
        cache.store(URL, "[Adblock Plus 2.0]\nfoo\n", 1).expect("store");

        let path = cache.path_for(URL);
        let mut bytes = fs::read(&path).expect("read");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, &bytes).expect("write");
        assert!(matches!(cache.load(URL), Err(CacheError::Checksum { .. })));

        fs::write(&path, &bytes[..10]).expect("write");
        assert!(matches!(cache.load(URL), Err(CacheError::Truncated)));

        fs::write(&path, b"NOPE0000000000000000").expect("write");
        assert!(matches!(cache.load(URL), Err(CacheError::BadMagic)));
    }

    #[test]
    fn test_distinct_urls_distinct_files() {
        let cache = ListCache::new("/tmp");
        assert_ne!(cache.path_for("https://a.example/"), cache.path_for("https://b.example/"));
    }
}
