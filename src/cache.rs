//! Freshness cache for backfill runs.
//!
//! By default the backfill treats an image as done when any of its
//! derivatives exists. That misses one case: a source replaced in place under
//! the same filename keeps its old derivatives forever. With
//! `verify_source_hash` enabled, the backfill also consults this cache and
//! regenerates when the recorded hashes no longer match.
//!
//! ## Cache keys
//!
//! Entries are keyed by the source path relative to the uploads base, so the
//! cache survives moving the uploads directory between hosts.
//!
//! - **`source_hash`**: SHA-256 of the source file contents. Content-based
//!   rather than mtime-based so it survives restores from backup (which reset
//!   modification times).
//! - **`catalog_hash`**: SHA-256 of the preset catalog and quality policy.
//!   Adding or resizing a preset, or retuning a quality, changes it and every
//!   image is regenerated on the next verified run.
//!
//! A fresh entry requires both hashes to match. Each entry also records how
//! many derivatives the last generate wrote, so a source smaller than every
//! preset (zero derivatives, nothing on disk to find) is still recognized as
//! done.
//!
//! ## Storage
//!
//! The cache is a JSON file at `<uploads base>/.derivatives-cache.json`.
//! Missing, corrupt, or version-mismatched files load as empty, which only
//! costs a regeneration.

use crate::derivatives::GeneratorConfig;
use crate::presets::catalog_fingerprint;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the cache file within the uploads base directory.
const CACHE_FILENAME: &str = ".derivatives-cache.json";

/// Bump to invalidate every existing cache when the key computation changes.
const CACHE_VERSION: u32 = 2;

/// Hashes recorded for one source after a successful generate.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub source_hash: String,
    pub catalog_hash: String,
    pub derivatives: usize,
}

/// On-disk record of which sources were generated from which content.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FreshnessCache {
    pub version: u32,
    pub entries: BTreeMap<String, CacheEntry>,
}

impl FreshnessCache {
    pub fn empty() -> Self {
        Self {
            version: CACHE_VERSION,
            entries: BTreeMap::new(),
        }
    }

    /// Load from the uploads base directory. Returns an empty cache if the
    /// file doesn't exist or can't be parsed.
    pub fn load(base: &Path) -> Self {
        let path = cache_path(base);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let cache: Self = match serde_json::from_str(&content) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt freshness cache");
                return Self::empty();
            }
        };
        if cache.version != CACHE_VERSION {
            tracing::info!(found = cache.version, expected = CACHE_VERSION, "freshness cache version changed, starting empty");
            return Self::empty();
        }
        cache
    }

    pub fn save(&self, base: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(cache_path(base), json)
    }

    /// The entry for `key` if it was last generated from exactly this
    /// content and catalog.
    pub fn fresh_entry(
        &self,
        key: &str,
        source_hash: &str,
        catalog_hash: &str,
    ) -> Option<&CacheEntry> {
        self.entries
            .get(key)
            .filter(|e| e.source_hash == source_hash && e.catalog_hash == catalog_hash)
    }

    pub fn record(&mut self, key: String, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// SHA-256 over the preset catalog fingerprint and the quality policy.
pub fn catalog_hash(config: &GeneratorConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"derivatives\0");
    hasher.update(catalog_fingerprint(&config.presets).as_bytes());
    hasher.update(config.quality.avif.value().to_le_bytes());
    hasher.update(config.quality.webp.value().to_le_bytes());
    hasher.update(config.quality.jpeg.value().to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolve the cache file path for an uploads base directory.
pub fn cache_path(base: &Path) -> PathBuf {
    base.join(CACHE_FILENAME)
}
