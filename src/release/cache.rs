//! Release cache
//!
//! Keeps the last successful lookup for one hour so the registry is asked at
//! most once per hour. A `moka` cache answers repeated lookups within one
//! process; a JSON file (`~/.cache/slugshot/release.json`) carries the entry
//! across invocations. Failed lookups are never cached.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::ReleaseDescriptor;
use super::registry::ReleaseSource;

/// How long a fetched release stays fresh
pub const RELEASE_TTL: Duration = Duration::from_secs(60 * 60);

const ENTRY_VERSION: u32 = 1;

/// On-disk form of a cached release
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    release: ReleaseDescriptor,
    fetched_at: DateTime<Utc>,
    /// Version for invalidation on format changes
    version: u32,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let Ok(ttl) = ChronoDuration::from_std(ttl) else {
            return false;
        };
        let age = now.signed_duration_since(self.fetched_at);
        age >= ChronoDuration::zero() && age < ttl
    }
}

/// A [`ReleaseSource`] that remembers successful lookups of another source
pub struct ReleaseCache<S> {
    source: S,
    memory: Cache<(), CacheEntry>,
    file: Option<PathBuf>,
    ttl: Duration,
}

impl<S: ReleaseSource> ReleaseCache<S> {
    /// Cache lookups of `source` in memory and, if given, in `file`
    #[must_use]
    pub fn new(source: S, file: Option<PathBuf>) -> Self {
        Self::with_ttl(source, file, RELEASE_TTL)
    }

    #[must_use]
    pub fn with_ttl(source: S, file: Option<PathBuf>, ttl: Duration) -> Self {
        let memory = Cache::builder().time_to_live(ttl).max_capacity(1).build();
        Self {
            source,
            memory,
            file,
            ttl,
        }
    }

    /// Drop the cached release from memory and disk
    pub fn invalidate(&self) {
        self.memory.invalidate_all();
        if let Some(path) = &self.file {
            let _ = std::fs::remove_file(path);
        }
    }

    /// The cached release if still fresh, without asking the source
    ///
    /// Freshness is measured from when the release was fetched, also for
    /// entries loaded from disk into memory.
    #[must_use]
    pub fn cached(&self) -> Option<ReleaseDescriptor> {
        let now = Utc::now();
        if let Some(entry) = self.memory.get(&()) {
            if entry.is_fresh(self.ttl, now) {
                return Some(entry.release);
            }
            self.memory.invalidate(&());
        }

        let entry = self.load_entry()?;
        if !entry.is_fresh(self.ttl, now) {
            return None;
        }
        self.memory.insert((), entry.clone());
        Some(entry.release)
    }

    fn load_entry(&self) -> Option<CacheEntry> {
        let data = std::fs::read(self.file.as_ref()?).ok()?;
        serde_json::from_slice::<CacheEntry>(&data)
            .ok()
            .filter(|entry| entry.version == ENTRY_VERSION)
    }

    /// Best-effort: a cache that cannot be written only costs an extra lookup
    fn store_entry(&self, entry: &CacheEntry) {
        let Some(path) = &self.file else {
            return;
        };
        let written = path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| {
                serde_json::to_vec_pretty(entry)
                    .map_err(std::io::Error::other)
                    .and_then(|data| std::fs::write(path, data))
            });
        if let Err(e) = written {
            debug!("could not persist release cache: {e}");
        }
    }
}

impl<S: ReleaseSource> ReleaseSource for ReleaseCache<S> {
    fn latest(&self) -> Option<ReleaseDescriptor> {
        if let Some(release) = self.cached() {
            return Some(release);
        }

        let release = self.source.latest()?;
        let entry = CacheEntry {
            release: release.clone(),
            fetched_at: Utc::now(),
            version: ENTRY_VERSION,
        };
        self.store_entry(&entry);
        self.memory.insert((), entry);
        Some(release)
    }
}
