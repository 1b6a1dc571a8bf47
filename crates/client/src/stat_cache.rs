//! Metadata (stat) caching.
//!
//! The dispatcher resolves attributes through this cache rather than
//! hitting the backend on every `Getattr`. Entries live for the configured
//! TTL, with optional per-path overrides (inheritable to descendants).
//! Mutating operations invalidate the affected paths; an expired-entry
//! sweep runs at most once per cleanup interval, piggybacked on lookups.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use irods_fuse_common::config::MetadataCacheTimeoutSetting;
use irods_fuse_common::path::{has_path_prefix, normalize_path, path_parent};

use crate::types::Entry;

struct CachedEntry {
    entry: Entry,
    cached_at: Instant,
}

struct CacheState {
    entries: HashMap<String, CachedEntry>,
    last_cleanup: Instant,
}

/// TTL cache for `stat` results.
pub struct StatCache {
    state: Mutex<CacheState>,
    timeout: Duration,
    cleanup_time: Duration,
    overrides: Vec<MetadataCacheTimeoutSetting>,
}

impl StatCache {
    /// Create a cache.
    ///
    /// # Arguments
    /// * `timeout` - Default entry TTL
    /// * `cleanup_time` - Minimum interval between expiry sweeps
    /// * `overrides` - Per-path TTL overrides
    pub fn new(
        timeout: Duration,
        cleanup_time: Duration,
        overrides: Vec<MetadataCacheTimeoutSetting>,
    ) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                last_cleanup: Instant::now(),
            }),
            timeout,
            cleanup_time,
            overrides,
        }
    }

    /// TTL applicable to a path, honoring overrides.
    ///
    /// # Arguments
    /// * `path` - Absolute remote path
    fn timeout_for(&self, path: &str) -> Duration {
        let mut best: Option<&MetadataCacheTimeoutSetting> = None;
        for setting in &self.overrides {
            let applies: bool = if setting.inherit {
                has_path_prefix(path, &setting.path)
            } else {
                normalize_path(&setting.path) == normalize_path(path)
            };
            if applies {
                // deepest matching override wins
                let deeper: bool = best
                    .map(|b: &MetadataCacheTimeoutSetting| setting.path.len() > b.path.len())
                    .unwrap_or(true);
                if deeper {
                    best = Some(setting);
                }
            }
        }
        best.map(|s: &MetadataCacheTimeoutSetting| s.timeout)
            .unwrap_or(self.timeout)
    }

    /// Look up a cached entry, if present and fresh.
    ///
    /// # Arguments
    /// * `path` - Absolute remote path
    pub fn get(&self, path: &str) -> Option<Entry> {
        let path: String = normalize_path(path);
        let ttl: Duration = self.timeout_for(&path);
        let mut state = self.state.lock().unwrap();

        self.maybe_cleanup(&mut state);

        let cached: &CachedEntry = state.entries.get(&path)?;
        if cached.cached_at.elapsed() > ttl {
            state.entries.remove(&path);
            return None;
        }
        Some(state.entries.get(&path)?.entry.clone())
    }

    /// Insert or refresh an entry.
    ///
    /// # Arguments
    /// * `entry` - Entry to cache (keyed by its path)
    pub fn put(&self, entry: Entry) {
        let path: String = normalize_path(&entry.path);
        let mut state = self.state.lock().unwrap();
        state.entries.insert(
            path,
            CachedEntry {
                entry,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop a single path from the cache.
    ///
    /// # Arguments
    /// * `path` - Absolute remote path
    pub fn invalidate(&self, path: &str) {
        let path: String = normalize_path(path);
        self.state.lock().unwrap().entries.remove(&path);
    }

    /// Drop a path, everything beneath it, and its parent listing.
    ///
    /// # Arguments
    /// * `path` - Absolute remote path
    pub fn invalidate_tree(&self, path: &str) {
        let path: String = normalize_path(path);
        let parent: String = path_parent(&path);
        let mut state = self.state.lock().unwrap();
        state
            .entries
            .retain(|p: &String, _| !has_path_prefix(p, &path) && p != &parent);
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.state.lock().unwrap().entries.clear();
    }

    /// Number of cached entries (fresh or stale).
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    /// Check whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn maybe_cleanup(&self, state: &mut CacheState) {
        if state.last_cleanup.elapsed() < self.cleanup_time {
            return;
        }
        let timeout: Duration = self.timeout;
        state
            .entries
            .retain(|_, cached: &mut CachedEntry| cached.cached_at.elapsed() <= timeout);
        state.last_cleanup = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryKind;
    use std::time::SystemTime;

    fn entry(path: &str) -> Entry {
        Entry {
            id: 1,
            kind: EntryKind::File,
            name: irods_fuse_common::path::path_name(path),
            path: path.to_string(),
            owner: "rods".to_string(),
            size: 0,
            create_time: SystemTime::now(),
            modify_time: SystemTime::now(),
            checksum: None,
        }
    }

    #[test]
    fn test_put_get_invalidate() {
        let cache: StatCache = StatCache::new(
            Duration::from_secs(60),
            Duration::from_secs(60),
            Vec::new(),
        );

        cache.put(entry("/z/f"));
        assert!(cache.get("/z/f").is_some());

        cache.invalidate("/z/f");
        assert!(cache.get("/z/f").is_none());
    }

    #[test]
    fn test_expiry() {
        let cache: StatCache = StatCache::new(
            Duration::from_millis(0),
            Duration::from_secs(60),
            Vec::new(),
        );
        cache.put(entry("/z/f"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("/z/f").is_none());
    }

    #[test]
    fn test_override_applies_to_subtree_when_inherit() {
        let overrides: Vec<MetadataCacheTimeoutSetting> = vec![MetadataCacheTimeoutSetting {
            path: "/z/fast".to_string(),
            timeout: Duration::from_millis(0),
            inherit: true,
        }];
        let cache: StatCache = StatCache::new(
            Duration::from_secs(60),
            Duration::from_secs(60),
            overrides,
        );

        cache.put(entry("/z/fast/f"));
        cache.put(entry("/z/slow/f"));
        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.get("/z/fast/f").is_none());
        assert!(cache.get("/z/slow/f").is_some());
    }

    #[test]
    fn test_invalidate_tree_takes_parent() {
        let cache: StatCache = StatCache::new(
            Duration::from_secs(60),
            Duration::from_secs(60),
            Vec::new(),
        );
        cache.put(entry("/z/dir"));
        cache.put(entry("/z/dir/a"));
        cache.put(entry("/z/dir/a/b"));
        cache.put(entry("/z/other"));
        cache.put(entry("/z"));

        cache.invalidate_tree("/z/dir/a");

        assert!(cache.get("/z/dir/a").is_none());
        assert!(cache.get("/z/dir/a/b").is_none());
        // parent dropped so listings refresh
        assert!(cache.get("/z/dir").is_none());
        assert!(cache.get("/z/other").is_some());
    }
}
