//! Persisted LRU cache of k-best decodes, keyed by the looked-up word and
//! `k` together (spec.md §4.4: "keyed by `word` (and parametrized by
//! `k`)") — a persisted cache outlives any one run, so a later run asking
//! for a different `k` against the same file must not get back an entry
//! sized for the old one.
//! Grounded on `original_source/CorrectOCR/_cache.py`'s `PickledLRUCache`
//! (dirty flag, save-only-if-touched, tolerate a missing/corrupt file) and
//! on the teacher's `core/src/engine.rs` (`RefCell<lru::LruCache<..>>`,
//! hit/miss counters, cache-then-compute-then-cache shape).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use lru::LruCache;

use crate::error::Result;
use crate::token::KBestItem;

/// One word's k-best map, the unit the decoder caches.
pub type KBest = BTreeMap<u32, KBestItem>;

/// Disk-backed LRU cache. Unlike the HMM parameter file, this format is
/// private and explicitly allowed to be lossy or rebuilt from scratch
/// (spec.md §4.4, §9) — `bincode` rather than the stable JSON wire format.
pub struct KBestCache {
    path: Option<PathBuf>,
    cache: RefCell<LruCache<String, KBest>>,
    dirty: RefCell<bool>,
    hits: RefCell<u64>,
    misses: RefCell<u64>,
}

impl KBestCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            path: None,
            cache: RefCell::new(LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()))),
            dirty: RefCell::new(false),
            hits: RefCell::new(0),
            misses: RefCell::new(0),
        }
    }

    /// Load from `path` if it exists and is readable; otherwise start empty.
    /// A corrupt cache file is logged and discarded rather than propagated —
    /// the cache is always safely rebuildable.
    pub fn load<P: AsRef<Path>>(path: P, capacity: usize) -> Self {
        let path = path.as_ref();
        let mut cache = Self::new(capacity);
        cache.path = Some(path.to_path_buf());
        if !path.is_file() {
            return cache;
        }
        match std::fs::read(path).map_err(crate::error::CorrectOcrError::from).and_then(|bytes| {
            bincode::deserialize::<Vec<(String, KBest)>>(&bytes).map_err(crate::error::CorrectOcrError::from)
        }) {
            Ok(entries) => {
                tracing::info!(path = %path.display(), entries = entries.len(), "loaded kbest cache");
                let mut lru = cache.cache.borrow_mut();
                for (k, v) in entries {
                    lru.put(k, v);
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding unreadable kbest cache");
            }
        }
        cache
    }

    /// Cache key: `word` alone is not enough, since a prior run's entry at
    /// a different `k` would otherwise come back with the wrong number of
    /// candidates (spec.md §4.4 "keyed by `word` (and parametrized by
    /// `k`)"; §8 invariant 4, purity in `(word, k, HMM_params)`).
    fn key(word: &str, k: usize) -> String {
        format!("{k}:{word}")
    }

    pub fn get(&self, word: &str, k: usize) -> Option<KBest> {
        let mut cache = self.cache.borrow_mut();
        if let Some(hit) = cache.get(&Self::key(word, k)) {
            *self.hits.borrow_mut() += 1;
            Some(hit.clone())
        } else {
            *self.misses.borrow_mut() += 1;
            None
        }
    }

    pub fn put(&self, word: &str, k: usize, value: KBest) {
        self.cache.borrow_mut().put(Self::key(word, k), value);
        *self.dirty.borrow_mut() = true;
    }

    pub fn hits(&self) -> u64 {
        *self.hits.borrow()
    }

    pub fn misses(&self) -> u64 {
        *self.misses.borrow()
    }

    /// Persist to disk only if entries were written since load/last save.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !*self.dirty.borrow() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let cache = self.cache.borrow();
        let entries: Vec<(String, KBest)> = cache.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        tracing::info!(path = %path.display(), entries = entries.len(), "saving kbest cache");
        let bytes = bincode::serialize(&entries)?;
        std::fs::write(path, bytes)?;
        *self.dirty.borrow_mut() = false;
        Ok(())
    }

    /// Delete the cache file, used when an HMM retrain invalidates it.
    pub fn invalidate(&self) -> Result<()> {
        self.cache.borrow_mut().clear();
        *self.dirty.borrow_mut() = false;
        if let Some(path) = &self.path {
            if path.is_file() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit_updates_counters() {
        let cache = KBestCache::new(10);
        assert!(cache.get("word", 3).is_none());
        assert_eq!(cache.misses(), 1);
        cache.put("word", 3, KBest::new());
        assert!(cache.get("word", 3).is_some());
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn differing_k_is_a_cache_miss() {
        let cache = KBestCache::new(10);
        cache.put("word", 4, KBest::new());
        assert!(cache.get("word", 4).is_some());
        assert!(cache.get("word", 2).is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kbest.bin");
        let cache = KBestCache::load(&path, 10);
        let mut kbest = KBest::new();
        kbest.insert(1, KBestItem::new("word", 0.9));
        cache.put("word", 3, kbest.clone());
        cache.save().unwrap();

        let reloaded = KBestCache::load(&path, 10);
        assert_eq!(reloaded.get("word", 3), Some(kbest));
    }

    #[test]
    fn missing_file_starts_empty_without_erroring() {
        let cache = KBestCache::load("/nonexistent/path/cache.bin", 10);
        assert!(cache.get("anything", 3).is_none());
    }

    #[test]
    fn clean_cache_does_not_rewrite_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kbest.bin");
        let cache = KBestCache::load(&path, 10);
        cache.save().unwrap();
        assert!(!path.exists());
    }
}
