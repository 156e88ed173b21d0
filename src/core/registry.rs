//! Controller registry keyed by media URL, with LRU eviction.
//!
//! One [`PlaybackController`] per URL. Lookup and insertion happen under one
//! mutex, so concurrent `get_or_create` calls for the same URL build exactly
//! one controller. With a non-zero capacity the least recently used session
//! is evicted on overflow; evicted sessions are detached and stopped.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, trace};
use lru::LruCache;

use crate::core::player::PlaybackController;

/// Registry counters
#[derive(Debug, Default)]
pub struct RegistryStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl RegistryStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 { 0.0 } else { self.hits() as f64 / total as f64 }
    }
}

/// URL -> controller map shared by every feed screen.
#[derive(Debug)]
pub struct ControllerRegistry {
    entries: Mutex<LruCache<String, Arc<PlaybackController>>>,
    stats: RegistryStats,
}

impl Default for ControllerRegistry {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ControllerRegistry {
    /// `capacity` of 0 keeps every session alive.
    pub fn new(capacity: usize) -> Self {
        let entries = match NonZeroUsize::new(capacity) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        debug!("ControllerRegistry created: capacity={}", capacity);
        Self {
            entries: Mutex::new(entries),
            stats: RegistryStats::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Arc<PlaybackController>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Existing controller for `url`, or one built by `factory`.
    ///
    /// `factory` runs at most once per URL while the entry is alive.
    /// It runs with the registry lock held, so it must not call back into
    /// this registry (that deadlocks).
    pub fn get_or_create<F>(&self, url: &str, factory: F) -> Arc<PlaybackController>
    where
        F: FnOnce() -> Arc<PlaybackController>,
    {
        let (controller, evicted) = {
            let mut entries = self.lock();
            if let Some(existing) = entries.get(url) {
                self.stats.record_hit();
                trace!("ControllerRegistry: hit {}", url);
                return Arc::clone(existing);
            }

            self.stats.record_miss();
            let controller = factory();
            let evicted = entries.push(url.to_string(), Arc::clone(&controller));
            (controller, evicted)
        };

        // Teardown runs outside the lock; it calls into the engine and view
        if let Some((key, old)) = evicted
            && key != url
        {
            self.stats.record_eviction();
            debug!("ControllerRegistry: evicted {}", key);
            old.detach_view();
            old.stop();
        }

        controller
    }

    /// Lookup that counts as a use for eviction order.
    pub fn get(&self, url: &str) -> Option<Arc<PlaybackController>> {
        self.lock().get(url).cloned()
    }

    /// Lookup without touching eviction order.
    pub fn contains(&self, url: &str) -> bool {
        self.lock().contains(url)
    }

    /// Drop the entry for `url`. The controller is returned untouched.
    pub fn remove(&self, url: &str) -> Option<Arc<PlaybackController>> {
        self.lock().pop(url)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stop every session and empty the registry.
    pub fn clear(&self) {
        let drained: Vec<_> = {
            let mut entries = self.lock();
            let mut drained = Vec::with_capacity(entries.len());
            while let Some((_, controller)) = entries.pop_lru() {
                drained.push(controller);
            }
            drained
        };
        for controller in &drained {
            controller.stop();
        }
        debug!("ControllerRegistry: cleared {} sessions", drained.len());
    }

    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }
}
