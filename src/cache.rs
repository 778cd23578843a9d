//! Component name memoization.
//!
//! Resolving the component name of a lazily loaded route re-runs its loader
//! every time. [`ComponentNameCache`] remembers resolved names per
//! [`RecordId`] in an LRU cache (from the [`lru`] crate) so each record is
//! loaded at most once while it stays cached.
//!
//! [`CacheStats`] tracks hits and misses.
//!
//! # Examples
//!
//! ```
//! use navigator_plugins::cache::ComponentNameCache;
//! use navigator_plugins::route::RouteRecord;
//! use std::rc::Rc;
//!
//! let record = Rc::new(RouteRecord::new("/home").component("HomePage"));
//! let cache = ComponentNameCache::new();
//!
//! pollster::block_on(async {
//!     assert_eq!(cache.resolve(&record).await.as_deref(), Some("HomePage"));
//!     assert_eq!(cache.resolve(&record).await.as_deref(), Some("HomePage"));
//! });
//! assert_eq!(cache.stats().hits, 1);
//! ```

use crate::route::{RecordId, RouteRecord};
use crate::trace_log;
use lru::LruCache;
use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::rc::Rc;

/// Counters tracking cache hit/miss rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of lookups answered from the cache.
    pub hits: usize,
    /// Number of lookups that had to resolve the component.
    pub misses: usize,
}

impl CacheStats {
    /// Return the hit rate as a value in `0.0..=1.0`.
    ///
    /// Returns `0.0` if no lookups have been performed.
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU cache of resolved component names keyed by route record.
#[derive(Debug)]
pub struct ComponentNameCache {
    names: RefCell<LruCache<RecordId, Option<String>>>,
    stats: RefCell<CacheStats>,
}

impl ComponentNameCache {
    /// Default number of remembered records.
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Create a cache remembering up to `capacity` records (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            names: RefCell::new(LruCache::new(cap)),
            stats: RefCell::new(CacheStats::default()),
        }
    }

    /// Component name of `record`, loading it on a cache miss.
    ///
    /// Records without a component resolve to `None`; that result is cached
    /// as well.
    pub async fn resolve(&self, record: &Rc<RouteRecord>) -> Option<String> {
        let cached = self.names.borrow_mut().get(&record.id()).cloned();
        if let Some(name) = cached {
            self.stats.borrow_mut().hits += 1;
            trace_log!("Component cache hit for '{}'", record.path());
            return name;
        }

        self.stats.borrow_mut().misses += 1;
        trace_log!("Component cache miss for '{}'", record.path());
        let name = record.load_component_name().await;
        self.names.borrow_mut().push(record.id(), name.clone());
        name
    }

    /// Forget every remembered name.
    pub fn clear(&self) {
        self.names.borrow_mut().clear();
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.borrow()
    }

    /// Number of remembered records.
    pub fn len(&self) -> usize {
        self.names.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.borrow().is_empty()
    }
}

impl Default for ComponentNameCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_lazy_loader_runs_once() {
        let loads = Rc::new(Cell::new(0));
        let record = {
            let loads = loads.clone();
            Rc::new(RouteRecord::new("/lazy").lazy_component(move || {
                loads.set(loads.get() + 1);
                async { "LazyPage".to_string() }
            }))
        };

        let cache = ComponentNameCache::new();
        pollster::block_on(async {
            for _ in 0..3 {
                assert_eq!(cache.resolve(&record).await.as_deref(), Some("LazyPage"));
            }
        });

        assert_eq!(loads.get(), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 2, misses: 1 });
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let cache = ComponentNameCache::with_capacity(1);
        let a = Rc::new(RouteRecord::new("/a").component("A"));
        let b = Rc::new(RouteRecord::new("/b").component("B"));

        pollster::block_on(async {
            cache.resolve(&a).await;
            cache.resolve(&b).await;
            cache.resolve(&a).await;
        });
        assert_eq!(cache.stats().misses, 3);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_hit_rate() {
        assert!((CacheStats { hits: 0, misses: 0 }.hit_rate()).abs() < f64::EPSILON);
        assert!((CacheStats { hits: 1, misses: 1 }.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
