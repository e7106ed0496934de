//! Bounded in-memory cache for saved-analysis rows.
//!
//! The cache exists to avoid redundant remote reads within a process; it is
//! not a persistence layer. Entries have no TTL and are dropped only by
//! explicit invalidation on mutation, wholesale clearing, or least-recently-
//! used eviction once the capacity bound is hit. The eviction policy is
//! pluggable: the orchestrator talks to [`AnalysisCache`] and any impl can be
//! swapped in at construction.

use rivalscan_utils::types::SavedAnalysis;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Key under which one saved-analysis row is cached.
///
/// Renders as `analysis_{id}` / `session_{id}`, the key scheme the backend
/// rows are correlated by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Keyed by row id or alternate analysis id.
    Analysis(String),
    /// Keyed by the session id that produced the row.
    Session(String),
}

impl CacheKey {
    #[must_use]
    pub fn analysis(id: impl Into<String>) -> Self {
        Self::Analysis(id.into())
    }

    #[must_use]
    pub fn session(id: impl Into<String>) -> Self {
        Self::Session(id.into())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analysis(id) => write!(f, "analysis_{id}"),
            Self::Session(id) => write!(f, "session_{id}"),
        }
    }
}

/// Counters for cache effectiveness reporting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub writes: usize,
    pub invalidations: usize,
    pub evictions: usize,
}

impl CacheStats {
    /// Fraction of lookups answered from the cache.
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Read/write surface the orchestrator expects from a result cache.
pub trait AnalysisCache: Send + Sync {
    /// Look up `key`, counting a hit or miss.
    fn get(&self, key: &CacheKey) -> Option<SavedAnalysis>;

    /// Store `analysis` under `key`, replacing any previous entry.
    fn put(&self, key: CacheKey, analysis: SavedAnalysis);

    /// Drop the entry under `key`, if present.
    fn invalidate(&self, key: &CacheKey);

    /// Drop every entry.
    fn clear(&self);

    /// Number of live entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the effectiveness counters.
    fn stats(&self) -> CacheStats;
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, SavedAnalysis>,
    /// Recency order, least recently used at the front.
    order: VecDeque<CacheKey>,
    stats: CacheStats,
}

impl CacheState {
    fn touch(&mut self, key: &CacheKey) {
        if let Some(position) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(position) {
                self.order.push_back(k);
            }
        }
    }
}

/// Capacity-bounded LRU implementation of [`AnalysisCache`].
#[derive(Debug)]
pub struct BoundedCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl BoundedCache {
    /// Cache holding at most `capacity` entries; a capacity of zero is
    /// treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AnalysisCache for BoundedCache {
    fn get(&self, key: &CacheKey) -> Option<SavedAnalysis> {
        let mut state = self.state();

        if let Some(analysis) = state.entries.get(key).cloned() {
            state.touch(key);
            state.stats.hits += 1;
            debug!(key = %key, "Cache hit");
            Some(analysis)
        } else {
            state.stats.misses += 1;
            debug!(key = %key, "Cache miss");
            None
        }
    }

    fn put(&self, key: CacheKey, analysis: SavedAnalysis) {
        let mut state = self.state();

        if state.entries.insert(key.clone(), analysis).is_some() {
            state.touch(&key);
        } else {
            state.order.push_back(key);
        }
        state.stats.writes += 1;

        while state.entries.len() > self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            state.stats.evictions += 1;
            debug!(key = %oldest, "Cache entry evicted");
        }
    }

    fn invalidate(&self, key: &CacheKey) {
        let mut state = self.state();

        if state.entries.remove(key).is_some() {
            state.stats.invalidations += 1;
            if let Some(position) = state.order.iter().position(|k| k == key) {
                state.order.remove(position);
            }
            debug!(key = %key, "Cache entry invalidated");
        }
    }

    fn clear(&self) {
        let mut state = self.state();
        let dropped = state.entries.len();

        state.entries.clear();
        state.order.clear();
        state.stats.invalidations += dropped;
        debug!(dropped = dropped, "Cache cleared");
    }

    fn len(&self) -> usize {
        self.state().entries.len()
    }

    fn stats(&self) -> CacheStats {
        self.state().stats
    }
}
