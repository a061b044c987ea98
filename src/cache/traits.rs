//! Core traits and types for the caching system.

use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::error::{SyncError, SyncResult};

/// Anything usable as a cache key.
pub trait CacheKey: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static {}

/// Anything storable as a cached value.
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + 'static {}

/// Lifecycle of a cache entry.
///
/// Moves `Empty -> Loading -> Ready | Error`, then back to `Loading` on
/// every revalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
  /// Never fetched
  Empty,
  /// A fetch is outstanding
  Loading,
  /// Last fetch succeeded
  Ready,
  /// Last fetch failed
  Error,
}

/// Snapshot of one cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
  pub status: EntryStatus,
  /// Last successfully fetched value; survives later failures
  pub value: Option<V>,
  /// Failure detail of the last fetch
  pub error: Option<SyncError>,
  /// Set by invalidation; cleared by the next successful fetch
  pub stale: bool,
  /// Cache-wide stamp taken on every fetch start and every invalidation;
  /// only a fetch carrying the current stamp may settle the entry
  pub generation: u64,
}

impl<V> Default for CacheEntry<V> {
  fn default() -> Self {
    Self {
      status: EntryStatus::Empty,
      value: None,
      error: None,
      stale: false,
      generation: 0,
    }
  }
}

impl<V: Clone> CacheEntry<V> {
  /// Ready and not invalidated.
  pub fn is_fresh(&self) -> bool {
    self.status == EntryStatus::Ready && !self.stale && self.value.is_some()
  }

  pub fn is_loading(&self) -> bool {
    self.status == EntryStatus::Loading
  }

  pub fn data(&self) -> Option<&V> {
    self.value.as_ref()
  }

  /// Outcome of the last completed fetch, if one has completed.
  pub fn settled(&self) -> Option<SyncResult<V>> {
    match (self.status, &self.value, &self.error) {
      (EntryStatus::Ready, Some(value), _) => Some(Ok(value.clone())),
      (EntryStatus::Error, _, Some(err)) => Some(Err(err.clone())),
      _ => None,
    }
  }
}
