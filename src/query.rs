//! Event-loop friendly view over one cache entry.
//!
//! A `ViewQuery` subscribes to a key of the shared `FetchCache` and buffers
//! every entry change in a channel, so a tick-driven loop can pick them up
//! without blocking. Several views over the same key share one fetch and
//! all see the refresh a mutation triggers.
//!
//! # Example
//!
//! ```ignore
//! let mut query = client.watch(QueryKey::LaterArticles);
//!
//! // Start fetching
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match query.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(data) => render_data(data),
//!     QueryState::Error(e) => render_error(e),
//!     QueryState::Idle => {}
//! }
//! ```

use tokio::sync::mpsc;

use crate::cache::{CacheEntry, CacheKey, CacheValue, EntryStatus, FetchCache, Fetcher, Subscription};

/// The state of a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(String),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }
}

/// One view's binding to a cache key.
///
/// Dropping the query unsubscribes it. An outstanding fetch still
/// completes and lands in the cache for everyone else.
pub struct ViewQuery<K, V> {
  cache: FetchCache<K, V>,
  key: K,
  fetcher: Fetcher<V>,
  entry: CacheEntry<V>,
  receiver: mpsc::UnboundedReceiver<CacheEntry<V>>,
  _subscription: Subscription,
}

impl<K: CacheKey, V: CacheValue> ViewQuery<K, V> {
  /// Bind to `key`, starting from whatever the cache holds for it now.
  pub fn new(cache: FetchCache<K, V>, key: K, fetcher: Fetcher<V>) -> Self {
    let (tx, receiver) = mpsc::unbounded_channel();
    let subscription = cache.subscribe(key.clone(), move |entry| {
      // Ignore send errors - the query may be mid-drop
      let _ = tx.send(entry.clone());
    });
    let entry = cache.get(&key);
    Self {
      cache,
      key,
      fetcher,
      entry,
      receiver,
      _subscription: subscription,
    }
  }

  pub fn key(&self) -> &K {
    &self.key
  }

  /// Raw snapshot of the bound entry.
  pub fn entry(&self) -> &CacheEntry<V> {
    &self.entry
  }

  pub fn state(&self) -> QueryState<&V> {
    match (self.entry.status, &self.entry.value, &self.entry.error) {
      (EntryStatus::Empty, _, _) => QueryState::Idle,
      (EntryStatus::Loading, _, _) => QueryState::Loading,
      (EntryStatus::Ready, Some(value), _) => QueryState::Success(value),
      (EntryStatus::Ready, None, _) => QueryState::Idle,
      (EntryStatus::Error, _, Some(err)) => QueryState::Error(err.to_string()),
      (EntryStatus::Error, _, None) => QueryState::Error("unknown error".to_string()),
    }
  }

  /// Last good value, also while refetching or after a failed refresh.
  pub fn data(&self) -> Option<&V> {
    self.entry.value.as_ref()
  }

  pub fn is_loading(&self) -> bool {
    self.entry.is_loading()
  }

  pub fn is_success(&self) -> bool {
    self.entry.status == EntryStatus::Ready
  }

  pub fn is_error(&self) -> bool {
    self.entry.status == EntryStatus::Error
  }

  /// Get the error message if the last fetch failed.
  pub fn error(&self) -> Option<String> {
    self.entry.error.as_ref().map(ToString::to_string)
  }

  /// Invalidated since the last successful fetch.
  pub fn is_stale(&self) -> bool {
    self.entry.stale
  }

  /// Start fetching unless the entry is fresh or already loading.
  pub fn fetch(&mut self) {
    self
      .cache
      .prefetch(&self.key, std::sync::Arc::clone(&self.fetcher));
    self.poll();
  }

  /// Force a refetch even if data exists. A fetch already outstanding is
  /// superseded.
  pub fn refetch(&mut self) {
    self.cache.invalidate(&self.key);
    self.fetch();
  }

  /// Drain pending entry changes.
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick
  /// handler. Snapshots older than the one already held are dropped.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(entry) = self.receiver.try_recv() {
      if supersedes(&entry, &self.entry) {
        self.entry = entry;
        changed = true;
      }
    }
    changed
  }
}

/// Notifications from different fetch tasks may interleave. Within one
/// generation a settled snapshot outranks the `Loading` one.
fn supersedes<V: Clone>(next: &CacheEntry<V>, current: &CacheEntry<V>) -> bool {
  (next.generation, !next.is_loading()) >= (current.generation, !current.is_loading())
}

impl<K: std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for ViewQuery<K, V> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ViewQuery")
      .field("key", &self.key)
      .field("entry", &self.entry)
      .finish_non_exhaustive()
  }
}
