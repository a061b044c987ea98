//! In-memory entry table with least-recently-used eviction.

use futures::future::{BoxFuture, Shared};
use indexmap::IndexMap;
use std::sync::Arc;

use crate::error::SyncResult;

use super::binding::{Notification, Subscriber};
use super::traits::{CacheEntry, CacheKey};

/// Produces a fresh fetch future for an entry.
pub type Fetcher<V> = Arc<dyn Fn() -> BoxFuture<'static, SyncResult<V>> + Send + Sync>;

pub(super) type SharedFetch<V> = Shared<BoxFuture<'static, SyncResult<V>>>;

/// The one outstanding fetch of an entry.
pub(super) struct InFlight<V> {
  pub generation: u64,
  pub result: SharedFetch<V>,
}

/// Everything the cache tracks for one key.
pub(super) struct Slot<V> {
  pub entry: CacheEntry<V>,
  pub in_flight: Option<InFlight<V>>,
  /// Last fetcher registered by `load`, reused for revalidation
  pub fetcher: Option<Fetcher<V>>,
  pub subscribers: Vec<Subscriber<V>>,
}

impl<V: Clone> Slot<V> {
  fn new() -> Self {
    Self {
      entry: CacheEntry::default(),
      in_flight: None,
      fetcher: None,
      subscribers: Vec::new(),
    }
  }

  pub fn has_subscribers(&self) -> bool {
    !self.subscribers.is_empty()
  }

  fn evictable(&self) -> bool {
    self.in_flight.is_none() && self.subscribers.is_empty()
  }

  pub fn notification(&self) -> Notification<V> {
    Notification {
      entry: self.entry.clone(),
      targets: self
        .subscribers
        .iter()
        .map(|s| (Arc::clone(&s.alive), Arc::clone(&s.callback)))
        .collect(),
    }
  }
}

/// One slot per distinct key, ordered from least to most recently used.
pub(super) struct EntryStore<K, V> {
  slots: IndexMap<K, Slot<V>>,
  capacity: usize,
}

impl<K: CacheKey, V: Clone> EntryStore<K, V> {
  pub fn new(capacity: usize) -> Self {
    Self {
      slots: IndexMap::new(),
      capacity: capacity.max(1),
    }
  }

  /// Look up `key`, creating an empty slot if needed, and mark it most
  /// recently used.
  pub fn touch(&mut self, key: &K) -> &mut Slot<V> {
    let index = match self.slots.get_index_of(key) {
      Some(index) => {
        let last = self.slots.len() - 1;
        self.slots.move_index(index, last);
        last
      }
      None => {
        self.evict_for_insert();
        self.slots.insert(key.clone(), Slot::new());
        self.slots.len() - 1
      }
    };
    &mut self.slots[index]
  }

  pub fn get(&self, key: &K) -> Option<&Slot<V>> {
    self.slots.get(key)
  }

  pub fn get_mut(&mut self, key: &K) -> Option<&mut Slot<V>> {
    self.slots.get_mut(key)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&K, &Slot<V>)> {
    self.slots.iter()
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.slots.len()
  }

  /// Drop idle slots, oldest first, until one more fits.
  ///
  /// Slots with subscribers or an outstanding fetch are never evicted, so
  /// the table may briefly exceed capacity.
  fn evict_for_insert(&mut self) {
    while self.slots.len() >= self.capacity {
      let Some(index) = self.slots.values().position(Slot::evictable) else {
        return;
      };
      if let Some((key, _)) = self.slots.shift_remove_index(index) {
        tracing::debug!(key = %key, "evicted cache entry");
      }
    }
  }
}
