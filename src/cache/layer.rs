//! Fetch cache: coalesced loads, generation-stamped completions and
//! batch invalidation.

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

use super::binding::{Notification, Subscriber, Subscription};
use super::storage::{EntryStore, Fetcher, InFlight, SharedFetch, Slot};
use super::traits::{CacheEntry, CacheKey, CacheValue, EntryStatus};

/// Keyed store of last-known-good results.
///
/// One instance is created at startup and handed to whoever needs it;
/// clones share the same entries. The lock is never held across an await,
/// and subscriber callbacks always run after it is released.
///
/// Fetches run as spawned tasks, so `load`, `invalidate` and `revalidate`
/// must be called from within a Tokio runtime.
pub struct FetchCache<K, V> {
  store: Arc<Mutex<EntryStore<K, V>>>,
  next_subscriber: Arc<AtomicU64>,
  /// Generation stamps are cache-wide so a slot recreated after eviction
  /// never reuses a stamp an orphaned fetch still carries
  next_generation: Arc<AtomicU64>,
}

impl<K, V> Clone for FetchCache<K, V> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      next_subscriber: Arc::clone(&self.next_subscriber),
      next_generation: Arc::clone(&self.next_generation),
    }
  }
}

fn lock<K, V>(store: &Mutex<EntryStore<K, V>>) -> MutexGuard<'_, EntryStore<K, V>> {
  // Entries stay consistent between statements, so a poisoned lock is still usable
  store.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K: CacheKey, V: CacheValue> FetchCache<K, V> {
  /// Create a cache holding at most `capacity` idle entries.
  pub fn new(capacity: usize) -> Self {
    Self {
      store: Arc::new(Mutex::new(EntryStore::new(capacity))),
      next_subscriber: Arc::new(AtomicU64::new(1)),
      next_generation: Arc::new(AtomicU64::new(1)),
    }
  }

  fn stamp(&self) -> u64 {
    self.next_generation.fetch_add(1, Ordering::Relaxed)
  }

  /// Current entry for `key`, created empty on first reference.
  pub fn get(&self, key: &K) -> CacheEntry<V> {
    lock(&self.store).touch(key).entry.clone()
  }

  /// Current entry for `key` without creating one.
  pub fn peek(&self, key: &K) -> Option<CacheEntry<V>> {
    lock(&self.store).get(key).map(|slot| slot.entry.clone())
  }

  /// Keys with a resident entry.
  pub fn keys(&self) -> Vec<K> {
    lock(&self.store).iter().map(|(k, _)| k.clone()).collect()
  }

  /// First match of `f` over fresh values, in key order.
  pub fn find_map<R>(&self, mut f: impl FnMut(&K, &V) -> Option<R>) -> Option<R> {
    let store = lock(&self.store);
    let found = store
      .iter()
      .filter(|(_, slot)| slot.entry.is_fresh())
      .filter_map(|(k, slot)| slot.entry.value.as_ref().map(|v| (k, v)))
      .find_map(|(k, v)| f(k, v));
    found
  }

  /// Load `key`, fetching only when needed.
  ///
  /// A fresh entry is returned without calling `fetch`. While a fetch is
  /// outstanding every caller shares it. If the fetch is superseded by an
  /// invalidation, the caller follows the newer fetch instead of receiving
  /// the outdated result.
  pub async fn load<F, Fut>(&self, key: K, fetch: F) -> SyncResult<V>
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SyncResult<V>> + Send + 'static,
  {
    let fetcher: Fetcher<V> = Arc::new(move || fetch().boxed());
    self.load_with(key, fetcher).await
  }

  pub async fn load_with(&self, key: K, fetcher: Fetcher<V>) -> SyncResult<V> {
    let (generation, pending, notification) = {
      let mut store = lock(&self.store);
      let slot = store.touch(&key);
      slot.fetcher = Some(Arc::clone(&fetcher));

      if slot.entry.is_fresh() {
        if let Some(value) = slot.entry.value.clone() {
          debug!(key = %key, "cache hit");
          return Ok(value);
        }
      }

      match &slot.in_flight {
        Some(in_flight) => {
          debug!(key = %key, "joining in-flight fetch");
          (in_flight.generation, in_flight.result.clone(), None)
        }
        None => {
          let (generation, pending) = self.start_fetch(&key, slot, fetcher);
          (generation, pending, Some(slot.notification()))
        }
      }
    };

    if let Some(notification) = notification {
      notification.fire();
    }
    let result = pending.await;
    self.follow(&key, generation, result).await
  }

  /// Start loading `key` in the background unless it is fresh or already
  /// loading. Registers `fetcher` the same way `load_with` does.
  pub fn prefetch(&self, key: &K, fetcher: Fetcher<V>) {
    let notification = {
      let mut store = lock(&self.store);
      let slot = store.touch(key);
      slot.fetcher = Some(Arc::clone(&fetcher));
      if slot.in_flight.is_some() || slot.entry.is_fresh() {
        return;
      }
      // Later callers join through slot.in_flight
      let _ = self.start_fetch(key, slot, fetcher);
      slot.notification()
    };
    notification.fire();
  }

  /// Refetch `key` with its registered fetcher unless it is fresh.
  ///
  /// Returns `None` when no fetcher has been registered for the key yet.
  pub fn revalidate(&self, key: &K) -> Option<BoxFuture<'static, SyncResult<V>>> {
    let (generation, pending, notification) = {
      let mut store = lock(&self.store);
      let slot = store.get_mut(key)?;
      let fetcher = slot.fetcher.clone()?;
      match &slot.in_flight {
        Some(in_flight) => (in_flight.generation, in_flight.result.clone(), None),
        None if slot.entry.is_fresh() => {
          let value = slot.entry.value.clone()?;
          return Some(futures::future::ready(Ok(value)).boxed());
        }
        None => {
          let (generation, pending) = self.start_fetch(key, slot, fetcher);
          (generation, pending, Some(slot.notification()))
        }
      }
    };

    if let Some(notification) = notification {
      notification.fire();
    }
    let cache = self.clone();
    let key = key.clone();
    Some(
      async move {
        let result = pending.await;
        cache.follow(&key, generation, result).await
      }
      .boxed(),
    )
  }

  /// Mark `key` stale.
  pub fn invalidate(&self, key: &K) {
    self.invalidate_all(std::slice::from_ref(key));
  }

  /// Mark every key in `keys` stale.
  ///
  /// All entries change under one lock before any subscriber is told, so
  /// no view observes half a batch. An outstanding fetch for an
  /// invalidated key is orphaned and a new one started in its place.
  pub fn invalidate_all(&self, keys: &[K]) {
    let notifications: Vec<Notification<V>> = {
      let mut store = lock(&self.store);
      let mut notifications = Vec::new();
      for key in keys {
        let Some(slot) = store.get_mut(key) else {
          continue;
        };
        slot.entry.stale = true;
        slot.entry.generation = self.stamp();
        if slot.in_flight.take().is_some() {
          if let Some(fetcher) = slot.fetcher.clone() {
            debug!(key = %key, "restarting fetch superseded by invalidation");
            // Superseded waiters find the replacement through follow()
            let _ = self.start_fetch(key, slot, fetcher);
          }
        }
        debug!(key = %key, generation = slot.entry.generation, "invalidated");
        notifications.push(slot.notification());
      }
      notifications
    };

    for notification in notifications {
      notification.fire();
    }
  }

  /// Keys in `keys` that currently have at least one live subscriber.
  pub fn subscribed(&self, keys: &[K]) -> Vec<K> {
    let store = lock(&self.store);
    keys
      .iter()
      .filter(|k| store.get(k).is_some_and(Slot::has_subscribers))
      .cloned()
      .collect()
  }

  /// Follow `key`; `callback` runs after every change of its entry.
  ///
  /// The subscription keeps the entry resident until dropped.
  pub fn subscribe(
    &self,
    key: K,
    callback: impl Fn(&CacheEntry<V>) + Send + Sync + 'static,
  ) -> Subscription {
    let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
    let alive = Arc::new(AtomicBool::new(true));

    lock(&self.store).touch(&key).subscribers.push(Subscriber {
      id,
      alive: Arc::clone(&alive),
      callback: Arc::new(callback),
    });

    let store = Arc::downgrade(&self.store);
    Subscription::new(alive, move || {
      if let Some(store) = store.upgrade() {
        if let Some(slot) = lock(&store).get_mut(&key) {
          slot.subscribers.retain(|s| s.id != id);
        }
      }
    })
  }

  /// Begin a fetch for `slot`. Caller holds the lock and fires the
  /// resulting notification after releasing it.
  fn start_fetch(&self, key: &K, slot: &mut Slot<V>, fetcher: Fetcher<V>) -> (u64, SharedFetch<V>) {
    slot.entry.generation = self.stamp();
    slot.entry.status = EntryStatus::Loading;
    let generation = slot.entry.generation;
    debug!(key = %key, generation, "fetch started");

    let fetch = fetcher();
    let cache = self.clone();
    let task_key = key.clone();
    // Spawned so the fetch completes even if every waiter goes away
    let task = tokio::spawn(async move {
      let result = match AssertUnwindSafe(fetch).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(SyncError::unknown(format!("fetch for {} panicked", task_key))),
      };
      cache.complete(&task_key, generation, result.clone());
      result
    });

    let pending: SharedFetch<V> = async move {
      task
        .await
        .unwrap_or_else(|e| Err(SyncError::unknown(format!("fetch task failed: {}", e))))
    }
    .boxed()
    .shared();

    slot.in_flight = Some(InFlight {
      generation,
      result: pending.clone(),
    });
    (generation, pending)
  }

  /// Apply a finished fetch unless something newer has started since.
  fn complete(&self, key: &K, generation: u64, result: SyncResult<V>) {
    let notification = {
      let mut store = lock(&self.store);
      let Some(slot) = store.get_mut(key) else {
        return;
      };
      if slot.entry.generation != generation {
        debug!(
          key = %key,
          generation,
          current = slot.entry.generation,
          "discarding superseded fetch result"
        );
        return;
      }

      slot.in_flight = None;
      match result {
        Ok(value) => {
          slot.entry.value = Some(value);
          slot.entry.error = None;
          slot.entry.stale = false;
          slot.entry.status = EntryStatus::Ready;
          debug!(key = %key, generation, "fetch ready");
        }
        Err(err) => {
          warn!(key = %key, generation, error = %err, "fetch failed");
          slot.entry.error = Some(err);
          slot.entry.status = EntryStatus::Error;
        }
      }
      slot.notification()
    };
    notification.fire();
  }

  /// Resolve a caller's result against what the entry holds now.
  ///
  /// If the caller's fetch was superseded, wait on the newer one or hand
  /// back whatever the entry settled on.
  async fn follow(&self, key: &K, generation: u64, result: SyncResult<V>) -> SyncResult<V> {
    let mut generation = generation;
    let mut result = result;
    loop {
      let next = {
        let store = lock(&self.store);
        match store.get(key) {
          Some(slot) if slot.entry.generation != generation => match &slot.in_flight {
            Some(in_flight) => Some((in_flight.generation, in_flight.result.clone())),
            None => return slot.entry.settled().unwrap_or(result),
          },
          _ => None,
        }
      };
      match next {
        Some((newer, pending)) => {
          generation = newer;
          result = pending.await;
        }
        None => return result,
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;
  use std::time::Duration;

  type TestCache = FetchCache<String, u32>;

  fn key(s: &str) -> String {
    s.to_string()
  }

  /// Fetcher returning 1, 2, 3, ... after `delay`, counting calls.
  fn counting(
    calls: &Arc<AtomicUsize>,
    delay: Duration,
  ) -> impl Fn() -> BoxFuture<'static, SyncResult<u32>> + Send + Sync + 'static {
    let calls = Arc::clone(calls);
    move || {
      let n = calls.fetch_add(1, Ordering::SeqCst) as u32 + 1;
      async move {
        tokio::time::sleep(delay).await;
        Ok(n)
      }
      .boxed()
    }
  }

  #[tokio::test]
  async fn test_get_creates_empty_entry() {
    let cache = TestCache::new(8);
    let entry = cache.get(&key("a"));
    assert_eq!(entry.status, EntryStatus::Empty);
    assert!(entry.value.is_none());
    assert!(cache.peek(&key("a")).is_some());
    assert!(cache.peek(&key("b")).is_none());
  }

  #[tokio::test]
  async fn test_ready_entry_skips_fetch() {
    let cache = TestCache::new(8);
    let calls = Arc::new(AtomicUsize::new(0));

    assert_eq!(cache.load(key("a"), counting(&calls, Duration::ZERO)).await, Ok(1));
    assert_eq!(cache.load(key("a"), counting(&calls, Duration::ZERO)).await, Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get(&key("a")).status, EntryStatus::Ready);
  }

  #[tokio::test]
  async fn test_concurrent_loads_share_one_fetch() {
    let cache = TestCache::new(8);
    let calls = Arc::new(AtomicUsize::new(0));

    let (a, b) = tokio::join!(
      cache.load(key("a"), counting(&calls, Duration::from_millis(30))),
      cache.load(key("a"), counting(&calls, Duration::from_millis(30))),
    );
    assert_eq!(a, Ok(1));
    assert_eq!(b, Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_invalidate_forces_refetch() {
    let cache = TestCache::new(8);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
      .load(key("a"), counting(&calls, Duration::ZERO))
      .await
      .unwrap();
    cache.invalidate(&key("a"));
    assert!(cache.get(&key("a")).stale);

    assert_eq!(cache.load(key("a"), counting(&calls, Duration::ZERO)).await, Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!cache.get(&key("a")).stale);
  }

  #[tokio::test]
  async fn test_invalidate_during_fetch_discards_old_result() {
    let cache = TestCache::new(8);
    let calls = Arc::new(AtomicUsize::new(0));

    let loader = {
      let cache = cache.clone();
      let fetch = counting(&calls, Duration::from_millis(50));
      tokio::spawn(async move { cache.load(key("a"), fetch).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(cache.get(&key("a")).is_loading());

    cache.invalidate(&key("a"));
    // A replacement fetch starts at once; the entry never leaves Loading
    assert!(cache.get(&key("a")).is_loading());

    // The first caller ends up with the replacement's value
    assert_eq!(loader.await.unwrap(), Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let entry = cache.get(&key("a"));
    assert_eq!(entry.status, EntryStatus::Ready);
    assert_eq!(entry.value, Some(2));
  }

  #[tokio::test]
  async fn test_failure_keeps_previous_value() {
    let cache = TestCache::new(8);
    cache.load(key("a"), || async { Ok(7) }).await.unwrap();
    cache.invalidate(&key("a"));

    let result = cache
      .load(key("a"), || async { Err(SyncError::Network("down".into())) })
      .await;
    assert_eq!(result, Err(SyncError::Network("down".into())));

    let entry = cache.get(&key("a"));
    assert_eq!(entry.status, EntryStatus::Error);
    assert_eq!(entry.value, Some(7));
    assert_eq!(entry.error, Some(SyncError::Network("down".into())));
  }

  #[tokio::test]
  async fn test_error_entry_refetches_on_next_load() {
    let cache = TestCache::new(8);
    let _ = cache
      .load(key("a"), || async { Err(SyncError::Network("down".into())) })
      .await;
    assert_eq!(cache.load(key("a"), || async { Ok(3) }).await, Ok(3));
  }

  #[tokio::test]
  async fn test_panicking_fetch_settles_as_error() {
    let cache = TestCache::new(8);
    let result = cache
      .load(key("a"), || async {
        if true {
          panic!("fetch blew up");
        }
        Ok(0)
      })
      .await;
    assert!(matches!(result, Err(SyncError::ConflictOrUnknown { .. })));
    assert_eq!(cache.get(&key("a")).status, EntryStatus::Error);
  }

  #[tokio::test]
  async fn test_subscriber_sees_loading_then_ready() {
    let cache = TestCache::new(8);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = cache.subscribe(key("a"), move |entry| {
      sink.lock().unwrap().push((entry.status, entry.value));
    });

    cache.load(key("a"), || async { Ok(5) }).await.unwrap();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
      seen,
      vec![(EntryStatus::Loading, None), (EntryStatus::Ready, Some(5))]
    );
  }

  #[tokio::test]
  async fn test_unsubscribe_before_completion_stops_notifications() {
    let cache = TestCache::new(8);
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let sub = cache.subscribe(key("a"), move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
    });

    let loader = {
      let cache = cache.clone();
      tokio::spawn(async move {
        cache
          .load(key("a"), || async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(1)
          })
          .await
      })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    let before = count.load(Ordering::SeqCst);
    sub.unsubscribe();

    // The fetch still lands in the shared cache
    assert_eq!(loader.await.unwrap(), Ok(1));
    assert_eq!(count.load(Ordering::SeqCst), before);
    assert_eq!(cache.get(&key("a")).value, Some(1));
    assert!(cache.subscribed(&[key("a")]).is_empty());
  }

  #[tokio::test]
  async fn test_invalidate_all_notifies_after_whole_batch() {
    let cache = TestCache::new(8);
    cache.load(key("a"), || async { Ok(1) }).await.unwrap();
    cache.load(key("b"), || async { Ok(2) }).await.unwrap();

    let observed = Arc::new(Mutex::new(Vec::new()));
    let probe = cache.clone();
    let sink = Arc::clone(&observed);
    let _sub = cache.subscribe(key("a"), move |_| {
      // b must already be stale when a's subscriber runs
      sink.lock().unwrap().push(probe.get(&key("b")).stale);
    });

    cache.invalidate_all(&[key("a"), key("b")]);
    assert_eq!(*observed.lock().unwrap(), vec![true]);
  }

  #[tokio::test]
  async fn test_revalidate_uses_registered_fetcher() {
    let cache = TestCache::new(8);
    let calls = Arc::new(AtomicUsize::new(0));
    assert!(cache.revalidate(&key("a")).is_none());

    cache
      .load(key("a"), counting(&calls, Duration::ZERO))
      .await
      .unwrap();
    cache.invalidate(&key("a"));

    let refetch = cache.revalidate(&key("a")).expect("fetcher registered");
    assert_eq!(refetch.await, Ok(2));
    assert_eq!(cache.get(&key("a")).value, Some(2));
  }

  #[tokio::test]
  async fn test_prefetch_starts_without_waiting() {
    let cache = TestCache::new(8);
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher: Fetcher<u32> = Arc::new(counting(&calls, Duration::from_millis(20)));

    cache.prefetch(&key("a"), Arc::clone(&fetcher));
    assert!(cache.get(&key("a")).is_loading());
    // Joins the outstanding fetch rather than starting another
    cache.prefetch(&key("a"), Arc::clone(&fetcher));
    assert_eq!(cache.load_with(key("a"), fetcher).await, Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_eviction_is_only_a_miss() {
    let cache = TestCache::new(1);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
      .load(key("a"), counting(&calls, Duration::ZERO))
      .await
      .unwrap();
    cache.load(key("b"), || async { Ok(99) }).await.unwrap();
    assert!(cache.peek(&key("a")).is_none());

    // Evicted entry refetches rather than returning anything wrong
    assert_eq!(cache.load(key("a"), counting(&calls, Duration::ZERO)).await, Ok(2));
  }

  #[tokio::test]
  async fn test_orphaned_fetch_cannot_land_in_recreated_entry() {
    let cache = TestCache::new(1);
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher: Fetcher<u32> = {
      let calls = Arc::clone(&calls);
      Arc::new(move || {
        let n = calls.fetch_add(1, Ordering::SeqCst) as u32 + 1;
        let delay = match n {
          1 => Duration::from_millis(60),
          2 => Duration::ZERO,
          _ => Duration::from_millis(200),
        };
        async move {
          tokio::time::sleep(delay).await;
          Ok(n * 100)
        }
        .boxed()
      })
    };

    cache.prefetch(&key("a"), Arc::clone(&fetcher));
    // Orphans fetch 1 and starts fetch 2, which settles at once
    cache.invalidate(&key("a"));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(cache.get(&key("a")).value, Some(200));

    cache.load(key("b"), || async { Ok(1) }).await.unwrap();
    assert!(cache.peek(&key("a")).is_none());

    // Fetch 3 is still running when fetch 1 lands
    cache.prefetch(&key("a"), Arc::clone(&fetcher));
    tokio::time::sleep(Duration::from_millis(80)).await;
    let entry = cache.get(&key("a"));
    assert!(entry.is_loading());
    assert_eq!(entry.value, None);

    assert_eq!(cache.load_with(key("a"), fetcher).await, Ok(300));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_find_map_skips_stale_values() {
    let cache = TestCache::new(8);
    cache.load(key("a"), || async { Ok(1) }).await.unwrap();
    cache.load(key("b"), || async { Ok(2) }).await.unwrap();
    cache.invalidate(&key("a"));

    let found = cache.find_map(|k, v| (*v > 0).then(|| k.clone()));
    assert_eq!(found, Some(key("b")));
  }

  #[tokio::test]
  async fn test_subscribed_entries_survive_eviction() {
    let cache = TestCache::new(1);
    let _sub = cache.subscribe(key("a"), |_| {});
    cache.load(key("b"), || async { Ok(1) }).await.unwrap();
    assert!(cache.peek(&key("a")).is_some());
  }
}
