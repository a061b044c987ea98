//! Subscriptions that let views follow a cache entry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::traits::CacheEntry;

/// Invoked with the entry snapshot after each state or value change.
pub type Callback<V> = Arc<dyn Fn(&CacheEntry<V>) + Send + Sync>;

pub(super) struct Subscriber<V> {
  pub id: u64,
  pub alive: Arc<AtomicBool>,
  pub callback: Callback<V>,
}

/// Handle returned by `FetchCache::subscribe`.
///
/// Dropping it (or calling `unsubscribe`) detaches the callback. A
/// notification already collected for delivery is skipped once the
/// handle is gone.
pub struct Subscription {
  alive: Arc<AtomicBool>,
  detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
  pub(super) fn new(alive: Arc<AtomicBool>, detach: impl FnOnce() + Send + Sync + 'static) -> Self {
    Self {
      alive,
      detach: Some(Box::new(detach)),
    }
  }

  pub fn unsubscribe(self) {}

  pub fn is_active(&self) -> bool {
    self.alive.load(Ordering::Acquire)
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.alive.store(false, Ordering::Release);
    if let Some(detach) = self.detach.take() {
      detach();
    }
  }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("active", &self.is_active())
      .finish_non_exhaustive()
  }
}

/// Snapshot plus the callbacks to deliver it to, collected under the lock
/// and fired after it is released.
pub(super) struct Notification<V> {
  pub entry: CacheEntry<V>,
  pub targets: Vec<(Arc<AtomicBool>, Callback<V>)>,
}

impl<V> Notification<V> {
  pub fn fire(self) {
    for (alive, callback) in self.targets {
      if alive.load(Ordering::Acquire) {
        callback(&self.entry);
      }
    }
  }
}
