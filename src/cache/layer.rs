//! Cache layer that memoizes asynchronous producers.

use chrono::{DateTime, Local};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::traits::{Expiry, QueryKey};
use crate::clock::Clock;
use crate::error::{HarvestError, Result};

type AnyValue = Arc<dyn Any + Send + Sync>;
type PendingFuture = Shared<BoxFuture<'static, Result<AnyValue>>>;
type SlotKey = (&'static str, String);

enum Slot {
  /// A produced value and the instant it stops being valid
  Ready {
    value: AnyValue,
    expires_at: DateTime<Local>,
  },
  /// A computation in flight; every caller awaits the same future
  Pending {
    generation: u64,
    future: PendingFuture,
  },
}

enum Lookup {
  Hit(AnyValue),
  Join(u64, PendingFuture),
  Miss,
}

#[derive(Default)]
struct Entries {
  slots: HashMap<SlotKey, Slot>,
  next_generation: u64,
}

struct Inner {
  clock: Arc<dyn Clock>,
  entries: Mutex<Entries>,
}

/// Memoizing store shared by every cached accessor of one client.
///
/// A value is produced at most once per key per validity window. Callers that
/// arrive while the value is being produced wait for that same computation.
/// Failures are handed to every waiter and never stored.
pub struct CacheLayer {
  inner: Arc<Inner>,
}

impl CacheLayer {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      inner: Arc::new(Inner {
        clock,
        entries: Mutex::new(Entries::default()),
      }),
    }
  }

  fn entries(&self) -> MutexGuard<'_, Entries> {
    self
      .inner
      .entries
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  /// Return the cached value for `key`, or run `producer` to compute it.
  ///
  /// 1. Fresh entry: return it, `producer` is dropped unused
  /// 2. Computation in flight: wait for it
  /// 3. Missing or expired: run `producer`, store the value until `expiry`
  pub async fn fetch<K, T, F, Fut>(&self, key: &K, expiry: Expiry, producer: F) -> Result<T>
  where
    K: QueryKey + Sync + ?Sized,
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let slot_key: SlotKey = (key.namespace(), key.cache_key());

    let (generation, pending) = {
      let mut entries = self.entries();
      let now = self.inner.clock.now();

      let lookup = match entries.slots.get(&slot_key) {
        Some(Slot::Ready { value, expires_at }) if now < *expires_at => Lookup::Hit(value.clone()),
        Some(Slot::Pending { generation, future }) => Lookup::Join(*generation, future.clone()),
        _ => Lookup::Miss,
      };

      match lookup {
        Lookup::Hit(value) => {
          debug!(key = %key.description(), "cache hit");
          return downcast(&slot_key, &value);
        }
        Lookup::Join(generation, future) => {
          debug!(key = %key.description(), "waiting on pending computation");
          (generation, future)
        }
        Lookup::Miss => {
          debug!(key = %key.description(), "cache miss");
          // The producer runs on first poll, after the table lock is released
          let future = async move { producer().await }
            .map(|result| result.map(|value| Arc::new(value) as AnyValue))
            .boxed()
            .shared();
          let generation = entries.next_generation;
          entries.next_generation += 1;
          entries.slots.insert(
            slot_key.clone(),
            Slot::Pending {
              generation,
              future: future.clone(),
            },
          );
          (generation, future)
        }
      }
    };

    let outcome = pending.await;

    {
      let mut entries = self.entries();
      let still_pending = matches!(
        entries.slots.get(&slot_key),
        Some(Slot::Pending { generation: g, .. }) if *g == generation
      );

      // The first waiter to wake settles the slot; a reset in the meantime wins.
      if still_pending {
        match &outcome {
          Ok(value) => {
            let expires_at = expiry.expires_at(self.inner.clock.now());
            debug!(key = %key.description(), %expires_at, "cached");
            entries.slots.insert(
              slot_key.clone(),
              Slot::Ready {
                value: value.clone(),
                expires_at,
              },
            );
          }
          Err(e) => {
            debug!(key = %key.description(), error = %e, "computation failed, not cached");
            entries.slots.remove(&slot_key);
          }
        }
      }
    }

    downcast(&slot_key, &outcome?)
  }

  /// Wrap `producer` into a callable that memoizes per argument.
  ///
  /// Entries land in `namespace` under the key `key_fn` derives from the arguments.
  pub fn memoize<A, T, F, Fut>(
    &self,
    namespace: &'static str,
    expiry: Expiry,
    key_fn: fn(&A) -> String,
    producer: F,
  ) -> Memoized<A, T>
  where
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    Memoized {
      cache: self.clone(),
      namespace,
      expiry,
      key_fn,
      producer: Arc::new(move |args| producer(args).boxed()),
    }
  }

  /// Drop every entry. Computations in flight finish but are not stored.
  pub fn reset(&self) {
    self.entries().slots.clear();
  }

  pub fn reset_namespace(&self, namespace: &str) {
    self
      .entries()
      .slots
      .retain(|(ns, _), _| *ns != namespace);
  }

  /// Number of stored values that are still valid.
  #[cfg(test)]
  pub fn len(&self) -> usize {
    let now = self.inner.clock.now();
    self
      .entries()
      .slots
      .values()
      .filter(|slot| matches!(slot, Slot::Ready { expires_at, .. } if now < *expires_at))
      .count()
  }

  #[cfg(test)]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Clone for CacheLayer {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

fn downcast<T: Clone + 'static>(key: &SlotKey, value: &AnyValue) -> Result<T> {
  (**value)
    .downcast_ref::<T>()
    .cloned()
    .ok_or_else(|| HarvestError::CacheType(format!("{}:{}", key.0, key.1)))
}

type Producer<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// A producer bound to a cache, namespace and expiry policy.
pub struct Memoized<A, T> {
  cache: CacheLayer,
  namespace: &'static str,
  expiry: Expiry,
  key_fn: fn(&A) -> String,
  producer: Producer<A, T>,
}

struct MemoKey {
  namespace: &'static str,
  key: String,
}

impl QueryKey for MemoKey {
  fn namespace(&self) -> &'static str {
    self.namespace
  }

  fn cache_key(&self) -> String {
    self.key.clone()
  }
}

impl<A, T> Memoized<A, T>
where
  A: Send + 'static,
  T: Clone + Send + Sync + 'static,
{
  pub async fn call(&self, args: A) -> Result<T> {
    let key = MemoKey {
      namespace: self.namespace,
      key: (self.key_fn)(&args),
    };
    let producer = Arc::clone(&self.producer);
    self
      .cache
      .fetch(&key, self.expiry, move || producer(args))
      .await
  }
}

impl<A, T> Clone for Memoized<A, T> {
  fn clone(&self) -> Self {
    Self {
      cache: self.cache.clone(),
      namespace: self.namespace,
      expiry: self.expiry,
      key_fn: self.key_fn,
      producer: Arc::clone(&self.producer),
    }
  }
}
