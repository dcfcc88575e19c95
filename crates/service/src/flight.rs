//! Per-key single-flight.
//!
//! Concurrent requests for the same digest are serialized on a per-key lock;
//! the first one runs the pass, later ones find its cached output once they
//! get the lock. Locks are dropped from the map when the last holder leaves.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct SingleFlight {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`. `f` receives whether this
    /// caller had to wait for another holder.
    pub async fn run<T, F, Fut>(&self, key: &str, f: F) -> T
    where
        F: FnOnce(bool) -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let (_guard, waited) = match lock.try_lock() {
                Ok(guard) => (guard, false),
                Err(_) => (lock.lock().await, true),
            };
            f(waited).await
        };

        drop(lock);
        // Only the map still holds it: nobody else is queued.
        self.locks.remove_if(key, |_, held| Arc::strong_count(held) == 1);
        result
    }

    /// Keys with a pass in progress or queued
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }
}
