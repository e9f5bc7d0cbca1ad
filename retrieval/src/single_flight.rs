//! Deduplication of concurrent operations on the same key.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::error::{Result, RetrievalError};

type SharedResult<T> = Shared<BoxFuture<'static, std::result::Result<T, Arc<RetrievalError>>>>;

/// At most one in-flight operation per key.
///
/// The first caller for a key starts the operation; callers arriving while it
/// runs await the same result. The entry is dropped once the operation
/// completes or every caller waiting on it has gone away, so a later call
/// starts fresh.
pub struct SingleFlight<K, T> {
    in_flight: Mutex<HashMap<K, SharedResult<T>>>,
}

impl<K, T> Default for SingleFlight<K, T> {
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `operation` for `key`, or join the run already in flight.
    ///
    /// A joined caller gets the first caller's result; its own `operation`
    /// is dropped unpolled. Errors seen by more than one caller arrive as
    /// [`RetrievalError::Shared`].
    pub async fn run<F>(&self, key: K, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let shared = {
            let mut in_flight = self.entries();
            match in_flight.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let shared = operation
                        .map(|result| result.map_err(Arc::new))
                        .boxed()
                        .shared();
                    in_flight.insert(key.clone(), shared.clone());
                    shared
                }
            }
        };

        let mut waiter = Waiter {
            flight: self,
            key,
            shared: shared.clone(),
            polled: shared,
        };
        let result = (&mut waiter.polled).await;
        drop(waiter);

        result.map_err(|error| Arc::try_unwrap(error).unwrap_or_else(RetrievalError::Shared))
    }

    /// Number of keys with an operation in flight.
    pub fn in_flight(&self) -> usize {
        self.entries().len()
    }
}

impl<K, T> SingleFlight<K, T> {
    fn entries(&self) -> MutexGuard<'_, HashMap<K, SharedResult<T>>> {
        // No insert or remove can panic halfway.
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One caller's interest in a shared run. Dropping a waiter that saw the
/// result, or the last waiter of an unfinished run, clears the map entry.
struct Waiter<'a, K, T>
where
    K: Eq + Hash,
    T: Clone,
{
    flight: &'a SingleFlight<K, T>,
    key: K,
    /// Never polled, so it keeps identifying the run after completion.
    shared: SharedResult<T>,
    polled: SharedResult<T>,
}

impl<K, T> Drop for Waiter<'_, K, T>
where
    K: Eq + Hash,
    T: Clone,
{
    fn drop(&mut self) {
        let mut in_flight = self.flight.entries();
        let ours = in_flight
            .get(&self.key)
            .is_some_and(|current| current.ptr_eq(&self.shared));
        // A polled handle lets go of the run once it returns the output.
        let finished = self.polled.strong_count().is_none();
        // The map entry plus this waiter's two handles.
        let abandoned = self.shared.strong_count().is_some_and(|count| count <= 3);
        if ours && (finished || abandoned) {
            in_flight.remove(&self.key);
        }
    }
}
