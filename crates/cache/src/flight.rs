//! Request collapsing: concurrent work for the same key runs once.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

type Pending<V> = Shared<BoxFuture<'static, V>>;

/// Single-flight map. The first caller for a key starts the work; callers
/// arriving while it is pending await the same shared future and receive a
/// clone of its output, errors included. The key is released as soon as the
/// work completes, so a later call starts fresh.
pub struct InFlight<K, V> {
    pending: Arc<Mutex<HashMap<K, Pending<V>>>>,
}

impl<K, V> Clone for InFlight<K, V> {
    fn clone(&self) -> Self {
        Self { pending: Arc::clone(&self.pending) }
    }
}

impl<K, V> Default for InFlight<K, V> {
    fn default() -> Self {
        Self { pending: Arc::new(Mutex::new(HashMap::new())) }
    }
}

impl<K, V> fmt::Debug for InFlight<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlight").field("pending", &self.pending.lock().unwrap().len()).finish()
    }
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone + fmt::Display + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` for `key` unless a run is already pending, in which case
    /// its output is shared instead and `work` is never called.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let shared = {
            let mut pending = self.pending.lock().unwrap();
            if let Some(existing) = pending.get(&key) {
                log::debug!("joining in-flight request for {key}");
                existing.clone()
            } else {
                let registry = Arc::clone(&self.pending);
                let release = key.clone();
                let fut = work();
                let shared = async move {
                    let value = fut.await;
                    registry.lock().unwrap().remove(&release);
                    value
                }
                .boxed()
                .shared();

                pending.insert(key, shared.clone());
                shared
            }
        };

        shared.await
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
