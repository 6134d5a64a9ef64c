//! Keyed single-slot delayed tasks.
//!
//! Arming a task under a key cancels whatever task was still pending under
//! that key, so a burst of arms within the delay runs only the last task.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

type PendingMap<K> = Arc<Mutex<HashMap<K, Pending>>>;

/// Coalesces repeated tasks per key into the most recent one.
pub struct Debouncer<K> {
    delay: Duration,
    pending: PendingMap<K>,
    generation: AtomicU64,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Creates a debouncer with the given quiescence window.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Schedules `task` to run after the window unless re-armed first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(&self, key: K, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // Held across spawn so the task cannot look itself up before it is
        // inserted, and so generations are inserted in the order they are taken.
        let mut pending = lock(&self.pending);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let delay = self.delay;

        let slots = Arc::clone(&self.pending);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slots = lock(&slots);
                match slots.get(&task_key) {
                    Some(current) if current.generation == generation => {
                        slots.remove(&task_key);
                    }
                    _ => return,
                }
            }
            task();
        });

        if let Some(previous) = pending.insert(key, Pending { generation, handle }) {
            trace!(generation = previous.generation, "Cancelling pending task");
            previous.handle.abort();
        }
    }

    /// Returns true if a task is waiting to run for `key`.
    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.pending).contains_key(key)
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for (_, previous) in lock(&self.pending).drain() {
            previous.handle.abort();
        }
    }
}

fn lock<K>(pending: &Mutex<HashMap<K, Pending>>) -> MutexGuard<'_, HashMap<K, Pending>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}
