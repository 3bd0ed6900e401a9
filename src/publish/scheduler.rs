//! Keyed, cancellable delayed actions.
//!
//! Scheduling under a key that already has a pending action replaces it, which
//! gives trailing-edge debounce: only the last action scheduled within the
//! delay window runs, `delay` after it was scheduled.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::trace;

pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub trait Scheduler: Send + Sync {
    /// Run `action` after `delay`, replacing any action pending under `key`.
    fn schedule_debounced(&self, key: &'static str, delay: Duration, action: Task);

    /// Drop the action pending under `key`. Returns whether one was pending.
    fn cancel(&self, key: &str) -> bool;

    fn is_pending(&self, key: &str) -> bool;
}

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

/// [`Scheduler`] on the current Tokio runtime.
#[derive(Default)]
pub struct TokioScheduler {
    pending: Arc<Mutex<HashMap<&'static str, Pending>>>,
    generation: AtomicU64,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_debounced(&self, key: &'static str, delay: Duration, action: Task) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let pending = Arc::clone(&self.pending);

        // Hold the lock across spawn so the task cannot observe the map
        // before its own entry is in it.
        let mut map = self.pending.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut map = pending.lock();
                match map.get(key) {
                    Some(entry) if entry.generation == generation => {
                        map.remove(key);
                    }
                    _ => return,
                }
            }
            trace!(key, generation, "debounced action fired");
            action.await;
        });
        if let Some(previous) = map.insert(key, Pending { generation, handle }) {
            previous.handle.abort();
            trace!(key, "replaced pending action");
        }
    }

    fn cancel(&self, key: &str) -> bool {
        match self.pending.lock().remove(key) {
            Some(entry) => {
                entry.handle.abort();
                trace!(key, "cancelled pending action");
                true
            }
            None => false,
        }
    }

    fn is_pending(&self, key: &str) -> bool {
        self.pending
            .lock()
            .get(key)
            .is_some_and(|entry| !entry.handle.is_finished())
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, entry) in self.pending.lock().drain() {
            entry.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_task(counter: &Arc<AtomicUsize>, value: usize) -> Task {
        let counter = Arc::clone(counter);
        Box::pin(async move {
            counter.store(value, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn runs_only_the_last_action_after_quiet_period() {
        let scheduler = TokioScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for value in 1..=3 {
            scheduler.schedule_debounced("search", Duration::from_millis(200), counting_task(&fired, value));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_pending("search"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert!(!scheduler.is_pending("search"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_the_action() {
        let scheduler = TokioScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.schedule_debounced("search", Duration::from_millis(150), counting_task(&fired, 1));
        assert!(scheduler.cancel("search"));
        assert!(!scheduler.cancel("search"));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let scheduler = TokioScheduler::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        scheduler.schedule_debounced("a", Duration::from_millis(50), counting_task(&a, 1));
        scheduler.schedule_debounced("b", Duration::from_millis(50), counting_task(&b, 2));
        scheduler.cancel("a");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }
}
