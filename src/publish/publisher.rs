//! Delivery of evaluation results to subscribers.
//!
//! Every dispatched evaluation gets the next sequence number. A reply is only
//! applied if its number is still the latest issued, so a superseded
//! evaluation can never overwrite a newer one, whichever finishes first.
//!
//! Applying happens in two phases: subscribers first receive the snapshot,
//! then after one scheduling tick the status flips back to
//! [`SearchStatus::Idle`]. A UI keeps its "searching" indicator up until the
//! frame that consumed the snapshot has had a chance to paint.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::publish::scheduler::{Scheduler, TokioScheduler};
use crate::search::engine::ResultSnapshot;
use crate::search::query::Query;
use crate::search::worker::{Envelope, SearchBackend, SearchResponse, WorkerError};

/// Scheduler key for the debounced keystroke search.
pub const SEARCH_TASK: &str = "search";

/// What caused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Typing in the search box: debounced.
    Keystroke,
    /// Any other change: issued at once, superseding a pending keystroke.
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchStatus {
    Searching,
    Idle,
}

/// Top-level snapshot fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapshotKey {
    Matched,
    Count,
    FacetFormats,
    FacetFields,
}

/// Snapshot fields that differ from the previously published snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangedKeys(BTreeSet<SnapshotKey>);

impl ChangedKeys {
    pub fn all() -> Self {
        Self(BTreeSet::from([
            SnapshotKey::Matched,
            SnapshotKey::Count,
            SnapshotKey::FacetFormats,
            SnapshotKey::FacetFields,
        ]))
    }

    pub fn between(previous: Option<&ResultSnapshot>, next: &ResultSnapshot) -> Self {
        let Some(previous) = previous else {
            return Self::all();
        };
        let mut keys = BTreeSet::new();
        if !previous.same_matches(next) {
            keys.insert(SnapshotKey::Matched);
        }
        if previous.count != next.count {
            keys.insert(SnapshotKey::Count);
        }
        if previous.facet_formats != next.facet_formats {
            keys.insert(SnapshotKey::FacetFormats);
        }
        if previous.facet_fields != next.facet_fields {
            keys.insert(SnapshotKey::FacetFields);
        }
        Self(keys)
    }

    pub fn contains(&self, key: SnapshotKey) -> bool {
        self.0.contains(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = SnapshotKey> + '_ {
        self.0.iter().copied()
    }
}

type ResultHandler = Arc<dyn Fn(&ChangedKeys, &Arc<ResultSnapshot>) + Send + Sync>;
type StatusHandler = Arc<dyn Fn(SearchStatus) + Send + Sync>;

#[derive(Default)]
struct PublishState {
    next_seq: u64,
    latest_issued: u64,
    latest_applied: u64,
    snapshot: Option<Arc<ResultSnapshot>>,
    searching: bool,
}

struct Shared<B> {
    backend: B,
    scheduler: Arc<dyn Scheduler>,
    debounce: Duration,
    state: Mutex<PublishState>,
    /// Serializes apply + notify so handlers see snapshots in apply order.
    delivery: Mutex<()>,
    result_handlers: Mutex<Vec<ResultHandler>>,
    status_handlers: Mutex<Vec<StatusHandler>>,
    status: watch::Sender<SearchStatus>,
}

/// Debounced, last-evaluation-wins result bus. Cheap to clone.
///
/// Must be used from within a Tokio runtime: evaluations and debounce timers
/// run as spawned tasks.
pub struct ResultPublisher<B> {
    shared: Arc<Shared<B>>,
}

impl<B> Clone for ResultPublisher<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: SearchBackend> ResultPublisher<B> {
    pub fn new(backend: B, scheduler: Arc<dyn Scheduler>, debounce: Duration) -> Self {
        let (status, _) = watch::channel(SearchStatus::Idle);
        Self {
            shared: Arc::new(Shared {
                backend,
                scheduler,
                debounce,
                state: Mutex::new(PublishState::default()),
                delivery: Mutex::new(()),
                result_handlers: Mutex::new(Vec::new()),
                status_handlers: Mutex::new(Vec::new()),
                status,
            }),
        }
    }

    /// Publisher driven by a [`TokioScheduler`].
    pub fn with_debounce(backend: B, debounce: Duration) -> Self {
        Self::new(backend, Arc::new(TokioScheduler::new()), debounce)
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    pub fn debounce(&self) -> Duration {
        self.shared.debounce
    }

    /// Register a handler for applied results.
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&ChangedKeys, &Arc<ResultSnapshot>) + Send + Sync + 'static,
    {
        self.shared.result_handlers.lock().push(Arc::new(handler));
    }

    /// Register a handler for searching/idle transitions.
    pub fn subscribe_status<F>(&self, handler: F)
    where
        F: Fn(SearchStatus) + Send + Sync + 'static,
    {
        self.shared.status_handlers.lock().push(Arc::new(handler));
    }

    /// Ask for `query` to be evaluated.
    pub fn request(&self, query: Query, trigger: Trigger) {
        match trigger {
            Trigger::Keystroke => {
                let shared = Arc::clone(&self.shared);
                self.shared.scheduler.schedule_debounced(
                    SEARCH_TASK,
                    self.shared.debounce,
                    Box::pin(async move {
                        shared.dispatch(query);
                    }),
                );
            }
            Trigger::Immediate => {
                if self.shared.scheduler.cancel(SEARCH_TASK) {
                    debug!("immediate request superseded a pending keystroke search");
                }
                self.shared.dispatch(query);
            }
        }
    }

    /// Latest applied snapshot, if any evaluation has completed.
    pub fn latest(&self) -> Option<Arc<ResultSnapshot>> {
        self.shared.state.lock().snapshot.clone()
    }

    /// Sequence number of the most recently applied result (0 if none).
    pub fn applied_seq(&self) -> u64 {
        self.shared.state.lock().latest_applied
    }

    pub fn is_searching(&self) -> bool {
        self.shared.state.lock().searching
    }

    /// True while a keystroke request is waiting out the debounce interval.
    pub fn has_pending_keystroke(&self) -> bool {
        self.shared.scheduler.is_pending(SEARCH_TASK)
    }

    /// Resolve once no evaluation is in flight and no keystroke is pending.
    pub async fn settled(&self) {
        let mut status = self.shared.status.subscribe();
        loop {
            let idle = *status.borrow_and_update() == SearchStatus::Idle;
            if idle && !self.has_pending_keystroke() {
                return;
            }
            if idle {
                tokio::time::sleep(self.shared.debounce).await;
                continue;
            }
            if status.changed().await.is_err() {
                return;
            }
        }
    }
}

impl<B: SearchBackend> Shared<B> {
    fn dispatch(self: &Arc<Self>, query: Query) -> u64 {
        let (seq, began) = {
            let mut state = self.state.lock();
            state.next_seq += 1;
            let seq = state.next_seq;
            state.latest_issued = seq;
            let began = !state.searching;
            state.searching = true;
            (seq, began)
        };
        debug!(seq, query = %query, "dispatching search");
        if began {
            self.notify_status(SearchStatus::Searching);
        }

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            match shared.backend.evaluate(Envelope::new(seq, query)).await {
                Ok(response) => shared.deliver(response).await,
                Err(err) => shared.fail(seq, &err),
            }
        });
        seq
    }

    async fn deliver(&self, response: SearchResponse) {
        let seq = response.seq;
        if !self.apply(response) {
            return;
        }
        tokio::task::yield_now().await;
        self.finish(seq);
    }

    /// Store and announce `response` unless a newer request exists.
    fn apply(&self, response: SearchResponse) -> bool {
        let _delivery = self.delivery.lock();
        let changed = {
            let mut state = self.state.lock();
            if response.seq != state.latest_issued || response.seq <= state.latest_applied {
                debug!(
                    seq = response.seq,
                    latest = state.latest_issued,
                    "discarding stale search result"
                );
                return false;
            }
            let changed = ChangedKeys::between(state.snapshot.as_deref(), &response.payload);
            state.snapshot = Some(Arc::clone(&response.payload));
            state.latest_applied = response.seq;
            changed
        };

        trace!(
            seq = response.seq,
            count = response.payload.count,
            changed = ?changed,
            "applying search result"
        );
        let handlers: Vec<ResultHandler> = self.result_handlers.lock().clone();
        for handler in handlers {
            handler(&changed, &response.payload);
        }
        true
    }

    /// Second phase: clear the indicator if nothing newer was issued.
    fn finish(&self, seq: u64) {
        let done = {
            let mut state = self.state.lock();
            if state.latest_issued == seq && state.searching {
                state.searching = false;
                true
            } else {
                false
            }
        };
        if done {
            trace!(seq, "search complete");
            self.notify_status(SearchStatus::Idle);
        }
    }

    fn fail(&self, seq: u64, err: &WorkerError) {
        warn!(seq, error = %err, "search evaluation failed");
        self.finish(seq);
    }

    fn notify_status(&self, status: SearchStatus) {
        self.status.send_replace(status);
        let handlers: Vec<StatusHandler> = self.status_handlers.lock().clone();
        for handler in handlers {
            handler(status);
        }
    }
}
