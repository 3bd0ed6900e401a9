//! Off-thread evaluation.
//!
//! The worker owns its own handle to the catalog, received once through a
//! load command, and answers search commands over a queue. Requests and
//! replies travel in sequence-numbered [`Envelope`]s so the publishing side
//! can tell a stale reply from the current one without relying on delivery
//! order.

use std::future::Future;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::catalog::StyleCatalog;
use crate::search::engine::{ResultSnapshot, evaluate};
use crate::search::query::Query;

/// Request/response wrapper carrying the evaluation sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub seq: u64,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(seq: u64, payload: T) -> Self {
        Self { seq, payload }
    }
}

pub type SearchRequest = Envelope<Query>;
pub type SearchResponse = Envelope<Arc<ResultSnapshot>>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("search worker is not running")]
    Disconnected,
    #[error("search worker dropped request {0}")]
    Dropped(u64),
    #[error("failed to start search worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Something that can evaluate queries against a loaded catalog.
pub trait SearchBackend: Send + Sync + 'static {
    /// Hand the catalog over. Called once per session, before any search.
    fn load(&self, catalog: StyleCatalog) -> Result<(), WorkerError>;

    fn evaluate(
        &self,
        request: SearchRequest,
    ) -> impl Future<Output = Result<SearchResponse, WorkerError>> + Send;
}

enum Command {
    Load(StyleCatalog),
    Search {
        request: SearchRequest,
        reply: oneshot::Sender<SearchResponse>,
    },
}

/// Dedicated evaluation thread. At most one evaluation runs at a time; queued
/// requests are served in arrival order. Dropping the handle stops the thread
/// once the queue drains.
#[derive(Debug, Clone)]
pub struct SearchWorker {
    commands: Sender<Command>,
}

impl SearchWorker {
    pub fn spawn() -> Result<Self, WorkerError> {
        let (commands, queue) = crossbeam_channel::unbounded();
        std::thread::Builder::new()
            .name("style-search-worker".to_string())
            .spawn(move || run_worker(queue))?;
        Ok(Self { commands })
    }
}

fn run_worker(queue: Receiver<Command>) {
    let mut catalog = StyleCatalog::default();
    for command in queue {
        match command {
            Command::Load(loaded) => {
                debug!(styles = loaded.len(), "search worker ready");
                catalog = loaded;
            }
            Command::Search { request, reply } => {
                let seq = request.seq;
                let payload = evaluate(&catalog, &request.payload);
                trace!(seq, count = payload.count, "search worker finished");
                if reply.send(Envelope::new(seq, payload)).is_err() {
                    trace!(seq, "requester went away before the reply");
                }
            }
        }
    }
    debug!("search worker stopped");
}

impl SearchBackend for SearchWorker {
    fn load(&self, catalog: StyleCatalog) -> Result<(), WorkerError> {
        self.commands
            .send(Command::Load(catalog))
            .map_err(|_| WorkerError::Disconnected)
    }

    async fn evaluate(&self, request: SearchRequest) -> Result<SearchResponse, WorkerError> {
        let seq = request.seq;
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Search { request, reply })
            .map_err(|_| WorkerError::Disconnected)?;
        response.await.map_err(|_| WorkerError::Dropped(seq))
    }
}

/// Evaluates on the calling task. For small catalogs and one-shot callers.
#[derive(Debug, Default)]
pub struct InlineBackend {
    catalog: RwLock<StyleCatalog>,
}

impl InlineBackend {
    pub fn new(catalog: StyleCatalog) -> Self {
        Self {
            catalog: RwLock::new(catalog),
        }
    }
}

impl SearchBackend for InlineBackend {
    fn load(&self, catalog: StyleCatalog) -> Result<(), WorkerError> {
        *self.catalog.write() = catalog;
        Ok(())
    }

    async fn evaluate(&self, request: SearchRequest) -> Result<SearchResponse, WorkerError> {
        let catalog = self.catalog.read().clone();
        Ok(Envelope::new(
            request.seq,
            evaluate(&catalog, &request.payload),
        ))
    }
}
