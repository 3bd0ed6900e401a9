//! Session-scoped search controller.
//!
//! One [`SearchSession`] owns the current [`Query`], the [`ResultPublisher`]
//! and the address-bar mirror. User input arrives as [`QueryDelta`]s; each
//! change is mirrored to the [`LocationSink`] and, once the catalog is loaded,
//! turned into an evaluation request.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::catalog::{CatalogLoadError, CatalogSource, StyleCatalog};
use crate::config::SearchConfig;
use crate::publish::{ResultPublisher, Trigger};
use crate::search::engine::ResultSnapshot;
use crate::search::query::{Query, QueryDelta};
use crate::search::worker::{SearchBackend, WorkerError};

/// Receives the serialized query after every change. Replaces, never appends.
pub trait LocationSink: Send + Sync {
    fn replace(&self, location: &str);
}

/// Keeps the latest location in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocation {
    current: Arc<Mutex<String>>,
}

impl MemoryLocation {
    pub fn current(&self) -> String {
        self.current.lock().clone()
    }
}

impl LocationSink for MemoryLocation {
    fn replace(&self, location: &str) {
        *self.current.lock() = location.to_string();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogState {
    Fetching,
    Ready,
    /// Terminal: the catalog could not be obtained and will not be retried.
    Failed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    CatalogLoad(#[from] CatalogLoadError),
    #[error("style catalog is unavailable")]
    CatalogUnavailable,
    #[error("style catalog is already loaded")]
    AlreadyLoaded,
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

pub struct SearchSession<B, L = MemoryLocation> {
    query: Query,
    state: CatalogState,
    catalog: Option<StyleCatalog>,
    publisher: ResultPublisher<B>,
    location: L,
}

impl<B: SearchBackend, L: LocationSink> SearchSession<B, L> {
    /// Start a session from the page location. The catalog is not loaded yet.
    pub fn new(config: &SearchConfig, location: &str, backend: B, sink: L) -> Self {
        let query = Query::parse(location);
        debug!(query = %query, "session started");
        Self {
            query,
            state: CatalogState::Fetching,
            catalog: None,
            publisher: ResultPublisher::with_debounce(backend, config.debounce),
            location: sink,
        }
    }

    /// Session around an existing publisher (custom scheduler or backend wiring).
    pub fn with_publisher(location: &str, publisher: ResultPublisher<B>, sink: L) -> Self {
        Self {
            query: Query::parse(location),
            state: CatalogState::Fetching,
            catalog: None,
            publisher,
            location: sink,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn state(&self) -> CatalogState {
        self.state
    }

    pub fn catalog(&self) -> Option<&StyleCatalog> {
        self.catalog.as_ref()
    }

    pub fn publisher(&self) -> &ResultPublisher<B> {
        &self.publisher
    }

    pub fn location(&self) -> &L {
        &self.location
    }

    pub fn snapshot(&self) -> Option<Arc<ResultSnapshot>> {
        self.publisher.latest()
    }

    /// Fetch the catalog once and run the initial evaluation.
    pub async fn load<S: CatalogSource>(&mut self, source: &S) -> Result<(), SessionError> {
        match self.state {
            CatalogState::Fetching => {}
            CatalogState::Ready => return Err(SessionError::AlreadyLoaded),
            CatalogState::Failed => return Err(SessionError::CatalogUnavailable),
        }

        let catalog = match source.fetch().await {
            Ok(catalog) => catalog,
            Err(err) => {
                error!(source = %source.describe(), error = %err, "failed to load style catalog");
                self.state = CatalogState::Failed;
                return Err(err.into());
            }
        };

        if let Err(err) = self.publisher.backend().load(catalog.clone()) {
            self.state = CatalogState::Failed;
            return Err(err.into());
        }
        info!(source = %source.describe(), styles = catalog.len(), "style catalog loaded");
        self.catalog = Some(catalog);
        self.state = CatalogState::Ready;
        self.publisher.request(self.query.clone(), Trigger::Immediate);
        Ok(())
    }

    /// Apply a user change. Returns whether the query changed.
    ///
    /// Edits that leave a non-empty search text are debounced; everything else
    /// is evaluated immediately.
    pub fn update(&mut self, delta: QueryDelta) -> Result<bool, SessionError> {
        let next = self.query.merge(&delta);
        let trigger = if delta.search.is_some()
            && next.search != self.query.search
            && !next.search.is_empty()
        {
            Trigger::Keystroke
        } else {
            Trigger::Immediate
        };
        self.apply(next, trigger)
    }

    pub fn set_search(&mut self, text: impl Into<String>) -> Result<bool, SessionError> {
        self.update(QueryDelta::default().with_search(text))
    }

    /// Select a format; selecting the active one clears the constraint.
    pub fn toggle_format(&mut self, format: &str) -> Result<bool, SessionError> {
        let next = if self.query.format.as_deref() == Some(format) {
            None
        } else {
            Some(format.to_string())
        };
        self.update(QueryDelta::default().with_format(next))
    }

    pub fn toggle_field(&mut self, field: &str) -> Result<bool, SessionError> {
        let mut fields = self.query.fields.clone();
        if !fields.remove(field) {
            fields.insert(field.to_string());
        }
        self.update(QueryDelta::default().with_fields(fields))
    }

    /// "Unique styles only" checkbox.
    pub fn set_unique_only(&mut self, unique_only: bool) -> Result<bool, SessionError> {
        self.update(QueryDelta::default().with_dependent(unique_only.then_some(0)))
    }

    /// Narrow the listing to one style, as clicking its link does.
    pub fn select_style(&mut self, name: &str) -> Result<bool, SessionError> {
        let next = self
            .query
            .merge(&QueryDelta::default().with_search(format!("id:{name}")));
        self.apply(next, Trigger::Immediate)
    }

    fn apply(&mut self, next: Query, trigger: Trigger) -> Result<bool, SessionError> {
        if self.state == CatalogState::Failed {
            return Err(SessionError::CatalogUnavailable);
        }
        if next == self.query {
            return Ok(false);
        }

        debug!(changed = ?next.diff(&self.query), ?trigger, "query updated");
        self.query = next;
        self.location.replace(&self.query.serialize());
        if self.state == CatalogState::Ready {
            self.publisher.request(self.query.clone(), trigger);
        }
        Ok(true)
    }
}
