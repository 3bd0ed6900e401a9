//! In-memory style catalog.
//!
//! The catalog is loaded once per session from a [`CatalogSource`] and is
//! read-only afterwards. Cloning a [`StyleCatalog`] is cheap (one `Arc` bump),
//! which is how it gets handed to the search worker.

pub mod source;

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::types::StyleRecord;
use crate::search::engine::ResultSnapshot;

pub use source::{AnyCatalogSource, CatalogSource, FileCatalogSource, HttpCatalogSource};

/// Failure to obtain the catalog. Terminal for the session: there is no retry
/// and no partial catalog.
#[derive(Debug, Error)]
pub enum CatalogLoadError {
    #[error("failed to fetch catalog from {url}: {source}")]
    Http { url: String, source: reqwest::Error },
    #[error("catalog request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to read catalog at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed catalog JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A catalog record plus the lowercase text the free-text filter matches against.
#[derive(Debug)]
pub struct CatalogEntry {
    record: Arc<StyleRecord>,
    name_lc: String,
    title_lc: String,
    title_short_lc: Option<String>,
}

impl CatalogEntry {
    fn new(record: StyleRecord) -> Self {
        Self {
            name_lc: record.name.to_lowercase(),
            title_lc: record.title.to_lowercase(),
            title_short_lc: record.title_short.as_deref().map(str::to_lowercase),
            record: Arc::new(record),
        }
    }

    pub fn record(&self) -> &Arc<StyleRecord> {
        &self.record
    }

    /// `token` must already be lowercase.
    pub fn contains_token(&self, token: &str) -> bool {
        self.name_lc.contains(token)
            || self.title_lc.contains(token)
            || self
                .title_short_lc
                .as_deref()
                .is_some_and(|short| short.contains(token))
    }
}

#[derive(Debug)]
struct CatalogInner {
    entries: Vec<CatalogEntry>,
    unfiltered: Arc<ResultSnapshot>,
}

#[derive(Debug, Clone)]
pub struct StyleCatalog {
    inner: Arc<CatalogInner>,
}

impl Default for StyleCatalog {
    fn default() -> Self {
        Self::from_records(Vec::new())
    }
}

impl StyleCatalog {
    /// Build a catalog from listing records, in listing order.
    ///
    /// Dependent records whose name is also used by an independent record get
    /// their `disambiguate` flag set if the listing did not already set it.
    pub fn from_records(mut records: Vec<StyleRecord>) -> Self {
        let independent: HashSet<String> = records
            .iter()
            .filter(|r| !r.dependent)
            .map(|r| r.name.clone())
            .collect();

        let mut seen: HashSet<(String, bool)> = HashSet::with_capacity(records.len());
        for record in &mut records {
            if record.dependent && independent.contains(&record.name) {
                record.disambiguate = true;
            }
            if !seen.insert((record.name.clone(), record.dependent)) {
                warn!(
                    name = %record.name,
                    dependent = record.dependent,
                    "duplicate style name in catalog"
                );
            }
        }

        let entries: Vec<CatalogEntry> = records.into_iter().map(CatalogEntry::new).collect();

        let mut formats = BTreeSet::new();
        let mut fields = BTreeSet::new();
        for entry in &entries {
            let categories = &entry.record.categories;
            if let Some(format) = categories.format.as_deref() {
                formats.insert(format);
            }
            fields.extend(categories.fields.iter().map(String::as_str));
        }
        let unfiltered = ResultSnapshot::new(
            entries.iter().map(|e| Arc::clone(&e.record)).collect(),
            formats.into_iter().map(str::to_string).collect(),
            fields.into_iter().map(str::to_string).collect(),
        );

        debug!(
            styles = entries.len(),
            formats = unfiltered.facet_formats.len(),
            fields = unfiltered.facet_fields.len(),
            "catalog built"
        );

        Self {
            inner: Arc::new(CatalogInner {
                entries,
                unfiltered: Arc::new(unfiltered),
            }),
        }
    }

    /// Parse the JSON array produced by the listing endpoint.
    pub fn from_json(bytes: &[u8]) -> Result<Self, CatalogLoadError> {
        let records: Vec<StyleRecord> = serde_json::from_slice(bytes)?;
        Ok(Self::from_records(records))
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.inner.entries
    }

    pub fn records(&self) -> impl Iterator<Item = &Arc<StyleRecord>> {
        self.inner.entries.iter().map(CatalogEntry::record)
    }

    pub fn get(&self, name: &str, dependent: bool) -> Option<&Arc<StyleRecord>> {
        self.records()
            .find(|r| r.name == name && r.dependent == dependent)
    }

    /// Every format used anywhere in the catalog, sorted.
    pub fn formats(&self) -> &[String] {
        &self.inner.unfiltered.facet_formats
    }

    /// Every field used anywhere in the catalog, sorted.
    pub fn fields(&self) -> &[String] {
        &self.inner.unfiltered.facet_fields
    }

    /// Snapshot of the whole catalog, as an unconstrained query would produce.
    pub fn unfiltered(&self) -> Arc<ResultSnapshot> {
        Arc::clone(&self.inner.unfiltered)
    }
}
