//! Filter evaluation and facet computation.
//!
//! [`evaluate`] is a pure function of the catalog and the query: it never
//! fails, never mutates its inputs, and keeps catalog order in its output, so
//! it can run on any thread while the caller keeps handling input.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::trace;

use crate::catalog::{CatalogEntry, StyleCatalog};
use crate::model::types::StyleRecord;
use crate::search::query::{Query, ResolvedQuery};

/// Result of one evaluation. Replaced wholesale, never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSnapshot {
    /// Matching styles in catalog order.
    pub matched: Vec<Arc<StyleRecord>>,
    pub count: usize,
    /// Formats present among `matched`, sorted.
    pub facet_formats: Vec<String>,
    /// Fields present among `matched`, sorted.
    pub facet_fields: Vec<String>,
}

impl ResultSnapshot {
    pub fn new(
        matched: Vec<Arc<StyleRecord>>,
        facet_formats: Vec<String>,
        facet_fields: Vec<String>,
    ) -> Self {
        Self {
            count: matched.len(),
            matched,
            facet_formats,
            facet_fields,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.matched.iter().map(|r| r.name.as_str())
    }

    /// Same styles in the same order; records are compared by identity first.
    pub fn same_matches(&self, other: &ResultSnapshot) -> bool {
        self.matched.len() == other.matched.len()
            && self
                .matched
                .iter()
                .zip(&other.matched)
                .all(|(a, b)| Arc::ptr_eq(a, b) || (a.name == b.name && a.dependent == b.dependent))
    }
}

/// Evaluate `query` against `catalog`.
pub fn evaluate(catalog: &StyleCatalog, query: &Query) -> Arc<ResultSnapshot> {
    if query.is_unconstrained() {
        return catalog.unfiltered();
    }

    let started = Instant::now();
    let resolved = query.resolve();

    let mut matched = Vec::new();
    let mut formats: BTreeSet<&str> = BTreeSet::new();
    let mut fields: BTreeSet<&str> = BTreeSet::new();

    for entry in catalog.entries() {
        if !is_visible(entry, &resolved) {
            continue;
        }
        let categories = &entry.record().categories;
        if let Some(format) = categories.format.as_deref() {
            formats.insert(format);
        }
        fields.extend(categories.fields.iter().map(String::as_str));
        matched.push(Arc::clone(entry.record()));
    }

    let snapshot = ResultSnapshot::new(
        matched,
        formats.into_iter().map(str::to_string).collect(),
        fields.into_iter().map(str::to_string).collect(),
    );
    trace!(
        count = snapshot.count,
        catalog = catalog.len(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "evaluated query"
    );
    Arc::new(snapshot)
}

fn is_visible(entry: &CatalogEntry, query: &ResolvedQuery) -> bool {
    let record = entry.record();

    if query.id.as_ref().is_some_and(|id| record.name != *id) {
        return false;
    }
    if let Some(format) = &query.format
        && record.categories.format.as_deref() != Some(format.as_str())
    {
        return false;
    }
    if query.dependent.is_some_and(|dependent| record.dependent != dependent) {
        return false;
    }
    if !query.fields.iter().all(|f| record.categories.has_field(f)) {
        return false;
    }
    query.tokens.iter().all(|token| entry.contains_token(token))
}
