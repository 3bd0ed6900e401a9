//! Filter criteria and their shareable query-string form.
//!
//! A [`Query`] is always fully defined: every key defaults to "no constraint",
//! so evaluation never special-cases a missing query. The only way to change a
//! query is [`Query::merge`], which produces a new value from a [`QueryDelta`].
//!
//! The query string uses the keys `id`, `q`, `fields`, `format` and
//! `dependent`, e.g. `?q=nature&fields=biology,science&dependent=0`.

use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// `id:<name>` typed into the search box; style names are ASCII.
static ID_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)id:\s*([0-9A-Za-z_-]+)").expect("id token regex"));

/// Top-level query keys, in query-string order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryKey {
    Id,
    Search,
    Fields,
    Format,
    Dependent,
}

impl QueryKey {
    /// Name used in the query string.
    pub fn param(self) -> &'static str {
        match self {
            QueryKey::Id => "id",
            QueryKey::Search => "q",
            QueryKey::Fields => "fields",
            QueryKey::Format => "format",
            QueryKey::Dependent => "dependent",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Free text; may embed an `id:<name>` token.
    pub search: String,
    /// Exact, case-sensitive style name.
    pub id: Option<String>,
    /// Exact citation format.
    pub format: Option<String>,
    /// Every listed field must be present on a style.
    pub fields: BTreeSet<String>,
    /// `Some(0)` keeps only independent ("unique") styles, any other value
    /// keeps only dependent ones.
    pub dependent: Option<i64>,
}

impl Query {
    /// Read a query from a location string.
    ///
    /// Accepts a full URL, `?a=b&c=d` or a bare `a=b&c=d`. Unknown keys,
    /// empty values and fragments that fail to decode are dropped; this
    /// never fails.
    pub fn parse(location: &str) -> Self {
        let without_fragment = location.split_once('#').map_or(location, |(head, _)| head);
        let query_string = without_fragment
            .split_once('?')
            .map_or(without_fragment, |(_, rest)| rest);

        let mut query = Query::default();
        for pair in query_string.split('&').filter(|p| !p.is_empty()) {
            let Some((raw_key, raw_value)) = pair.split_once('=') else {
                continue;
            };
            let (Ok(key), Ok(value)) = (
                urlencoding::decode(raw_key),
                urlencoding::decode(raw_value),
            ) else {
                trace!(pair, "dropping undecodable query pair");
                continue;
            };
            if value.is_empty() {
                continue;
            }

            match key.as_ref() {
                "id" => query.id = Some(value.into_owned()),
                "q" => query.search = value.into_owned(),
                "format" => query.format = Some(value.into_owned()),
                "fields" => {
                    query.fields = value
                        .split(',')
                        .filter(|f| !f.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "dependent" => match value.trim().parse::<i64>() {
                    Ok(dependent) => query.dependent = Some(dependent),
                    Err(_) => trace!(value = %value, "dropping non-integer dependent"),
                },
                _ => {}
            }
        }
        query
    }

    /// Query-string form: non-default keys only, in the order
    /// `id, q, fields, format, dependent`. Empty for the default query.
    pub fn serialize(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(5);
        let mut push = |key: QueryKey, value: &str| {
            parts.push(format!("{}={}", key.param(), urlencoding::encode(value)));
        };

        if let Some(id) = self.id.as_deref().filter(|v| !v.is_empty()) {
            push(QueryKey::Id, id);
        }
        if !self.search.is_empty() {
            push(QueryKey::Search, &self.search);
        }
        if !self.fields.is_empty() {
            let joined = self
                .fields
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(",");
            push(QueryKey::Fields, &joined);
        }
        if let Some(format) = self.format.as_deref().filter(|v| !v.is_empty()) {
            push(QueryKey::Format, format);
        }
        if let Some(dependent) = self.dependent {
            push(QueryKey::Dependent, &dependent.to_string());
        }

        if parts.is_empty() {
            String::new()
        } else {
            format!("?{}", parts.join("&"))
        }
    }

    /// New query with every key present in `delta` replaced.
    pub fn merge(&self, delta: &QueryDelta) -> Self {
        Self {
            search: delta.search.clone().unwrap_or_else(|| self.search.clone()),
            id: delta.id.clone().unwrap_or_else(|| self.id.clone()),
            format: delta.format.clone().unwrap_or_else(|| self.format.clone()),
            fields: delta.fields.clone().unwrap_or_else(|| self.fields.clone()),
            dependent: delta.dependent.unwrap_or(self.dependent),
        }
    }

    /// True when no key constrains the result.
    pub fn is_unconstrained(&self) -> bool {
        self.search.trim().is_empty()
            && self.id.as_deref().is_none_or(str::is_empty)
            && self.format.as_deref().is_none_or(str::is_empty)
            && self.fields.is_empty()
            && self.dependent.is_none()
    }

    /// "Unique styles only" toggle state.
    pub fn unique_only(&self) -> bool {
        self.dependent == Some(0)
    }

    /// Keys whose values differ between `self` and `other`.
    pub fn diff(&self, other: &Query) -> BTreeSet<QueryKey> {
        let mut keys = BTreeSet::new();
        if self.id != other.id {
            keys.insert(QueryKey::Id);
        }
        if self.search != other.search {
            keys.insert(QueryKey::Search);
        }
        if self.fields != other.fields {
            keys.insert(QueryKey::Fields);
        }
        if self.format != other.format {
            keys.insert(QueryKey::Format);
        }
        if self.dependent != other.dependent {
            keys.insert(QueryKey::Dependent);
        }
        keys
    }

    /// Normalize into the predicate set the engine evaluates.
    ///
    /// An `id:<name>` token in the search text is lifted out: it becomes the
    /// effective id (taking precedence over an explicit `id`) and is removed
    /// from the text, which still applies to what remains.
    pub fn resolve(&self) -> ResolvedQuery {
        let mut id = self.id.clone().filter(|v| !v.is_empty());
        let mut text = self.search.clone();

        if let Some(caps) = ID_TOKEN.captures(&self.search)
            && let (Some(whole), Some(name)) = (caps.get(0), caps.get(1))
        {
            id = Some(name.as_str().to_string());
            text = format!(
                "{}{}",
                &self.search[..whole.start()],
                &self.search[whole.end()..]
            );
        }

        ResolvedQuery {
            id,
            format: self.format.clone().filter(|v| !v.is_empty()),
            fields: self.fields.iter().cloned().collect(),
            dependent: self.dependent.map(|d| d != 0),
            tokens: text
                .trim()
                .to_lowercase()
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

/// Partial update of a [`Query`]. Keys left as `None` are untouched; for the
/// nullable keys `Some(None)` clears the constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDelta {
    pub search: Option<String>,
    pub id: Option<Option<String>>,
    pub format: Option<Option<String>>,
    pub fields: Option<BTreeSet<String>>,
    pub dependent: Option<Option<i64>>,
}

impl QueryDelta {
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_format(mut self, format: Option<String>) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_dependent(mut self, dependent: Option<i64>) -> Self {
        self.dependent = Some(dependent);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// Keys this delta touches.
    pub fn keys(&self) -> BTreeSet<QueryKey> {
        let mut keys = BTreeSet::new();
        if self.id.is_some() {
            keys.insert(QueryKey::Id);
        }
        if self.search.is_some() {
            keys.insert(QueryKey::Search);
        }
        if self.fields.is_some() {
            keys.insert(QueryKey::Fields);
        }
        if self.format.is_some() {
            keys.insert(QueryKey::Format);
        }
        if self.dependent.is_some() {
            keys.insert(QueryKey::Dependent);
        }
        keys
    }
}

/// A [`Query`] reduced to the predicates the engine applies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedQuery {
    pub id: Option<String>,
    pub format: Option<String>,
    pub fields: Vec<String>,
    /// Required value of the style's `dependent` flag.
    pub dependent: Option<bool>,
    /// Lowercase, whitespace-separated search tokens.
    pub tokens: Vec<String>,
}
