//! Normalized style records as served by the catalog listing.

use serde::{Deserialize, Deserializer, Serialize};

/// Classification of a style: one citation format and any number of subject fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Categories {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl Categories {
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

/// One entry of the style listing.
///
/// Records are immutable once a catalog has been built; the catalog hands them
/// out behind `Arc` so result snapshots never copy style metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleRecord {
    /// Unique, filesystem-safe identifier (never contains `.`).
    pub name: String,
    pub title: String,
    #[serde(default, deserialize_with = "non_empty_string")]
    pub title_short: Option<String>,
    /// Last-modified timestamp of the source file, kept verbatim.
    #[serde(default)]
    pub updated: String,
    /// Pre-rendered `updated` value some listings emit for display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_formatted: Option<String>,
    /// True when the style only carries metadata and points at a parent style.
    #[serde(default, deserialize_with = "loose_bool")]
    pub dependent: bool,
    /// Set on dependent styles whose name collides with an independent one.
    #[serde(default, deserialize_with = "loose_bool")]
    pub disambiguate: bool,
    #[serde(default)]
    pub categories: Categories,
    #[serde(default)]
    pub href: String,
}

impl StyleRecord {
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            title_short: None,
            updated: String::new(),
            updated_formatted: None,
            dependent: false,
            disambiguate: false,
            categories: Categories::default(),
            href: String::new(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.categories.format = Some(format.into());
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_title_short(mut self, title_short: impl Into<String>) -> Self {
        self.title_short = Some(title_short.into());
        self
    }

    pub fn dependent(mut self, dependent: bool) -> Self {
        self.dependent = dependent;
        self
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = href.into();
        self
    }

    /// Title used for display: the short title when the listing has one.
    pub fn display_title(&self) -> &str {
        self.title_short.as_deref().unwrap_or(&self.title)
    }
}

/// Listings written by PHP emit `0`/`1` for flags, newer ones emit booleans.
fn loose_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        None => false,
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(i)) => i != 0,
        Some(Flag::Text(s)) => !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")),
    })
}

fn non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}
