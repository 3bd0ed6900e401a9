//! Runtime configuration, read from the environment (and `.env`).

use std::num::NonZeroUsize;
use std::time::Duration;

/// Debounce window bounds for keystroke-triggered searches.
pub const MIN_DEBOUNCE_MS: u64 = 150;
pub const MAX_DEBOUNCE_MS: u64 = 200;
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

pub const DEFAULT_BASE_URL: &str = "https://www.zotero.org";
/// Listing endpoint, relative to the base URL.
pub const CATALOG_PATH: &str = "/styles-files/styles.json";

const DEFAULT_PREVIEW_CACHE: usize = 256;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    /// Site root used for the listing and for previews.
    pub base_url: String,
    /// Explicit catalog location (URL or file path); overrides `base_url`.
    pub catalog: Option<String>,
    pub debounce: Duration,
    pub preview_cache: NonZeroUsize,
    pub http_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            catalog: None,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            preview_cache: NonZeroUsize::new(DEFAULT_PREVIEW_CACHE).unwrap_or(NonZeroUsize::MIN),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl SearchConfig {
    /// Load config from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(url) = dotenvy::var("STYLE_SEARCH_BASE_URL")
            && !url.trim().is_empty()
        {
            cfg.base_url = url.trim().trim_end_matches('/').to_string();
        }

        if let Ok(catalog) = dotenvy::var("STYLE_SEARCH_CATALOG_URL")
            && !catalog.trim().is_empty()
        {
            cfg.catalog = Some(catalog.trim().to_string());
        }

        if let Ok(val) = dotenvy::var("STYLE_SEARCH_DEBOUNCE_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            cfg = cfg.with_debounce_ms(ms);
        }

        if let Ok(val) = dotenvy::var("STYLE_SEARCH_PREVIEW_CACHE")
            && let Ok(size) = val.parse::<usize>()
            && let Some(size) = NonZeroUsize::new(size)
        {
            cfg.preview_cache = size;
        }

        if let Ok(val) = dotenvy::var("STYLE_SEARCH_HTTP_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            cfg.http_timeout = Duration::from_secs(secs.max(1));
        }

        cfg
    }

    /// Set the debounce window, clamped to the supported range.
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce = Duration::from_millis(ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS));
        self
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Where to load the catalog from.
    pub fn catalog_location(&self) -> String {
        match &self.catalog {
            Some(catalog) => catalog.clone(),
            None => format!("{}{}", self.base_url, CATALOG_PATH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debounce_is_clamped() {
        let cfg = SearchConfig::default().with_debounce_ms(10);
        assert_eq!(cfg.debounce, Duration::from_millis(MIN_DEBOUNCE_MS));
        let cfg = SearchConfig::default().with_debounce_ms(5_000);
        assert_eq!(cfg.debounce, Duration::from_millis(MAX_DEBOUNCE_MS));
        let cfg = SearchConfig::default().with_debounce_ms(175);
        assert_eq!(cfg.debounce, Duration::from_millis(175));
    }

    #[test]
    fn catalog_location_defaults_to_listing_endpoint() {
        let cfg = SearchConfig::default().with_base_url("http://localhost:8080/");
        assert_eq!(
            cfg.catalog_location(),
            "http://localhost:8080/styles-files/styles.json"
        );
        let cfg = cfg.with_catalog("./styles.json");
        assert_eq!(cfg.catalog_location(), "./styles.json");
    }
}
