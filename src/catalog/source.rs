//! Where the catalog comes from: the listing endpoint or a local JSON dump.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::{debug, info};

use super::{CatalogLoadError, StyleCatalog};

/// One-shot provider of the style listing.
///
/// Implementations perform no retry; any failure is final for the session.
pub trait CatalogSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<StyleCatalog, CatalogLoadError>> + Send;

    /// Human-readable location, used in logs.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
    url: String,
    timeout: Duration,
}

impl HttpCatalogSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl CatalogSource for HttpCatalogSource {
    async fn fetch(&self) -> Result<StyleCatalog, CatalogLoadError> {
        let started = Instant::now();
        let http_err = |source| CatalogLoadError::Http {
            url: self.url.clone(),
            source,
        };

        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("stylesearch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(http_err)?;

        let response = client.get(&self.url).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogLoadError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(http_err)?;
        let catalog = StyleCatalog::from_json(&body)?;
        info!(
            url = %self.url,
            styles = catalog.len(),
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched style catalog"
        );
        Ok(catalog)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

#[derive(Debug, Clone)]
pub struct FileCatalogSource {
    path: PathBuf,
}

impl FileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogSource for FileCatalogSource {
    async fn fetch(&self) -> Result<StyleCatalog, CatalogLoadError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| CatalogLoadError::Io {
                path: self.path.clone(),
                source,
            })?;
        let catalog = StyleCatalog::from_json(&bytes)?;
        debug!(path = %self.path.display(), styles = catalog.len(), "read style catalog");
        Ok(catalog)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Source picked from a user-supplied location: `http(s)://` URLs go over the
/// network, anything else is treated as a file path.
#[derive(Debug, Clone)]
pub enum AnyCatalogSource {
    Http(HttpCatalogSource),
    File(FileCatalogSource),
}

impl AnyCatalogSource {
    pub fn from_location(location: &str, timeout: Duration) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            Self::Http(HttpCatalogSource::new(location, timeout))
        } else {
            Self::File(FileCatalogSource::new(location))
        }
    }
}

impl CatalogSource for AnyCatalogSource {
    async fn fetch(&self) -> Result<StyleCatalog, CatalogLoadError> {
        match self {
            Self::Http(source) => source.fetch().await,
            Self::File(source) => source.fetch().await,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Http(source) => source.describe(),
            Self::File(source) => source.describe(),
        }
    }
}
