//! Hover previews: rendered sample citations for one style.
//!
//! Previews are independent of search state. A failed fetch is reported to
//! the caller for that style only and leaves the cache untouched.

use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SearchConfig;

const PREVIEW_PATH: &str = "/styles-files/previews/combined";

/// Rendered sample output of a style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    #[serde(default)]
    pub citation: Vec<String>,
    /// HTML fragment.
    #[serde(default)]
    pub bibliography: String,
}

#[derive(Debug, Error)]
pub enum PreviewFetchError {
    #[error("failed to build preview client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("preview request for {style} failed: {source}")]
    Http {
        style: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("preview for {style} returned HTTP {status}")]
    Status { style: String, status: u16 },
    #[error("preview for {style} is malformed: {source}")]
    Decode {
        style: String,
        #[source]
        source: serde_json::Error,
    },
}

type PreviewKey = (String, bool);

pub struct PreviewClient {
    client: Client,
    base_url: String,
    cache: Mutex<LruCache<PreviewKey, Arc<Preview>>>,
}

impl PreviewClient {
    pub fn new(config: &SearchConfig) -> Result<Self, PreviewFetchError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("stylesearch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(PreviewFetchError::Client)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cache: Mutex::new(LruCache::new(config.preview_cache)),
        })
    }

    /// Location of the combined preview document for a style.
    pub fn preview_url(&self, name: &str, dependent: bool) -> String {
        let subdir = if dependent { "dependent/" } else { "" };
        format!(
            "{}{PREVIEW_PATH}/{subdir}{}.json",
            self.base_url,
            urlencoding::encode(name)
        )
    }

    pub fn cached(&self, name: &str, dependent: bool) -> Option<Arc<Preview>> {
        self.cache.lock().get(&(name.to_string(), dependent)).cloned()
    }

    /// Fetch a preview, serving repeats from the cache.
    pub async fn fetch(&self, name: &str, dependent: bool) -> Result<Arc<Preview>, PreviewFetchError> {
        if let Some(hit) = self.cached(name, dependent) {
            debug!(style = name, dependent, "preview cache hit");
            return Ok(hit);
        }

        let url = self.preview_url(name, dependent);
        let preview = self.download(name, &url).await.inspect_err(|err| {
            warn!(style = name, dependent, error = %err, "preview fetch failed");
        })?;
        let preview = Arc::new(preview);
        self.cache
            .lock()
            .put((name.to_string(), dependent), Arc::clone(&preview));
        Ok(preview)
    }

    /// Drop a cached preview. Returns whether one was cached.
    pub fn forget(&self, name: &str, dependent: bool) -> bool {
        self.cache.lock().pop(&(name.to_string(), dependent)).is_some()
    }

    async fn download(&self, name: &str, url: &str) -> Result<Preview, PreviewFetchError> {
        let http_err = |source| PreviewFetchError::Http {
            style: name.to_string(),
            source,
        };
        let response = self.client.get(url).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(PreviewFetchError::Status {
                style: name.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await.map_err(http_err)?;
        serde_json::from_slice(&body).map_err(|source| PreviewFetchError::Decode {
            style: name.to_string(),
            source,
        })
    }
}
