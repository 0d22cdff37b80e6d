// Data sources - local files or HTTP endpoints
// Every external resource (alias CSV, generation list, geometry, prices)
// is addressed through a Source so the same loader works offline and live.

use crate::error::{LoadError, Result};
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Http(String),
}

impl Source {
    /// Parse a source string: `http://` / `https://` become URLs, anything
    /// else is treated as a filesystem path.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(LoadError::InvalidSource("empty source".to_string()));
        }

        let lower = raw.to_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(Source::Http(raw.to_string()));
        }

        if lower.contains("://") {
            return Err(LoadError::InvalidSource(format!(
                "unsupported scheme: {}",
                raw
            )));
        }

        Ok(Source::File(PathBuf::from(raw)))
    }

    /// Fetch the whole resource as text
    pub async fn fetch_text(&self) -> Result<String> {
        match self {
            Source::File(path) => {
                debug!(path = %path.display(), "reading source file");
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| LoadError::Io {
                        path: path.display().to_string(),
                        source,
                    })
            }
            Source::Http(url) => {
                debug!(%url, "fetching source");
                let text = reqwest::get(url.as_str())
                    .await?
                    .error_for_status()?
                    .text()
                    .await?;
                Ok(text)
            }
        }
    }

    /// Fetch and decode a JSON resource
    pub async fn fetch_json<T: DeserializeOwned>(&self) -> Result<T> {
        let text = self.fetch_text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Same resource with a cache-busting query parameter.
    ///
    /// Only URLs are affected; the price feed is re-fetched on a timer and
    /// intermediate caches must not serve a stale copy.
    pub fn cache_busted(&self, stamp: i64) -> Source {
        match self {
            Source::File(_) => self.clone(),
            Source::Http(url) => {
                let sep = if url.contains('?') { '&' } else { '?' };
                Source::Http(format!("{}{}{}", url, sep, stamp))
            }
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Http(url) => write!(f, "{}", url),
        }
    }
}
