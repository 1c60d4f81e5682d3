//! Text Extractor contract and cache (§4.3.3, §6): turns attachment bytes
//! into indexable text, keyed and cached by content hash.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::warn;

/// External binary-file text extraction. Errors are not propagated as
/// [`crate::error::IndexSyncError`] — callers log and treat a failure the
/// same as an extractor that legitimately found no text (§7 `ExtractorError`).
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path, bytes: &[u8]) -> Option<String>;
}

/// Production extractor calling an external HTTP text-extraction service.
pub struct HttpTextExtractor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTextExtractor {
    pub fn new(endpoint: impl Into<String>, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is static and known-valid");
        HttpTextExtractor { client, endpoint: endpoint.into() }
    }
}

#[async_trait]
impl TextExtractor for HttpTextExtractor {
    async fn extract(&self, path: &Path, bytes: &[u8]) -> Option<String> {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("attachment").to_string();
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = match self.client.post(&self.endpoint).multipart(form).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "text extraction request failed");
                return None;
            }
        };
        if !resp.status().is_success() {
            warn!(status = %resp.status(), path = %path.display(), "text extraction service rejected request");
            return None;
        }
        match resp.text().await {
            Ok(text) => {
                let normalized = text.trim().to_string();
                if normalized.is_empty() { None } else { Some(normalized) }
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to read extraction response body");
                None
            }
        }
    }
}

/// A marker stored on disk for a SHA-256 whose extraction legitimately
/// produced no text, so repeat misses on that content don't re-call the
/// extractor (§4.3.3).
const EMPTY_MARKER: &str = "\u{0}EMPTY\u{0}";

/// Object-safe facade over [`CachingExtractor`] so Document Builder can hold
/// one behind an `Arc<dyn _>` regardless of the concrete [`TextExtractor`].
#[async_trait]
pub trait CachedExtraction: Send + Sync {
    async fn extract_cached(&self, path: &Path, bytes: &[u8]) -> Option<String>;
}

/// Filesystem-backed cache in front of a [`TextExtractor`], keyed by the
/// SHA-256 of the file's bytes.
pub struct CachingExtractor<E: TextExtractor> {
    inner: E,
    cache_base: PathBuf,
}

impl<E: TextExtractor> CachingExtractor<E> {
    pub fn new(inner: E, cache_base: impl Into<PathBuf>) -> Self {
        CachingExtractor { inner, cache_base: cache_base.into() }
    }

    fn cache_path(&self, digest: &str) -> PathBuf {
        self.cache_base.join(digest)
    }

    /// Extract text for `bytes` read from `path`, consulting and populating
    /// the cache. I/O and extractor errors yield `None` rather than propagating.
    pub async fn extract_cached(&self, path: &Path, bytes: &[u8]) -> Option<String> {
        let digest = hex_sha256(bytes);
        let cache_path = self.cache_path(&digest);

        match tokio::fs::read_to_string(&cache_path).await {
            Ok(cached) => return if cached == EMPTY_MARKER { None } else { Some(cached) },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(error = %e, path = %cache_path.display(), "extraction cache read failed");
            }
        }

        let extracted = self.inner.extract(path, bytes).await;
        let to_store = extracted.as_deref().unwrap_or(EMPTY_MARKER);
        if let Err(e) = write_cache_entry(&self.cache_base, &cache_path, to_store).await {
            warn!(error = %e, path = %cache_path.display(), "extraction cache write failed");
        }
        extracted
    }
}

#[async_trait]
impl<E: TextExtractor> CachedExtraction for CachingExtractor<E> {
    async fn extract_cached(&self, path: &Path, bytes: &[u8]) -> Option<String> {
        CachingExtractor::extract_cached(self, path, bytes).await
    }
}

async fn write_cache_entry(cache_base: &Path, cache_path: &Path, contents: &str) -> std::io::Result<()> {
    tokio::fs::create_dir_all(cache_base).await?;
    // Idempotent for identical content, so concurrent writers racing on the
    // same digest are safe (§5 "Shared resources").
    tokio::fs::write(cache_path, contents).await
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
