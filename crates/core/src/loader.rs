//! Cache-first document loading.
//!
//! A load asks the source for metadata first (best effort), drops the cached
//! copy if upstream is newer, and then serves from the cache or fetches and
//! caches fresh bytes. Concurrent loads of one id share a single run.

use crate::config::EditorConfig;
use crate::remote::{DocumentSource, HttpSource, OfflineSource, RetrievalError};
use chrono::{DateTime, Utc};
use doc_model::DocumentId;
use pdf_engine::{OpenDocument, PdfEngineError};
use pdf_markup_cache::{InFlight, PersistentCache};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub id: DocumentId,
    pub document: OpenDocument,
    pub display_name: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
    pub from_cache: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error("invalid document: {0}")]
    InvalidDocument(Arc<PdfEngineError>),
}

impl LoadError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoadError::Retrieval(err) if err.is_retryable())
    }
}

type LoadResult = Result<LoadedDocument, LoadError>;

#[derive(Clone)]
pub struct DocumentLoader {
    source: Arc<dyn DocumentSource>,
    cache: Option<PersistentCache>,
    flights: InFlight<DocumentId, LoadResult>,
}

impl fmt::Debug for DocumentLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentLoader")
            .field("cache", &self.cache.as_ref().map(PersistentCache::dir))
            .field("flights", &self.flights)
            .finish_non_exhaustive()
    }
}

impl DocumentLoader {
    pub fn new(source: Arc<dyn DocumentSource>, cache: Option<PersistentCache>) -> Self {
        Self { source, cache, flights: InFlight::new() }
    }

    /// HTTP source when a remote URL is configured, plus the on-disk cache.
    /// A cache that cannot be opened is skipped with a warning.
    pub async fn from_config(config: &EditorConfig) -> Self {
        let source: Arc<dyn DocumentSource> = match &config.remote_url {
            Some(url) => Arc::new(HttpSource::new(url.clone())),
            None => Arc::new(OfflineSource),
        };
        let cache = match PersistentCache::open(&config.cache).await {
            Ok(cache) => Some(cache),
            Err(err) => {
                log::warn!("document cache at {} unavailable: {err}", config.cache.dir.display());
                None
            }
        };
        Self::new(source, cache)
    }

    pub fn cache(&self) -> Option<&PersistentCache> {
        self.cache.as_ref()
    }

    pub fn is_loading(&self, id: &DocumentId) -> bool {
        self.flights.is_pending(id)
    }

    pub async fn load(&self, id: &DocumentId) -> LoadResult {
        let loader = self.clone();
        let key = id.clone();
        let work = move || async move { loader.load_uncollapsed(key).await };
        self.flights.run(id.clone(), work).await
    }

    /// Warms the cache in the background.
    pub fn prefetch(&self, id: DocumentId) -> tokio::task::JoinHandle<()> {
        let loader = self.clone();
        tokio::spawn(async move {
            if let Err(err) = loader.load(&id).await {
                log::debug!("prefetch of {id} failed: {err}");
            }
        })
    }

    /// Replaces the cached copy with freshly exported bytes. Failures are
    /// logged and otherwise ignored.
    pub async fn store_export(&self, id: &DocumentId, bytes: &[u8]) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(err) = cache.put(id, bytes, None).await {
            log::warn!("failed to cache exported copy of {id}: {err}");
        }
    }

    async fn load_uncollapsed(&self, id: DocumentId) -> LoadResult {
        let metadata = match self.source.fetch_metadata(&id).await {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                log::debug!("metadata for {id} unavailable, trusting the cache: {err}");
                None
            }
        };
        let modified_at = metadata.as_ref().and_then(|metadata| metadata.modified_at);
        let display_name = metadata.and_then(|metadata| metadata.name);

        if let Some(cached) = self.load_cached(&id, modified_at).await {
            log::info!("loaded {id} ({} pages) from cache", cached.page_count());
            return Ok(LoadedDocument {
                id,
                document: cached,
                display_name,
                modified_at,
                from_cache: true,
            });
        }

        let bytes = self.source.fetch_bytes(&id).await?;
        let document =
            open_document(bytes).await.map_err(|err| LoadError::InvalidDocument(Arc::new(err)))?;

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.put(&id, document.bytes(), modified_at).await {
                log::warn!("failed to cache {id}: {err}");
            }
        }

        log::info!("loaded {id} ({} pages) from source", document.page_count());
        Ok(LoadedDocument { id, document, display_name, modified_at, from_cache: false })
    }

    async fn load_cached(
        &self,
        id: &DocumentId,
        upstream: Option<DateTime<Utc>>,
    ) -> Option<OpenDocument> {
        let cache = self.cache.as_ref()?;

        if let Some(upstream) = upstream {
            if let Err(err) = cache.invalidate_if_stale(id, upstream).await {
                log::warn!("cache validation for {id} failed: {err}");
            }
        }

        let entry = match cache.get(id).await {
            Ok(entry) => entry?,
            Err(err) => {
                log::warn!("cache read for {id} failed: {err}");
                return None;
            }
        };

        match open_document(entry.payload).await {
            Ok(document) => Some(document),
            Err(err) => {
                log::debug!("cached copy of {id} is unusable, refetching: {err}");
                if let Err(err) = cache.remove(id).await {
                    log::warn!("failed to purge cached copy of {id}: {err}");
                }
                None
            }
        }
    }
}

async fn open_document(bytes: Vec<u8>) -> Result<OpenDocument, PdfEngineError> {
    tokio::task::spawn_blocking(move || OpenDocument::from_bytes(bytes))
        .await
        .map_err(|err| PdfEngineError::Backend(format!("document probe task failed: {err}")))?
}
