//! Persistent document cache keyed by document id.
//!
//! Each document lives in its own file named after a stable hash of its id:
//!
//! ```text
//! "PMKCACHE" | header length (u32 LE) | JSON header | payload
//! ```
//!
//! The header records the id, capture time, upstream modification time and
//! payload length. Writes go to a temporary file that is renamed into place,
//! so a reader never sees a half-written entry.

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use chrono::{DateTime, Utc};
use doc_model::DocumentId;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;

const MAGIC: &[u8; 8] = b"PMKCACHE";
const ENTRY_EXTENSION: &str = "entry";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Reasons a cache file could not be decoded. Never surfaced to callers:
/// the entry is dropped and the lookup reports a miss.
#[derive(Debug, thiserror::Error)]
pub enum CacheCorruption {
    #[error("missing magic tag")]
    BadMagic,
    #[error("entry is truncated")]
    Truncated,
    #[error("malformed header: {0}")]
    Header(#[from] serde_json::Error),
    #[error("entry belongs to {0}")]
    ForeignId(DocumentId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub id: DocumentId,
    pub payload: Vec<u8>,
    pub captured_at: DateTime<Utc>,
    pub upstream_modified_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Timestamp compared against upstream; the capture time when upstream never reported one.
    pub fn effective_upstream(&self) -> DateTime<Utc> {
        self.upstream_modified_at.unwrap_or(self.captured_at)
    }
}

/// Counters for monitoring cache behavior
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped for exceeding the TTL
    pub expired: u64,
    /// Entries dropped because they failed to decode
    pub corrupt: u64,
    pub writes: u64,
}

impl CacheStats {
    /// Cache hit rate from 0.0 to 1.0
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Serialize, Deserialize)]
struct EntryHeader {
    id: DocumentId,
    captured_at: DateTime<Utc>,
    upstream_modified_at: Option<DateTime<Utc>>,
    payload_len: u64,
}

/// Durable byte store with a freshness window.
///
/// Cloning shares the underlying state; every operation is serialized behind
/// one lock so the cache has a single writer at a time.
#[derive(Debug, Clone)]
pub struct PersistentCache {
    dir: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    stats: Arc<Mutex<CacheStats>>,
}

impl PersistentCache {
    pub async fn open(config: &CacheConfig) -> Result<Self, CacheError> {
        Self::with_clock(&config.dir, config.ttl(), Arc::new(SystemClock)).await
    }

    pub async fn with_clock(
        dir: impl AsRef<Path>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;

        Ok(Self { dir, ttl, clock, stats: Arc::new(Mutex::new(CacheStats::default())) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// File backing the entry for `id`.
    pub fn path_for(&self, id: &DocumentId) -> PathBuf {
        self.dir.join(format!("{:016x}.{ENTRY_EXTENSION}", fnv1a(id.as_str().as_bytes())))
    }

    /// Returns the entry if present and younger than the TTL. Expired and
    /// undecodable entries are purged and reported as a miss.
    pub async fn get(&self, id: &DocumentId) -> Result<Option<CacheEntry>, CacheError> {
        let mut stats = self.stats.lock().await;
        let entry = self.read_fresh(id, &mut stats).await?;

        if entry.is_some() {
            stats.hits += 1;
            log::debug!("cache hit for {id}");
        } else {
            stats.misses += 1;
            log::debug!("cache miss for {id}");
        }

        Ok(entry)
    }

    /// Stores `payload` for `id`, replacing any previous entry.
    pub async fn put(
        &self,
        id: &DocumentId,
        payload: &[u8],
        upstream_modified_at: Option<DateTime<Utc>>,
    ) -> Result<(), CacheError> {
        let mut stats = self.stats.lock().await;

        let header = EntryHeader {
            id: id.clone(),
            captured_at: self.clock.now(),
            upstream_modified_at,
            payload_len: payload.len() as u64,
        };
        let bytes = encode_entry(&header, payload)?;

        let path = self.path_for(id);
        let temp = path.with_extension("tmp");
        fs::write(&temp, &bytes).await?;
        if let Err(err) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(err.into());
        }

        stats.writes += 1;
        log::debug!("cached {} bytes for {id}", payload.len());
        Ok(())
    }

    /// Whether the cached copy is at least as new as `upstream`. Ties favor the cache.
    pub async fn is_valid(
        &self,
        id: &DocumentId,
        upstream: DateTime<Utc>,
    ) -> Result<bool, CacheError> {
        let mut stats = self.stats.lock().await;
        let entry = self.read_fresh(id, &mut stats).await?;

        Ok(entry.is_some_and(|entry| entry.effective_upstream() >= upstream))
    }

    /// Purges the entry when `upstream` is strictly newer than the cached copy.
    /// Returns whether an entry was removed.
    pub async fn invalidate_if_stale(
        &self,
        id: &DocumentId,
        upstream: DateTime<Utc>,
    ) -> Result<bool, CacheError> {
        let mut stats = self.stats.lock().await;

        match self.read_fresh(id, &mut stats).await? {
            Some(entry) if entry.effective_upstream() < upstream => {
                log::debug!(
                    "upstream copy of {id} changed at {upstream}, dropping cached copy from {}",
                    entry.effective_upstream()
                );
                remove_file(&self.path_for(id)).await
            }
            _ => Ok(false),
        }
    }

    pub async fn remove(&self, id: &DocumentId) -> Result<bool, CacheError> {
        let _stats = self.stats.lock().await;
        remove_file(&self.path_for(id)).await
    }

    /// Removes every entry. Returns how many were removed.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let _stats = self.stats.lock().await;

        let mut removed = 0;
        for path in self.entry_files().await? {
            if remove_file(&path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Removes expired and undecodable entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<usize, CacheError> {
        let mut stats = self.stats.lock().await;

        let mut removed = 0;
        for path in self.entry_files().await? {
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };

            let stale = match decode_entry(&bytes) {
                Ok(entry) => {
                    let expired = self.is_expired(&entry);
                    if expired {
                        stats.expired += 1;
                    }
                    expired
                }
                Err(corruption) => {
                    log::debug!("purging corrupt cache file {}: {corruption}", path.display());
                    stats.corrupt += 1;
                    true
                }
            };

            if stale && remove_file(&path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.lock().await.clone()
    }

    async fn read_fresh(
        &self,
        id: &DocumentId,
        stats: &mut CacheStats,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.path_for(id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let decoded = decode_entry(&bytes).and_then(|entry| {
            if entry.id == *id {
                Ok(entry)
            } else {
                Err(CacheCorruption::ForeignId(entry.id))
            }
        });

        let entry = match decoded {
            Ok(entry) => entry,
            Err(corruption) => {
                log::debug!("discarding cache entry for {id}: {corruption}");
                stats.corrupt += 1;
                remove_file(&path).await?;
                return Ok(None);
            }
        };

        if self.is_expired(&entry) {
            log::debug!("cache entry for {id} captured at {} expired", entry.captured_at);
            stats.expired += 1;
            remove_file(&path).await?;
            return Ok(None);
        }

        Ok(Some(entry))
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        // An entry stamped in the future counts as brand new.
        let age = (self.clock.now() - entry.captured_at).to_std().unwrap_or_default();
        age >= self.ttl
    }

    async fn entry_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut files = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

fn encode_entry(header: &EntryHeader, payload: &[u8]) -> Result<Vec<u8>, serde_json::Error> {
    let header = serde_json::to_vec(header)?;

    let mut bytes = Vec::with_capacity(MAGIC.len() + 4 + header.len() + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&(header.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(payload);
    Ok(bytes)
}

fn decode_entry(bytes: &[u8]) -> Result<CacheEntry, CacheCorruption> {
    let rest = bytes.strip_prefix(MAGIC.as_slice()).ok_or(CacheCorruption::BadMagic)?;
    if rest.len() < 4 {
        return Err(CacheCorruption::Truncated);
    }

    let (len, rest) = rest.split_at(4);
    let header_len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;
    if rest.len() < header_len {
        return Err(CacheCorruption::Truncated);
    }

    let (header, payload) = rest.split_at(header_len);
    let header: EntryHeader = serde_json::from_slice(header)?;
    if payload.len() as u64 != header.payload_len {
        return Err(CacheCorruption::Truncated);
    }

    Ok(CacheEntry {
        id: header.id,
        payload: payload.to_vec(),
        captured_at: header.captured_at,
        upstream_modified_at: header.upstream_modified_at,
    })
}

/// Deletes `path`. Returns `false` when there was nothing to delete.
async fn remove_file(path: &Path) -> Result<bool, CacheError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325_u64;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
