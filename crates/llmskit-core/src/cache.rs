//! Domain-keyed cache of parsed llms.txt documents.
//!
//! [`DocumentCache`] is the in-memory tier: TTL-bounded entries, LRU
//! eviction at a configurable capacity, and stale-while-revalidate reads.
//! An optional [`CacheStore`] provides write-through persistence; on an
//! in-memory miss the store is consulted and hits are promoted back into
//! memory (re-parsed, so the materialized document always reflects the
//! current parser).
//!
//! ## Concurrency
//!
//! The cache is safe for concurrent use from multiple tasks. Reads share an
//! `RwLock` read guard and record recency through an atomic access stamp,
//! so they do not block each other; writes take the lock only around the
//! map mutation and never across backing-store I/O.
//!
//! ## Stale-while-revalidate
//!
//! With SWR enabled (the default), `get` on an expired entry still returns
//! it; the caller observes `is_expired()` and decides whether to use the
//! stale document while refreshing. The cache never schedules revalidation
//! itself. With SWR disabled, expired entries read as absent.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::{CacheStore, StoredEntry};
use crate::validator::ValidationReport;
use crate::{Document, Error, FetchResult, FetchStatus, LlmsParser, Result};

/// Default maximum number of in-memory entries.
const DEFAULT_MAX_ENTRIES: usize = 256;

/// Default time-to-live for cached documents.
const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Configuration for [`DocumentCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on in-memory entries; the least recently accessed entry
    /// is evicted when an insert would exceed it.
    pub max_entries: usize,
    /// How long an entry stays fresh after `set`.
    pub ttl: Duration,
    /// Whether `get` returns expired entries (marked expired) instead of
    /// treating them as missing.
    pub stale_while_revalidate: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: DEFAULT_TTL,
            stale_while_revalidate: true,
        }
    }
}

/// Serializable projection of a [`FetchResult`] kept with each cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchSummary {
    /// Outcome category of the originating fetch.
    pub status: FetchStatus,
    /// HTTP status code, when one was received.
    pub status_code: Option<u16>,
    /// Total fetch duration in milliseconds.
    pub duration_ms: u64,
    /// The fetched domain.
    pub domain: String,
}

impl From<&FetchResult> for FetchSummary {
    fn from(result: &FetchResult) -> Self {
        Self {
            status: result.status,
            status_code: result.http_status,
            duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            domain: result.domain.clone(),
        }
    }
}

/// One cached document with its fetch metadata.
///
/// Entries are immutable values; only the access timestamp changes over an
/// entry's lifetime, and that mutation is the cache's private concern.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The parsed document.
    pub document: Document,
    /// Original llms.txt content, kept for persistence and re-parsing.
    pub raw_content: String,
    /// Validation results, when the caller ran the validator.
    pub validation: Option<ValidationReport>,
    /// When the content was fetched.
    pub fetched_at: DateTime<Utc>,
    /// When the entry stops being fresh. Always `fetched_at + ttl` at the
    /// moment of `set`.
    pub expires_at: DateTime<Utc>,
    /// Response headers from the originating fetch (lowercased names).
    pub http_headers: BTreeMap<String, String>,
    /// Fetch metadata projection.
    pub fetch: FetchSummary,
    /// When the entry was last read through `get`.
    pub last_accessed_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Build an entry from a successful fetch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Other`] if the fetch did not produce a document.
    pub fn from_fetch(result: &FetchResult, ttl: Duration) -> Result<Self> {
        let document = result
            .document
            .clone()
            .ok_or_else(|| Error::Other("cannot cache a fetch without a document".to_string()))?;
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| Error::Other(format!("TTL out of range: {e}")))?;

        Ok(Self {
            raw_content: result.raw_content.clone().unwrap_or_default(),
            document,
            validation: None,
            fetched_at: now,
            expires_at: now + ttl,
            http_headers: result.headers.clone(),
            fetch: FetchSummary::from(result),
            last_accessed_at: now,
        })
    }

    /// Attach a validation report.
    #[must_use]
    pub fn with_validation(mut self, report: ValidationReport) -> Self {
        self.validation = Some(report);
        self
    }

    /// Whether the entry's TTL has elapsed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Map slot: the immutable entry plus its atomic access stamp, so reads
/// can record recency without a write lock.
struct Slot {
    entry: CacheEntry,
    last_accessed_ms: AtomicI64,
}

impl Slot {
    fn new(entry: CacheEntry) -> Self {
        let stamp = entry.last_accessed_at.timestamp_millis();
        Self {
            entry,
            last_accessed_ms: AtomicI64::new(stamp),
        }
    }
}

/// Thread-safe, domain-keyed document cache.
///
/// Keys are compared case-insensitively. See the module docs for the
/// eviction, persistence, and staleness semantics.
pub struct DocumentCache {
    config: CacheConfig,
    map: RwLock<HashMap<String, Arc<Slot>>>,
    store: Option<Arc<dyn CacheStore>>,
    parser: LlmsParser,
}

impl DocumentCache {
    /// Create an in-memory-only cache.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            map: RwLock::new(HashMap::new()),
            store: None,
            parser: LlmsParser::new(),
        }
    }

    /// Create a cache with write-through persistence.
    #[must_use]
    pub fn with_store(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        Self {
            config,
            map: RwLock::new(HashMap::new()),
            store: Some(store),
            parser: LlmsParser::new(),
        }
    }

    /// Look up the entry for `domain`.
    ///
    /// Hits (including stale-but-returned hits under SWR) update the
    /// entry's access time. On an in-memory miss, the backing store is
    /// consulted and a hit is promoted into memory.
    pub async fn get(&self, domain: &str) -> Option<CacheEntry> {
        let key = domain.to_ascii_lowercase();
        let now = Utc::now();

        let slot = {
            #[allow(clippy::unwrap_used)]
            let map = self.map.read().unwrap();
            map.get(&key).map(Arc::clone)
        };

        if let Some(slot) = slot {
            if slot.entry.is_expired_at(now) && !self.config.stale_while_revalidate {
                debug!(domain = key, "expired entry hidden (SWR disabled)");
                return None;
            }
            slot.last_accessed_ms
                .store(now.timestamp_millis(), Ordering::Relaxed);
            let mut entry = slot.entry.clone();
            entry.last_accessed_at = now;
            return Some(entry);
        }

        self.get_from_store(&key, now).await
    }

    /// Insert or replace the entry for `domain`.
    ///
    /// Eviction happens under the map lock; the write-through to the
    /// backing store happens after the lock is released.
    pub async fn set(&self, domain: &str, entry: CacheEntry) -> Result<()> {
        let key = domain.to_ascii_lowercase();
        let stored = self.store.is_some().then(|| to_stored(&entry));

        {
            #[allow(clippy::unwrap_used)]
            let mut map = self.map.write().unwrap();
            map.insert(key.clone(), Arc::new(Slot::new(entry)));
            Self::evict_locked(&mut map, self.config.max_entries);
        }

        if let (Some(store), Some(stored)) = (self.store.as_ref(), stored) {
            store.save(&key, &stored).await?;
        }
        Ok(())
    }

    /// Remove the entry for `domain` from both tiers.
    pub async fn invalidate(&self, domain: &str) -> Result<()> {
        let key = domain.to_ascii_lowercase();
        {
            #[allow(clippy::unwrap_used)]
            let mut map = self.map.write().unwrap();
            map.remove(&key);
        }
        if let Some(store) = self.store.as_ref() {
            store.remove(&key).await?;
        }
        Ok(())
    }

    /// Remove every entry from both tiers.
    pub async fn clear(&self) -> Result<()> {
        {
            #[allow(clippy::unwrap_used)]
            let mut map = self.map.write().unwrap();
            map.clear();
        }
        if let Some(store) = self.store.as_ref() {
            store.clear().await?;
        }
        Ok(())
    }

    /// Number of entries currently held in memory.
    #[must_use]
    pub fn len(&self) -> usize {
        #[allow(clippy::unwrap_used)]
        let map = self.map.read().unwrap();
        map.len()
    }

    /// Whether the in-memory tier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn get_from_store(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let store = self.store.as_ref()?;
        let stored = match store.load(key).await {
            Ok(found) => found?,
            Err(e) => {
                warn!(domain = key, error = %e, "backing store read failed");
                return None;
            },
        };

        let mut entry = self.rehydrate(stored);
        if entry.is_expired_at(now) && !self.config.stale_while_revalidate {
            return None;
        }
        entry.last_accessed_at = now;

        {
            #[allow(clippy::unwrap_used)]
            let mut map = self.map.write().unwrap();
            map.insert(key.to_string(), Arc::new(Slot::new(entry.clone())));
            Self::evict_locked(&mut map, self.config.max_entries);
        }
        debug!(domain = key, "promoted entry from backing store");
        Some(entry)
    }

    /// Materialize a persisted payload, re-parsing the raw content so the
    /// document reflects the current parser.
    fn rehydrate(&self, stored: StoredEntry) -> CacheEntry {
        CacheEntry {
            document: self.parser.parse(&stored.raw_content),
            raw_content: stored.raw_content,
            validation: None,
            fetched_at: stored.fetched_at,
            expires_at: stored.expires_at,
            http_headers: stored.http_headers,
            fetch: stored.fetch_result,
            last_accessed_at: stored.last_accessed_at,
        }
    }

    /// Evict least-recently-accessed slots until the map fits the bound.
    ///
    /// Memory-tier only: persisted forms of evicted entries remain until
    /// explicitly invalidated.
    fn evict_locked(map: &mut HashMap<String, Arc<Slot>>, max_entries: usize) {
        while map.len() > max_entries {
            let victim = map
                .iter()
                .min_by_key(|(_, slot)| slot.last_accessed_ms.load(Ordering::Relaxed))
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    debug!(domain = key, "evicting least recently accessed entry");
                    map.remove(&key);
                },
                None => break,
            }
        }
    }
}

fn to_stored(entry: &CacheEntry) -> StoredEntry {
    StoredEntry {
        raw_content: entry.raw_content.clone(),
        fetched_at: entry.fetched_at,
        expires_at: entry.expires_at,
        http_headers: entry.http_headers.clone(),
        fetch_result: entry.fetch.clone(),
        last_accessed_at: entry.last_accessed_at,
    }
}
