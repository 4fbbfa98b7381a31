//! Persistent backing stores for the document cache.
//!
//! The [`CacheStore`] trait is the only contract between the cache and
//! durable storage: `save`/`load`/`remove`/`clear` over serialized
//! [`StoredEntry`] payloads. The bundled [`FileStore`] keeps one JSON file
//! per domain with atomic writes (temp file + rename); an in-process map or
//! a remote key-value store are equally valid implementations.
//!
//! Persisted payloads carry the raw llms.txt content rather than the parsed
//! document, so loads are re-parsed and always reflect the current parser.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::cache::FetchSummary;
use crate::{Error, Result};

/// Characters percent-escaped out of cache file names.
///
/// Covers path separators and the characters Windows rejects, plus `%`
/// itself so the escaping stays unambiguous.
const FS_UNSAFE: &AsciiSet = &CONTROLS
    .add(b'%')
    .add(b'/')
    .add(b'\\')
    .add(b':')
    .add(b'*')
    .add(b'?')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'|')
    .add(b' ');

/// Serialized form of a cache entry.
///
/// Field names are the wire contract of the persisted cache format; the
/// parsed document is deliberately absent and is rebuilt from `raw_content`
/// on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEntry {
    /// Original llms.txt bytes; re-parsed on load.
    pub raw_content: String,
    /// When the content was fetched (RFC 3339 UTC).
    pub fetched_at: DateTime<Utc>,
    /// When the entry expires (RFC 3339 UTC).
    pub expires_at: DateTime<Utc>,
    /// Response headers with lowercased names.
    pub http_headers: BTreeMap<String, String>,
    /// Fetch metadata projection (status, status code, duration, domain).
    pub fetch_result: FetchSummary,
    /// Last access time at the moment of persistence (RFC 3339 UTC).
    pub last_accessed_at: DateTime<Utc>,
}

/// Contract between [`DocumentCache`](crate::DocumentCache) and durable
/// storage.
///
/// Implementations must tolerate concurrent writers to distinct keys;
/// concurrent writers to the same key resolve last-writer-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Persist `entry` under `key`, replacing any previous value.
    async fn save(&self, key: &str, entry: &StoredEntry) -> Result<()>;

    /// Load the entry for `key`, or `None` when absent or unreadable.
    async fn load(&self, key: &str) -> Result<Option<StoredEntry>>;

    /// Remove the entry for `key`. Absence is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove every entry.
    async fn clear(&self) -> Result<()>;
}

/// File-backed [`CacheStore`]: one JSON file per domain.
///
/// File names are the lowercased domain with filesystem-unsafe characters
/// percent-escaped. Writes go through a temp file and rename so a crash
/// mid-write never leaves a half-written payload behind.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// first save.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory holding the entry files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name = utf8_percent_encode(&key.to_ascii_lowercase(), FS_UNSAFE).to_string();
        self.root.join(format!("{name}.json"))
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn save(&self, key: &str, entry: &StoredEntry) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::Storage(format!("Failed to create store directory: {e}")))?;

        let path = self.path_for(key);
        let json = serde_json::to_string_pretty(entry)
            .map_err(|e| Error::Storage(format!("Failed to serialize cache entry: {e}")))?;

        // Atomic write: temp file + rename
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write temp cache file: {e}")))?;

        // Handle Windows: remove target before rename
        #[cfg(target_os = "windows")]
        if fs::try_exists(&path).await.unwrap_or(false) {
            fs::remove_file(&path)
                .await
                .map_err(|e| Error::Storage(format!("Failed to remove existing entry: {e}")))?;
        }

        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to commit cache file: {e}")))?;

        debug!(key, "persisted cache entry");
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<StoredEntry>> {
        let path = self.path_for(key);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Storage(format!(
                    "Failed to read cache file for '{key}': {e}"
                )));
            },
        };

        match serde_json::from_str::<StoredEntry>(&json) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                // Corrupt payloads are a miss, not a failure; the file is
                // left in place for inspection.
                warn!(key, error = %e, "corrupt cache file treated as miss");
                Ok(None)
            },
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!(
                "Failed to remove cache file for '{key}': {e}"
            ))),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(Error::Storage(format!(
                    "Failed to read store directory: {e}"
                )));
            },
        };

        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| Error::Storage(format!("Failed to list store directory: {e}")))?
        {
            let path = item.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                fs::remove_file(&path)
                    .await
                    .map_err(|e| Error::Storage(format!("Failed to remove cache file: {e}")))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::FetchStatus;
    use tempfile::TempDir;

    fn sample_entry(domain: &str) -> StoredEntry {
        let now = Utc::now();
        let mut headers = BTreeMap::new();
        headers.insert("etag".to_string(), "\"abc\"".to_string());
        headers.insert("content-type".to_string(), "text/markdown".to_string());

        StoredEntry {
            raw_content: "# Site\n> s\n## Docs\n- [G](https://x/g.md): guide\n".to_string(),
            fetched_at: now,
            expires_at: now + chrono::Duration::hours(1),
            http_headers: headers,
            fetch_result: FetchSummary {
                status: FetchStatus::Success,
                status_code: Some(200),
                duration_ms: 42,
                domain: domain.to_string(),
            },
            last_accessed_at: now,
        }
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        let entry = sample_entry("example.com");
        store.save("example.com", &entry).await.unwrap();

        let loaded = store.load("example.com").await.unwrap().unwrap();
        assert_eq!(loaded.raw_content, entry.raw_content);
        assert_eq!(loaded.http_headers, entry.http_headers);
        assert_eq!(loaded.fetch_result, entry.fetch_result);
        // RFC 3339 serialization keeps sub-second precision, but the
        // contract only promises seconds.
        assert_eq!(loaded.fetched_at.timestamp(), entry.fetched_at.timestamp());
        assert_eq!(loaded.expires_at.timestamp(), entry.expires_at.timestamp());
        assert_eq!(
            loaded.last_accessed_at.timestamp(),
            entry.last_accessed_at.timestamp()
        );
    }

    #[tokio::test]
    async fn test_load_missing_key_is_none() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        assert!(store.load("nothing.test").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_filenames_are_lowercased_and_escaped() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        store
            .save("Docs.Example.COM:8080", &sample_entry("docs.example.com:8080"))
            .await
            .unwrap();

        let expected = temp.path().join("docs.example.com%3A8080.json");
        assert!(expected.exists());

        // Case-insensitive key identity follows from the lowercasing.
        assert!(
            store
                .load("docs.example.com:8080")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_miss_and_left_in_place() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        let path = temp.path().join("broken.test.json");
        std::fs::write(&path, "{not valid json").unwrap();

        assert!(store.load("broken.test").await.unwrap().is_none());
        assert!(path.exists(), "corrupt file must not be deleted");
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        store.save("a.test", &sample_entry("a.test")).await.unwrap();
        store.remove("a.test").await.unwrap();
        assert!(store.load("a.test").await.unwrap().is_none());

        // Removing again is fine.
        store.remove("a.test").await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_removes_all_entries() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        store.save("a.test", &sample_entry("a.test")).await.unwrap();
        store.save("b.test", &sample_entry("b.test")).await.unwrap();

        store.clear().await.unwrap();
        assert!(store.load("a.test").await.unwrap().is_none());
        assert!(store.load("b.test").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_tmp_files() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        store.save("a.test", &sample_entry("a.test")).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(std::result::Result::ok)
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext == "tmp")
            })
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_is_last_writer_wins() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        let mut first = sample_entry("a.test");
        first.raw_content = "# First\n".to_string();
        store.save("a.test", &first).await.unwrap();

        let mut second = sample_entry("a.test");
        second.raw_content = "# Second\n".to_string();
        store.save("a.test", &second).await.unwrap();

        let loaded = store.load("a.test").await.unwrap().unwrap();
        assert_eq!(loaded.raw_content, "# Second\n");
    }

    #[test]
    fn test_stored_entry_serializes_camel_case() {
        let entry = sample_entry("example.com");
        let json = serde_json::to_value(&entry).unwrap();

        assert!(json.get("rawContent").is_some());
        assert!(json.get("fetchedAt").is_some());
        assert!(json.get("expiresAt").is_some());
        assert!(json.get("httpHeaders").is_some());
        assert!(json.get("lastAccessedAt").is_some());
        let fetch = json.get("fetchResult").unwrap();
        assert!(fetch.get("status").is_some());
        assert!(fetch.get("statusCode").is_some());
        assert!(fetch.get("durationMs").is_some());
        assert!(fetch.get("domain").is_some());
    }
}
