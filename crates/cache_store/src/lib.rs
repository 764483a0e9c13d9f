//! Durable key/value JSON persistence with a schema-version envelope.
//!
//! Every value is wrapped as `{schemaVersion, writtenAt, data}`. A read whose
//! envelope is missing, malformed, or carries the wrong schema version is a
//! cache miss, never an error; corruption degrades instead of propagating.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use common::{Error, MonthRequestKey, Result};

/// Bumped whenever the persisted shape changes incompatibly.
pub const SCHEMA_VERSION: u32 = 3;

/// Key for the run manifest aggregate.
pub const MANIFEST_KEY: &str = "aggregates/scrape-metadata.json";
/// Key for the merged per-route dataset aggregate.
pub const DATASET_KEY: &str = "aggregates/flights-dataset.json";

/// Cache key for one raw month fetch.
pub fn month_key(key: &MonthRequestKey) -> String {
    format!("raw-months/{}.json", key.cache_name())
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    schema_version: u32,
    written_at: DateTime<Utc>,
    data: T,
}

/// A successfully read cache entry plus its envelope metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub written_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn age(&self) -> Duration {
        Utc::now() - self.written_at
    }
}

/// File-backed JSON store rooted at the cache directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join("raw-months"))?;
        std::fs::create_dir_all(root.join("aggregates"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Read an entry, returning its data plus envelope write time. Any
    /// corruption (unreadable file, bad JSON, version mismatch) is a miss.
    pub fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let path = self.path(key);
        let raw = std::fs::read_to_string(&path).ok()?;
        let envelope: Envelope<T> = match serde_json::from_str(&raw) {
            Ok(e) => e,
            Err(e) => {
                warn!("cache entry {key} is malformed, treating as miss: {e}");
                return None;
            }
        };
        if envelope.schema_version != SCHEMA_VERSION {
            debug!(
                "cache entry {key} has schema v{}, want v{SCHEMA_VERSION}: miss",
                envelope.schema_version
            );
            return None;
        }
        Some(CacheEntry {
            data: envelope.data,
            written_at: envelope.written_at,
        })
    }

    /// Read just the data.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.read_entry(key).map(|e| e.data)
    }

    /// Read with an extra shape check; a failing check is a miss.
    pub fn read_valid<T, F>(&self, key: &str, validate: F) -> Option<CacheEntry<T>>
    where
        T: DeserializeOwned,
        F: FnOnce(&T) -> bool,
    {
        let entry = self.read_entry(key)?;
        if validate(&entry.data) {
            Some(entry)
        } else {
            debug!("cache entry {key} failed shape validation: miss");
            None
        }
    }

    /// Write a value under the current schema version, stamped now.
    pub fn write<T: Serialize>(&self, key: &str, data: &T) -> Result<()> {
        self.write_at(key, data, Utc::now())
    }

    /// Write with an explicit envelope timestamp. Upgrade-writes use this to
    /// keep the original write time, so rewriting an entry in place never
    /// extends its freshness.
    pub fn write_at<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        written_at: DateTime<Utc>,
    ) -> Result<()> {
        let envelope = Envelope {
            schema_version: SCHEMA_VERSION,
            written_at,
            data,
        };
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(&envelope)?;
        std::fs::write(&path, body)
            .map_err(|e| Error::Cache(format!("writing {}: {e}", path.display())))
    }

    /// A readable, schema-current entry exists for the key.
    pub fn exists(&self, key: &str) -> bool {
        self.read_entry::<serde_json::Value>(key).is_some()
    }

    /// Age of a valid entry, from its envelope write time.
    pub fn age(&self, key: &str) -> Option<Duration> {
        self.read_entry::<serde_json::Value>(key).map(|e| e.age())
    }
}

/// The month-entry validity rule shared by the freshness oracle and the
/// fetch protocol's authoritative re-check: the entry must exist under the
/// current schema, contain no cabin priced without a seat count (the marker
/// left by the pre-seat-count schema), and be younger than the freshness
/// window.
pub fn fresh_month_entry(
    store: &CacheStore,
    key: &MonthRequestKey,
    freshness: Duration,
) -> Option<CacheEntry<common::MonthAvailability>> {
    let entry = store.read_valid::<common::MonthAvailability, _>(&month_key(key), |days| {
        !days.values().any(|d| d.has_legacy_cabin())
    })?;
    (entry.age() <= freshness).then_some(entry)
}
