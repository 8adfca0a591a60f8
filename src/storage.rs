//! Versioned key-value storage using RocksDB
//!
//! Every stored value carries the version of the commit that wrote it. A commit
//! is an [`AtomicWrite`]: a list of version checks plus a list of mutations that
//! is applied all-or-nothing. When any check fails the commit is rejected with
//! [`CommitOutcome::Conflict`] and nothing is written.

use crate::{
    config::{CompressionType, StorageConfig},
    errors::{LedgerResult, StorageError},
};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::BTreeMap,
    ops::Bound,
    path::Path,
    sync::{Arc, Mutex, RwLock},
};

/// Monotonic commit version assigned by the store
pub type Version = u64;

/// Shared handle used by every service
pub type SharedStore = Arc<dyn KvStore>;

/// Key holding the last assigned commit version (RocksDB only)
const VERSION_COUNTER_KEY: &[u8] = b"meta/version";

/// Raw value together with the version of the commit that wrote it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedBytes {
    pub version: Version,
    pub value: Vec<u8>,
}

/// Decoded value together with its version token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: Version,
    pub value: T,
}

#[derive(Clone, Debug)]
pub enum Mutation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// All-or-nothing write conditioned on the versions of a set of keys
#[derive(Clone, Debug, Default)]
pub struct AtomicWrite {
    checks: Vec<(Vec<u8>, Option<Version>)>,
    mutations: Vec<Mutation>,
}

impl AtomicWrite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to still be at `expected` (`None` means the key must be absent)
    pub fn check(&mut self, key: impl Into<Vec<u8>>, expected: Option<Version>) -> &mut Self {
        self.checks.push((key.into(), expected));
        self
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: Vec<u8>) -> &mut Self {
        self.mutations.push(Mutation::Put {
            key: key.into(),
            value,
        });
        self
    }

    pub fn put_json<T: Serialize>(
        &mut self,
        key: impl Into<Vec<u8>>,
        value: &T,
    ) -> LedgerResult<&mut Self> {
        let key = key.into();
        let bytes = serde_json::to_vec(value).map_err(|e| {
            StorageError::WriteFailed(format!(
                "Failed to encode value for key {}: {}",
                String::from_utf8_lossy(&key),
                e
            ))
        })?;
        Ok(self.put(key, bytes))
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.mutations.push(Mutation::Delete { key: key.into() });
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(Version),
    /// A checked key changed since it was read
    Conflict,
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed(_))
    }
}

/// Store contract the ledger relies on: point reads, ordered prefix scans and
/// conditioned multi-key commits.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> LedgerResult<Option<VersionedBytes>>;

    /// Keys under `prefix` in ascending order, strictly after `start_after` when given
    fn scan_prefix(
        &self,
        prefix: &[u8],
        start_after: Option<&[u8]>,
        limit: usize,
    ) -> LedgerResult<Vec<(Vec<u8>, VersionedBytes)>>;

    fn commit(&self, write: AtomicWrite) -> LedgerResult<CommitOutcome>;
}

/// Read and decode a JSON value with its version token
pub fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &[u8],
) -> LedgerResult<Option<Versioned<T>>> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    let value = decode_json(key, &raw.value)?;
    Ok(Some(Versioned {
        version: raw.version,
        value,
    }))
}

pub fn decode_json<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> LedgerResult<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        StorageError::CorruptedData(format!(
            "Failed to decode value at {}: {}",
            String::from_utf8_lossy(key),
            e
        ))
        .into()
    })
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
struct MemoryInner {
    entries: BTreeMap<Vec<u8>, VersionedBytes>,
    last_version: Version,
}

/// Ordered in-memory store for tests and ephemeral deployments
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> LedgerResult<Option<VersionedBytes>> {
        let inner = self.inner.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(inner.entries.get(key).cloned())
    }

    fn scan_prefix(
        &self,
        prefix: &[u8],
        start_after: Option<&[u8]>,
        limit: usize,
    ) -> LedgerResult<Vec<(Vec<u8>, VersionedBytes)>> {
        let inner = self.inner.read().map_err(|_| StorageError::LockPoisoned)?;
        let lower = match start_after {
            Some(after) => Bound::Excluded(after.to_vec()),
            None => Bound::Included(prefix.to_vec()),
        };
        Ok(inner
            .entries
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(limit)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn commit(&self, write: AtomicWrite) -> LedgerResult<CommitOutcome> {
        let mut inner = self.inner.write().map_err(|_| StorageError::LockPoisoned)?;

        for (key, expected) in &write.checks {
            let current = inner.entries.get(key).map(|v| v.version);
            if current != *expected {
                return Ok(CommitOutcome::Conflict);
            }
        }

        let version = inner.last_version + 1;
        for mutation in write.mutations {
            match mutation {
                Mutation::Put { key, value } => {
                    inner.entries.insert(key, VersionedBytes { version, value });
                }
                Mutation::Delete { key } => {
                    inner.entries.remove(&key);
                }
            }
        }
        inner.last_version = version;

        Ok(CommitOutcome::Committed(version))
    }
}

// ============================================================================
// RocksDB store
// ============================================================================

/// Persistent store backed by RocksDB.
///
/// Values are stored as `version(be u64) | payload`. Check-and-write runs under
/// `commit_lock` so that within this process the version checks and the batch
/// write form one critical section.
#[derive(Clone)]
pub struct RocksStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<Version>>,
}

impl RocksStore {
    pub fn new<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        Self::new_with_config(&StorageConfig {
            data_directory: path.as_ref().to_string_lossy().to_string(),
            ..Default::default()
        })
    }

    pub fn new_with_config(config: &StorageConfig) -> LedgerResult<Self> {
        Self::open(config, true)
    }

    /// Open a database that must already exist, never creating one
    pub fn open_existing<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let config = StorageConfig {
            data_directory: path.as_ref().to_string_lossy().to_string(),
            ..Default::default()
        };
        Self::open(&config, false)
    }

    fn open(config: &StorageConfig, create_if_missing: bool) -> LedgerResult<Self> {
        if config.clear_on_start && Path::new(&config.data_directory).exists() {
            tracing::warn!(path = %config.data_directory, "Clearing ledger database on start");
            std::fs::remove_dir_all(&config.data_directory)?;
        }

        let mut opts = Options::default();
        opts.create_if_missing(create_if_missing);
        opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);
        opts.set_max_write_buffer_number(config.max_write_buffer_number as i32);
        opts.set_compression_type(match config.compression_type {
            CompressionType::None => rocksdb::DBCompressionType::None,
            CompressionType::Snappy => rocksdb::DBCompressionType::Snappy,
            CompressionType::Lz4 => rocksdb::DBCompressionType::Lz4,
            CompressionType::Zstd => rocksdb::DBCompressionType::Zstd,
        });

        let db = DB::open(&opts, &config.data_directory)
            .map_err(|e| StorageError::DatabaseOpenFailed(e.to_string()))?;

        let last_version = match db.get(VERSION_COUNTER_KEY)? {
            Some(bytes) => decode_version(VERSION_COUNTER_KEY, &bytes)?,
            None => 0,
        };

        tracing::info!(
            path = %config.data_directory,
            last_version,
            "Opened ledger database"
        );

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(last_version)),
        })
    }

    fn read_envelope(&self, key: &[u8]) -> LedgerResult<Option<VersionedBytes>> {
        match self.db.get(key) {
            Ok(Some(bytes)) => Ok(Some(decode_envelope(key, &bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::ReadFailed(e.to_string()).into()),
        }
    }
}

fn decode_version(key: &[u8], bytes: &[u8]) -> LedgerResult<Version> {
    let head: [u8; 8] = bytes
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            StorageError::CorruptedData(format!(
                "Missing version header at {}",
                String::from_utf8_lossy(key)
            ))
        })?;
    Ok(u64::from_be_bytes(head))
}

fn decode_envelope(key: &[u8], bytes: &[u8]) -> LedgerResult<VersionedBytes> {
    let version = decode_version(key, bytes)?;
    Ok(VersionedBytes {
        version,
        value: bytes[8..].to_vec(),
    })
}

fn encode_envelope(version: Version, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + value.len());
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(value);
    out
}

impl KvStore for RocksStore {
    fn get(&self, key: &[u8]) -> LedgerResult<Option<VersionedBytes>> {
        self.read_envelope(key)
    }

    fn scan_prefix(
        &self,
        prefix: &[u8],
        start_after: Option<&[u8]>,
        limit: usize,
    ) -> LedgerResult<Vec<(Vec<u8>, VersionedBytes)>> {
        let start = start_after.unwrap_or(prefix);
        let mut rows = Vec::new();

        for item in self.db.iterator(IteratorMode::From(start, Direction::Forward)) {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            if start_after.is_some_and(|after| key.as_ref() == after) {
                continue;
            }
            rows.push((key.to_vec(), decode_envelope(&key, &value)?));
            if rows.len() >= limit {
                break;
            }
        }

        Ok(rows)
    }

    fn commit(&self, write: AtomicWrite) -> LedgerResult<CommitOutcome> {
        let mut last_version = self
            .commit_lock
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;

        for (key, expected) in &write.checks {
            let current = self.read_envelope(key)?.map(|v| v.version);
            if current != *expected {
                return Ok(CommitOutcome::Conflict);
            }
        }

        let version = *last_version + 1;
        let mut batch = WriteBatch::default();
        for mutation in &write.mutations {
            match mutation {
                Mutation::Put { key, value } => batch.put(key, encode_envelope(version, value)),
                Mutation::Delete { key } => batch.delete(key),
            }
        }
        batch.put(VERSION_COUNTER_KEY, version.to_be_bytes());

        self.db
            .write(batch)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        *last_version = version;

        Ok(CommitOutcome::Committed(version))
    }
}
