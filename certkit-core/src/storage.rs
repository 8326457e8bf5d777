//! Persistence boundary: a pluggable key-value blob store plus a typed CBOR
//! wrapper used by every persisted snapshot.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors raised at the persistence boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store failed to read or write a blob.
    #[error("store_backend: {0}")]
    Backend(String),
    /// A persisted blob could not be encoded or decoded.
    #[error("store_encoding: {0}")]
    Encoding(String),
}

/// Atomic key-value store for small binary snapshots.
///
/// Implementations must make each `write` atomic: a reader never observes a
/// partially written value. The host application supplies the actual backend
/// (encrypted preferences, a file store, ...).
pub trait KeyValueStore: Send + Sync {
    /// Reads the blob stored under `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Writes `bytes` atomically under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Deletes the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Typed view onto one key of a [`KeyValueStore`], encoded as CBOR.
pub struct CborStore<T> {
    store: Arc<dyn KeyValueStore>,
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CborStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Creates a typed store bound to `key`.
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            _marker: PhantomData,
        }
    }

    /// Loads and decodes the stored value, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the blob is not valid CBOR for `T`.
    pub fn get(&self) -> Result<Option<T>, StorageError> {
        let Some(bytes) = self.store.read(&self.key)? else {
            return Ok(None);
        };
        ciborium::de::from_reader(bytes.as_slice())
            .map(Some)
            .map_err(|err| StorageError::Encoding(err.to_string()))
    }

    /// Encodes and stores `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails.
    pub fn put(&self, value: &T) -> Result<(), StorageError> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(value, &mut bytes)
            .map_err(|err| StorageError::Encoding(err.to_string()))?;
        self.store.write(&self.key, &bytes)
    }

    /// Removes the stored value.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.delete(&self.key)
    }
}

/// Persisted "last updated" timestamps, one per synchronized kind.
pub struct UpdateStore {
    store: std::sync::Mutex<CborStore<std::collections::HashMap<String, chrono::DateTime<chrono::Utc>>>>,
}

impl UpdateStore {
    /// Key for the business-rule sync timestamp.
    pub const RULES: &'static str = "rules";
    /// Key for the value-set sync timestamp.
    pub const VALUE_SETS: &'static str = "value_sets";
    /// Key for the booster-rule sync timestamp.
    pub const BOOSTER_RULES: &'static str = "booster_rules";
    /// Key for the country-list sync timestamp.
    pub const COUNTRIES: &'static str = "countries";
    /// Key for the trust-list sync timestamp.
    pub const DSC_LIST: &'static str = "dsc_list";

    /// Creates the store on top of the given backend.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store: std::sync::Mutex::new(CborStore::new(store, "update_timestamps")),
        }
    }

    /// Records `kind` as updated now.
    ///
    /// # Errors
    ///
    /// Returns an error if the timestamp table cannot be read or written.
    pub fn mark(&self, kind: &str) -> Result<(), StorageError> {
        self.mark_at(kind, chrono::Utc::now())
    }

    /// Records `kind` as updated at `at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the timestamp table cannot be read or written.
    pub fn mark_at(
        &self,
        kind: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StorageError> {
        let store = self
            .store
            .lock()
            .map_err(|_| StorageError::Backend("mutex poisoned".to_string()))?;
        let mut table = store.get()?.unwrap_or_default();
        table.insert(kind.to_string(), at);
        store.put(&table)
    }

    /// The last recorded update time for `kind`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the timestamp table cannot be read.
    pub fn last_updated(
        &self,
        kind: &str,
    ) -> Result<Option<chrono::DateTime<chrono::Utc>>, StorageError> {
        let store = self
            .store
            .lock()
            .map_err(|_| StorageError::Backend("mutex poisoned".to_string()))?;
        Ok(store.get()?.unwrap_or_default().get(kind).copied())
    }
}

/// In-memory [`KeyValueStore`], used by tests and as a default backend.
#[derive(Default)]
pub struct InMemoryStore {
    blobs: std::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let guard = self
            .blobs
            .lock()
            .map_err(|_| StorageError::Backend("mutex poisoned".to_string()))?;
        Ok(guard.get(key).cloned())
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.blobs
            .lock()
            .map_err(|_| StorageError::Backend("mutex poisoned".to_string()))?
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.blobs
            .lock()
            .map_err(|_| StorageError::Backend("mutex poisoned".to_string()))?
            .remove(key);
        Ok(())
    }
}
