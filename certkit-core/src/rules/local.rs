//! Local stores for synchronized entries, each owning its own consistency
//! boundary: an in-memory snapshot behind a lock, persisted as one CBOR blob.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use super::sync::SyncEntry;
use crate::storage::{CborStore, KeyValueStore, StorageError};

/// Keyed store for one kind of synchronized entry.
///
/// `replace` is the only mutation: it applies a keep-set and an add-list in
/// one step under the write lock and persists the result once, so partial
/// application can never leave orphaned or duplicated identifiers.
pub struct LocalStore<V: SyncEntry> {
    entries: RwLock<HashMap<V::Key, V>>,
    persistence: CborStore<Vec<V>>,
}

impl<V> LocalStore<V>
where
    V: SyncEntry + Clone + Serialize + DeserializeOwned,
{
    /// Creates a store persisted under `name`.
    pub fn new(name: &'static str, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            persistence: CborStore::new(store, name),
        }
    }

    /// Restores the persisted snapshot into memory, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or decoded.
    pub async fn restore(&self) -> Result<(), StorageError> {
        if let Some(values) = self.persistence.get()? {
            let mut entries = self.entries.write().await;
            *entries = values.into_iter().map(|v| (v.key(), v)).collect();
        }
        Ok(())
    }

    /// All entries, in unspecified order.
    pub async fn all(&self) -> Vec<V> {
        self.entries.read().await.values().cloned().collect()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Replaces the contents with `keep ∪ add` and persists the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be persisted; the in-memory
    /// contents are still replaced in that case, matching the storage
    /// layer's best-effort transactionality.
    pub async fn replace(&self, keep: &HashSet<V::Key>, add: Vec<V>) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        entries.retain(|key, _| keep.contains(key));
        for value in add {
            entries.insert(value.key(), value);
        }
        self.persistence
            .put(&entries.values().cloned().collect::<Vec<_>>())
    }

    /// Replaces the whole contents with `values`.
    ///
    /// # Errors
    ///
    /// See [`LocalStore::replace`].
    pub async fn replace_all(&self, values: Vec<V>) -> Result<(), StorageError> {
        self.replace(&HashSet::new(), values).await
    }
}

/// Store for the plain country-code list; synchronized by full replacement.
pub struct CountryStore {
    entries: RwLock<Vec<String>>,
    persistence: CborStore<Vec<String>>,
}

impl CountryStore {
    /// Creates the store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            persistence: CborStore::new(store, "countries"),
        }
    }

    /// Restores the persisted list into memory, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or decoded.
    pub async fn restore(&self) -> Result<(), StorageError> {
        if let Some(countries) = self.persistence.get()? {
            *self.entries.write().await = countries;
        }
        Ok(())
    }

    /// The current country codes.
    pub async fn all(&self) -> Vec<String> {
        self.entries.read().await.clone()
    }

    /// Whether the list is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Replaces the list and persists it.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be persisted.
    pub async fn replace_all(&self, countries: Vec<String>) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        *entries = countries;
        self.persistence.put(&entries)
    }
}
