//! Generic incremental-diff synchronization against the distribution
//! endpoints, applied uniformly to business rules, booster rules, value sets
//! and countries.
//!
//! One sync: fetch the identifier/hash manifest, diff against the local
//! store, fetch bodies for added and changed entries with bounded
//! parallelism, then perform one local replacement. A failed manifest fetch
//! aborts with no local mutation; a failed body fetch only drops that entry.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use log::warn;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

use super::local::{CountryStore, LocalStore};
use super::remote::{
    BoosterRulesRemoteDataSource, CountriesRemoteDataSource, RulesRemoteDataSource,
    ValueSetsRemoteDataSource,
};
use super::{BoosterRule, CovRule, ValueSet};
use crate::error::CertError;
use crate::storage::UpdateStore;

/// Bound on concurrent body fetches within one sync.
const PARALLEL_FETCHES: usize = 8;

/// An entry that can be diffed by logical key and content hash.
pub trait SyncEntry {
    /// Logical identifier type of the entry.
    type Key: Eq + Hash + Clone + Debug + Send + Sync;

    /// The logical identifier of this entry.
    fn key(&self) -> Self::Key;

    /// The content fingerprint of this entry.
    fn content_hash(&self) -> &str;
}

impl SyncEntry for CovRule {
    // Business rules are identified per country.
    type Key = (String, String);

    fn key(&self) -> Self::Key {
        (self.country.to_ascii_lowercase(), self.identifier.clone())
    }

    fn content_hash(&self) -> &str {
        &self.hash
    }
}

impl SyncEntry for BoosterRule {
    type Key = String;

    fn key(&self) -> Self::Key {
        self.identifier.clone()
    }

    fn content_hash(&self) -> &str {
        &self.hash
    }
}

impl SyncEntry for ValueSet {
    type Key = String;

    fn key(&self) -> Self::Key {
        self.id.clone()
    }

    fn content_hash(&self) -> &str {
        &self.hash
    }
}

/// Groups entries by key, keeping the first entry per key.
///
/// A source returning duplicate identifiers is an anomaly; it is logged and
/// never silently resolved by reordering.
pub fn distinct_group_by<T, K, F>(items: Vec<T>, what: &str, key_fn: F) -> HashMap<K, T>
where
    K: Eq + Hash + Clone + Debug,
    F: Fn(&T) -> K,
{
    let mut grouped = HashMap::with_capacity(items.len());
    for item in items {
        let key = key_fn(&item);
        if grouped.contains_key(&key) {
            warn!("{what} contains duplicate identifier {key:?}; keeping the first entry");
            continue;
        }
        grouped.insert(key, item);
    }
    grouped
}

/// The outcome of diffing a remote manifest against the local store.
#[derive(Debug, PartialEq, Eq)]
pub struct SyncPlan<K: Eq + Hash> {
    /// Keys present remotely but not locally.
    pub added: Vec<K>,
    /// Keys present locally but not remotely.
    pub removed: Vec<K>,
    /// Keys present in both with differing hashes.
    pub changed: Vec<K>,
    /// Local keys to retain unchanged.
    pub keep: HashSet<K>,
}

impl<K: Eq + Hash + Clone> SyncPlan<K> {
    /// Computes the diff between remote and local `key → hash` maps.
    pub fn compute(remote: &HashMap<K, String>, local: &HashMap<K, String>) -> Self {
        let mut plan = Self {
            added: Vec::new(),
            removed: Vec::new(),
            changed: Vec::new(),
            keep: HashSet::new(),
        };
        for (key, remote_hash) in remote {
            match local.get(key) {
                None => plan.added.push(key.clone()),
                Some(local_hash) if local_hash != remote_hash => plan.changed.push(key.clone()),
                Some(_) => {
                    plan.keep.insert(key.clone());
                }
            }
        }
        for key in local.keys() {
            if !remote.contains_key(key) {
                plan.removed.push(key.clone());
            }
        }
        plan
    }

    /// Keys whose bodies need to be fetched (`added ∪ changed`).
    pub fn to_fetch(&self) -> impl Iterator<Item = &K> {
        self.added.iter().chain(self.changed.iter())
    }
}

/// Fetches bodies concurrently with bounded parallelism, dropping entries
/// whose fetch fails instead of aborting the sync.
async fn fetch_bodies<M, V, F, Fut>(items: Vec<M>, what: &'static str, fetch: F) -> Vec<V>
where
    M: Send + 'static,
    V: Send + 'static,
    F: Fn(M) -> Fut,
    Fut: Future<Output = Result<V, CertError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(PARALLEL_FETCHES));
    let mut tasks = JoinSet::new();
    for item in items {
        let semaphore = semaphore.clone();
        let future = fetch(item);
        tasks.spawn(async move {
            let _permit = semaphore.acquire().await.ok();
            future.await
        });
    }

    let mut bodies = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(body)) => bodies.push(body),
            Ok(Err(err)) => warn!("dropping {what} entry after failed fetch: {err}"),
            Err(err) => warn!("{what} fetch task failed: {err}"),
        }
    }
    bodies
}

fn hashes_of<V: SyncEntry>(entries: &HashMap<V::Key, V>) -> HashMap<V::Key, String> {
    entries
        .iter()
        .map(|(key, value)| (key.clone(), value.content_hash().to_string()))
        .collect()
}

/// Synchronizes and serves business rules.
pub struct RulesRepository {
    remote: Arc<RulesRemoteDataSource>,
    local: Arc<LocalStore<CovRule>>,
    updates: Arc<UpdateStore>,
    sync_lock: Mutex<()>,
}

impl RulesRepository {
    /// Creates the repository.
    pub fn new(
        remote: Arc<RulesRemoteDataSource>,
        local: Arc<LocalStore<CovRule>>,
        updates: Arc<UpdateStore>,
    ) -> Self {
        Self {
            remote,
            local,
            updates,
            sync_lock: Mutex::new(()),
        }
    }

    /// All locally known rules.
    pub async fn all_rules(&self) -> Vec<CovRule> {
        self.local.all().await
    }

    /// Seeds the store with bundled rules when it is still empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the seeded snapshot cannot be persisted.
    pub async fn prepopulate(&self, rules: Vec<CovRule>) -> Result<(), CertError> {
        if self.local.is_empty().await {
            self.local.replace_all(rules).await?;
        }
        Ok(())
    }

    /// Runs one incremental sync against the distribution endpoint.
    ///
    /// Overlapping syncs are serialized; only one replacement commits at a
    /// time.
    ///
    /// # Errors
    ///
    /// Returns an error when the manifest fetch or the local replacement
    /// fails. Prior local state is retained in both cases.
    pub async fn load_rules(&self) -> Result<(), CertError> {
        let _guard = self.sync_lock.lock().await;

        let manifest = self.remote.rule_identifiers().await?;
        let remote = distinct_group_by(manifest, "rule manifest", |entry| {
            (entry.country.to_ascii_lowercase(), entry.identifier.clone())
        });
        let local = distinct_group_by(self.local.all().await, "local rules", SyncEntry::key);

        let remote_hashes = remote
            .iter()
            .map(|(key, entry)| (key.clone(), entry.hash.clone()))
            .collect();
        let plan = SyncPlan::compute(&remote_hashes, &hashes_of(&local));

        let to_fetch: Vec<_> = plan
            .to_fetch()
            .filter_map(|key| remote.get(key).cloned())
            .collect();
        let source = self.remote.clone();
        let fetched = fetch_bodies(to_fetch, "rule", move |identifier| {
            let source = source.clone();
            async move {
                let body = source
                    .rule(&identifier.country.to_ascii_lowercase(), &identifier.hash)
                    .await?;
                Ok(body.into_rule(identifier.hash))
            }
        })
        .await;

        self.local.replace(&plan.keep, fetched).await?;
        self.updates.mark(UpdateStore::RULES)?;
        Ok(())
    }
}

/// Synchronizes and serves value sets.
pub struct ValueSetsRepository {
    remote: Arc<ValueSetsRemoteDataSource>,
    local: Arc<LocalStore<ValueSet>>,
    updates: Arc<UpdateStore>,
    sync_lock: Mutex<()>,
}

impl ValueSetsRepository {
    /// Creates the repository.
    pub fn new(
        remote: Arc<ValueSetsRemoteDataSource>,
        local: Arc<LocalStore<ValueSet>>,
        updates: Arc<UpdateStore>,
    ) -> Self {
        Self {
            remote,
            local,
            updates,
            sync_lock: Mutex::new(()),
        }
    }

    /// All locally known value sets.
    pub async fn all_value_sets(&self) -> Vec<ValueSet> {
        self.local.all().await
    }

    /// The value sets projected for rule evaluation: `id → [codes]`.
    pub async fn external_value(&self) -> serde_json::Value {
        let mapping = self
            .local
            .all()
            .await
            .into_iter()
            .map(|value_set| {
                let codes = value_set
                    .codes()
                    .into_iter()
                    .map(|code| serde_json::Value::String(code.to_string()))
                    .collect();
                (value_set.id, serde_json::Value::Array(codes))
            })
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(mapping)
    }

    /// Seeds the store with bundled value sets when it is still empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the seeded snapshot cannot be persisted.
    pub async fn prepopulate(&self, value_sets: Vec<ValueSet>) -> Result<(), CertError> {
        if self.local.is_empty().await {
            self.local.replace_all(value_sets).await?;
        }
        Ok(())
    }

    /// Runs one incremental sync against the distribution endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error when the manifest fetch or the local replacement
    /// fails. Prior local state is retained in both cases.
    pub async fn load_value_sets(&self) -> Result<(), CertError> {
        let _guard = self.sync_lock.lock().await;

        let manifest = self.remote.value_set_identifiers().await?;
        let remote = distinct_group_by(manifest, "value-set manifest", |entry| entry.id.clone());
        let local = distinct_group_by(self.local.all().await, "local value sets", SyncEntry::key);

        let remote_hashes = remote
            .iter()
            .map(|(key, entry)| (key.clone(), entry.hash.clone()))
            .collect();
        let plan = SyncPlan::compute(&remote_hashes, &hashes_of(&local));

        let to_fetch: Vec<_> = plan
            .to_fetch()
            .filter_map(|key| remote.get(key).cloned())
            .collect();
        let source = self.remote.clone();
        let fetched = fetch_bodies(to_fetch, "value-set", move |identifier| {
            let source = source.clone();
            async move {
                let body = source.value_set(&identifier.hash).await?;
                Ok(body.into_value_set(identifier.hash))
            }
        })
        .await;

        self.local.replace(&plan.keep, fetched).await?;
        self.updates.mark(UpdateStore::VALUE_SETS)?;
        Ok(())
    }
}

/// Synchronizes and serves booster rules.
pub struct BoosterRulesRepository {
    remote: Arc<BoosterRulesRemoteDataSource>,
    local: Arc<LocalStore<BoosterRule>>,
    updates: Arc<UpdateStore>,
    sync_lock: Mutex<()>,
}

impl BoosterRulesRepository {
    /// Creates the repository.
    pub fn new(
        remote: Arc<BoosterRulesRemoteDataSource>,
        local: Arc<LocalStore<BoosterRule>>,
        updates: Arc<UpdateStore>,
    ) -> Self {
        Self {
            remote,
            local,
            updates,
            sync_lock: Mutex::new(()),
        }
    }

    /// All locally known booster rules.
    pub async fn all_rules(&self) -> Vec<BoosterRule> {
        self.local.all().await
    }

    /// Seeds the store with bundled booster rules when it is still empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the seeded snapshot cannot be persisted.
    pub async fn prepopulate(&self, rules: Vec<BoosterRule>) -> Result<(), CertError> {
        if self.local.is_empty().await {
            self.local.replace_all(rules).await?;
        }
        Ok(())
    }

    /// Runs one incremental sync against the booster distribution endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error when the manifest fetch or the local replacement
    /// fails. Prior local state is retained in both cases.
    pub async fn load_booster_rules(&self) -> Result<(), CertError> {
        let _guard = self.sync_lock.lock().await;

        let manifest = self.remote.rule_identifiers().await?;
        let remote = distinct_group_by(manifest, "booster-rule manifest", |entry| {
            entry.identifier.clone()
        });
        let local = distinct_group_by(
            self.local.all().await,
            "local booster rules",
            SyncEntry::key,
        );

        let remote_hashes = remote
            .iter()
            .map(|(key, entry)| (key.clone(), entry.hash.clone()))
            .collect();
        let plan = SyncPlan::compute(&remote_hashes, &hashes_of(&local));

        let to_fetch: Vec<_> = plan
            .to_fetch()
            .filter_map(|key| remote.get(key).cloned())
            .collect();
        let source = self.remote.clone();
        let fetched = fetch_bodies(to_fetch, "booster rule", move |identifier| {
            let source = source.clone();
            async move {
                let body = source.rule(&identifier.hash).await?;
                Ok(body.into_rule(identifier.hash))
            }
        })
        .await;

        self.local.replace(&plan.keep, fetched).await?;
        self.updates.mark(UpdateStore::BOOSTER_RULES)?;
        Ok(())
    }
}

/// Synchronizes and serves the country list.
pub struct CountriesRepository {
    remote: Arc<CountriesRemoteDataSource>,
    local: Arc<CountryStore>,
    updates: Arc<UpdateStore>,
    sync_lock: Mutex<()>,
}

impl CountriesRepository {
    /// Creates the repository.
    pub fn new(
        remote: Arc<CountriesRemoteDataSource>,
        local: Arc<CountryStore>,
        updates: Arc<UpdateStore>,
    ) -> Self {
        Self {
            remote,
            local,
            updates,
            sync_lock: Mutex::new(()),
        }
    }

    /// All known country codes.
    pub async fn all_countries(&self) -> Vec<String> {
        self.local.all().await
    }

    /// Seeds the store with bundled countries when it is still empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the seeded snapshot cannot be persisted.
    pub async fn prepopulate(&self, countries: Vec<String>) -> Result<(), CertError> {
        if self.local.is_empty().await {
            self.local.replace_all(countries).await?;
        }
        Ok(())
    }

    /// Replaces the country list from the distribution endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error when the fetch or the local replacement fails.
    pub async fn load_countries(&self) -> Result<(), CertError> {
        let _guard = self.sync_lock.lock().await;
        let countries = self.remote.countries().await?;
        self.local.replace_all(countries).await?;
        self.updates.mark(UpdateStore::COUNTRIES)?;
        Ok(())
    }
}
