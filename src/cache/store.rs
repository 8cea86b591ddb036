//! Cache Store Module
//!
//! The store contract: public cache operations (read/write/delete/exists/
//! fetch/clear) layered as shared default logic over four raw backend
//! primitives. Concrete backends implement the primitives only and inherit
//! the orchestration, key namespacing and entry interpretation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::cache::codec;
use crate::cache::entry::{unix_now, Entry};
use crate::cache::key::namespaced_key;
use crate::config::StoreConfig;
use crate::error::{CacheError, Result};

// == Write Options ==
/// Per-call overrides for a single `write`. Any field left unset falls back
/// to the store's configured default.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Absolute expiration (seconds since Unix epoch); wins over `expires_in`
    pub expires_at: Option<f64>,
    /// Relative expiration from now
    pub expires_in: Option<Duration>,
    /// Version tag stored with the entry
    pub version: Option<i32>,
    /// Whether to compress this write
    pub compress: Option<bool>,
    /// Minimum packed size, in bytes, to compress this write
    pub compress_threshold: Option<usize>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_expires_at(mut self, expires_at: f64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }

    pub fn with_compress_threshold(mut self, threshold: usize) -> Self {
        self.compress_threshold = Some(threshold);
        self
    }
}

// == Fetch Options ==
/// Options for `fetch`: the write options applied when the value is
/// regenerated, plus the fetch-only knobs.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Options forwarded to the write that stores a regenerated value
    pub write: WriteOptions,
    /// Skip the lookup entirely and regenerate unconditionally
    pub force: bool,
    /// Grace window during which a stale entry is served instead of
    /// regenerated, to dampen regeneration stampedes
    pub race_condition_ttl: Option<Duration>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_write(mut self, write: WriteOptions) -> Self {
        self.write = write;
        self
    }

    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.write = self.write.with_expires_in(expires_in);
        self
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.write = self.write.with_version(version);
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_race_condition_ttl(mut self, ttl: Duration) -> Self {
        self.race_condition_ttl = Some(ttl);
        self
    }
}

// == Store Trait ==
/// The pluggable store contract.
///
/// Backends implement [`Store::config`] and the four raw primitives; the
/// public operations are provided on top and should not be overridden. A
/// store holds only immutable configuration after construction and is safe
/// for concurrent shared use; per-key atomicity is whatever the backend's
/// primitives guarantee, the contract adds no locking of its own.
#[async_trait]
pub trait Store: Send + Sync {
    // == Backend Primitives ==
    /// The store's configured defaults.
    fn config(&self) -> &StoreConfig;

    /// Raw entry fetch under an already-namespaced key. No expiry or version
    /// interpretation happens here.
    async fn read_entry(&self, nkey: &str) -> Result<Option<Entry>>;

    /// Raw entry store under an already-namespaced key.
    ///
    /// `expires_in` is the resolved relative expiration in seconds; backends
    /// with native TTL support may apply it, others can ignore it since
    /// expiry is re-checked from `expires_at` on every read. `compress` and
    /// `compress_threshold` are the resolved compression settings for this
    /// write.
    async fn write_entry(
        &self,
        nkey: &str,
        entry: &Entry,
        expires_in: Option<f64>,
        compress: bool,
        compress_threshold: usize,
    ) -> Result<()>;

    /// Raw delete under an already-namespaced key. Returns whether an entry
    /// was present.
    async fn delete_entry(&self, nkey: &str) -> Result<bool>;

    /// Removes every entry, regardless of namespace.
    async fn clear(&self) -> Result<()>;

    // == Public Operations ==
    /// Looks up the value stored under `key`.
    ///
    /// Returns `None` for absent keys. An expired entry is deleted as a side
    /// effect and reported as absent (lazy eviction). An entry whose version
    /// mismatches the effective requested version is reported as absent but
    /// NOT deleted; a different version may still be asked for later.
    ///
    /// # Arguments
    /// * `key` - The user-facing key
    /// * `version` - Required version, falling back to the store default
    async fn read(&self, key: &str, version: Option<i32>) -> Result<Option<String>> {
        let config = self.config();
        let nkey = namespaced_key(config.namespace.as_deref(), key);

        let entry = match corrupt_as_miss(self.read_entry(&nkey).await, &nkey)? {
            Some(entry) => entry,
            None => return Ok(None),
        };

        if entry.is_expired() {
            self.delete_entry(&nkey).await?;
            return Ok(None);
        }
        if entry.mismatched(config.effective_version(version)) {
            return Ok(None);
        }
        Ok(Some(entry.into_value()))
    }

    /// Stores `value` under `key`.
    ///
    /// The effective relative expiration is `expires_at - now` when an
    /// absolute expiration is given, else the per-call `expires_in`, else the
    /// store default. Version and compression settings resolve the same way.
    async fn write(&self, key: &str, value: &str, options: &WriteOptions) -> Result<()> {
        let config = self.config();
        let nkey = namespaced_key(config.namespace.as_deref(), key);

        let expires_in = match (options.expires_at, options.expires_in) {
            (Some(at), _) => Some(at - unix_now()),
            (None, Some(duration)) => Some(duration.as_secs_f64()),
            (None, None) => config.default_expires_in_secs(),
        };

        let entry = Entry::new(
            value.to_string(),
            expires_in,
            config.effective_version(options.version),
        );

        self.write_entry(
            &nkey,
            &entry,
            expires_in,
            config.effective_compress(options.compress),
            config.effective_compress_threshold(options.compress_threshold),
        )
        .await
    }

    /// Removes the entry for `key`, reporting whether one existed.
    /// Idempotent: deleting an absent key returns `false`, never errors.
    async fn delete(&self, key: &str) -> Result<bool> {
        let nkey = namespaced_key(self.config().namespace.as_deref(), key);
        self.delete_entry(&nkey).await
    }

    /// Checks whether a live entry exists for `key`: present, unexpired and
    /// not version-mismatched.
    ///
    /// Unlike [`Store::read`], an expired entry found here is NOT evicted.
    /// The asymmetry is long-standing observable behavior and is kept as is.
    async fn exists(&self, key: &str, version: Option<i32>) -> Result<bool> {
        let config = self.config();
        let nkey = namespaced_key(config.namespace.as_deref(), key);

        Ok(match corrupt_as_miss(self.read_entry(&nkey).await, &nkey)? {
            Some(entry) => {
                !entry.is_expired() && !entry.mismatched(config.effective_version(version))
            }
            None => false,
        })
    }

    /// Reads several keys in one call. The result is aligned with `keys`;
    /// absent, expired or mismatched entries come back as `None`.
    async fn read_multi(&self, keys: &[&str], version: Option<i32>) -> Result<Vec<Option<String>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.read(key, version).await?);
        }
        Ok(values)
    }

    /// Writes several key-value pairs with shared options.
    async fn write_multi(&self, entries: &[(&str, &str)], options: &WriteOptions) -> Result<()> {
        for (key, value) in entries {
            self.write(key, value, options).await?;
        }
        Ok(())
    }
}

// == Store Extension Trait ==
/// Generic operations layered over [`Store`]. Lives apart from the base
/// trait so `dyn Store` stays usable.
pub trait StoreExt: Store {
    /// Reads the value for `key`, regenerating it on a miss.
    ///
    /// On a usable hit the cached value is returned and `generate` is never
    /// invoked. On a miss (absent, expired outside any grace window, version
    /// mismatch, or `force`) the block runs and its result is written back
    /// with the fetch's write options, then returned.
    ///
    /// When the entry is expired but its staleness still falls within
    /// `race_condition_ttl`, the entry is not deleted: its expiration is
    /// pushed forward by the grace window, it is rewritten with a doubled
    /// write-TTL, and the stale value is served to this caller as a hit.
    /// Concurrent callers then keep reusing the stale value instead of all
    /// regenerating at once.
    ///
    /// There is no mutual exclusion around `generate`: two callers racing on
    /// the same missing key may both regenerate and both write. The grace
    /// window narrows that race, it does not eliminate it.
    fn fetch<'a, F, Fut>(
        &'a self,
        key: &'a str,
        options: &'a FetchOptions,
        generate: F,
    ) -> impl std::future::Future<Output = Result<String>> + Send
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: std::future::Future<Output = String> + Send,
    {
        async move {
            let config = self.config();
            let nkey = namespaced_key(config.namespace.as_deref(), key);
            let version = config.effective_version(options.write.version);
            let compress = config.effective_compress(options.write.compress);
            let threshold = config.effective_compress_threshold(options.write.compress_threshold);

            if !options.force {
                let cached = match corrupt_as_miss(self.read_entry(&nkey).await, &nkey)? {
                    Some(entry) => {
                        handle_expired(
                            self,
                            &nkey,
                            entry,
                            options.race_condition_ttl,
                            compress,
                            threshold,
                        )
                        .await?
                    }
                    None => None,
                };

                if let Some(entry) = cached {
                    if !entry.mismatched(version) {
                        return Ok(entry.into_value());
                    }
                }
            }

            debug!("regenerating cache entry for '{}'", nkey);
            let value = generate().await;
            self.write(key, &value, &options.write).await?;
            Ok(value)
        }
    }

    /// Reads and JSON-decodes the value for `key`.
    ///
    /// A stored value that fails to decode is treated the same way as a
    /// corrupt entry: logged and reported as a miss, never an error.
    fn read_json<'a, V>(
        &'a self,
        key: &'a str,
        version: Option<i32>,
    ) -> impl std::future::Future<Output = Result<Option<V>>> + Send
    where
        V: DeserializeOwned + Send,
    {
        async move {
            match self.read(key, version).await? {
                Some(data) => match serde_json::from_str(&data) {
                    Ok(value) => Ok(Some(value)),
                    Err(e) => {
                        warn!(
                            "treating undecodable cached JSON under '{}' as a miss: {}",
                            key, e
                        );
                        Ok(None)
                    }
                },
                None => Ok(None),
            }
        }
    }

    /// JSON-encodes and writes `value` under `key`.
    fn write_json<'a, V>(
        &'a self,
        key: &'a str,
        value: &'a V,
        options: &'a WriteOptions,
    ) -> impl std::future::Future<Output = Result<()>> + Send
    where
        V: Serialize + Sync,
    {
        async move {
            let data = serde_json::to_string(value).map_err(|e| {
                CacheError::Serialization(format!("failed to serialize cache value: {}", e))
            })?;
            self.write(key, &data, options).await
        }
    }
}

// Blanket implementation for all types implementing Store
impl<T: Store + ?Sized> StoreExt for T {}

// == Expiry Handling ==
/// Race-condition-aware expiry check used by `fetch`.
///
/// A live entry passes through untouched. An expired entry whose staleness
/// is within the grace window is repaired: a copy with the expiration pushed
/// forward replaces it under a doubled write-TTL, and that copy is returned
/// as the hit. Any other expired entry is deleted and reported absent.
async fn handle_expired<S>(
    store: &S,
    nkey: &str,
    entry: Entry,
    race_condition_ttl: Option<Duration>,
    compress: bool,
    compress_threshold: usize,
) -> Result<Option<Entry>>
where
    S: Store + ?Sized,
{
    let now = unix_now();
    if !entry.is_expired_at(now) {
        return Ok(Some(entry));
    }

    if let (Some(race_ttl), Some(expired_at)) = (race_condition_ttl, entry.expires_at()) {
        let race_secs = race_ttl.as_secs_f64();
        if now - expired_at <= race_secs {
            let repaired = entry.refreshed(now + race_secs);
            store
                .write_entry(
                    nkey,
                    &repaired,
                    Some(race_secs * 2.0),
                    compress,
                    compress_threshold,
                )
                .await?;
            return Ok(Some(repaired));
        }
    }

    store.delete_entry(nkey).await?;
    Ok(None)
}

// == Corrupt Entry Policy ==
/// Downgrades a corrupt entry to a miss on read paths. A corrupt entry is
/// operationally an absent one and must not take down request-serving code;
/// backend failures still propagate untouched.
fn corrupt_as_miss(result: Result<Option<Entry>>, nkey: &str) -> Result<Option<Entry>> {
    match result {
        Err(CacheError::CorruptEntry(reason)) => {
            warn!("treating corrupt entry under '{}' as a miss: {}", nkey, reason);
            Ok(None)
        }
        other => other,
    }
}
