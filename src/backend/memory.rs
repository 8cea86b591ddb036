//! Memory Store Module
//!
//! Process-local backend keeping serialized entries in a HashMap, with an
//! optional entry cap enforced by least-recently-used eviction.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::warn;

use crate::backend::Cleanup;
use crate::cache::codec;
use crate::cache::{Entry, Store};
use crate::config::StoreConfig;
use crate::error::{CacheError, Result};

// == Shared State ==
#[derive(Debug, Default)]
struct Shared {
    /// Serialized entries, exactly as the codec framed them
    entries: HashMap<String, Vec<u8>>,
    /// Access order for bounded stores: front = most recent, back = oldest.
    /// Left empty when no entry cap is set.
    order: VecDeque<String>,
}

impl Shared {
    /// Marks a key as most recently used.
    fn touch(&mut self, nkey: &str) {
        self.order.retain(|k| k != nkey);
        self.order.push_front(nkey.to_string());
    }

    /// Drops a key from the access order.
    fn forget(&mut self, nkey: &str) {
        self.order.retain(|k| k != nkey);
    }
}

// == Memory Store ==
/// In-memory cache store.
///
/// Entries are kept in their serialized form, so compression settings apply
/// the same way they would against any other backend. Clones share the same
/// underlying map, which makes handing the store to a cleanup task or across
/// request handlers cheap.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    config: StoreConfig,
    max_entries: Option<usize>,
    inner: Arc<RwLock<Shared>>,
}

impl MemoryStore {
    // == Constructors ==
    /// Creates an unbounded in-memory store.
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            max_entries: None,
            inner: Arc::new(RwLock::new(Shared::default())),
        })
    }

    /// Creates a store holding at most `max_entries` entries; the least
    /// recently used entry is evicted to make room for a new one.
    pub fn bounded(config: StoreConfig, max_entries: usize) -> Result<Self> {
        if max_entries == 0 {
            return Err(CacheError::InvalidConfiguration(
                "max_entries must be at least 1".to_string(),
            ));
        }
        let mut store = Self::new(config)?;
        store.max_entries = Some(max_entries);
        Ok(store)
    }

    // == Accessors ==
    /// Current number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.read_lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_lock().entries.is_empty()
    }

    // == Lock Helpers ==
    fn read_lock(&self) -> RwLockReadGuard<'_, Shared> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("recovered from poisoned memory store lock");
                poisoned.into_inner()
            }
        }
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, Shared> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("recovered from poisoned memory store lock");
                poisoned.into_inner()
            }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn read_entry(&self, nkey: &str) -> Result<Option<Entry>> {
        // Bounded stores refresh recency on every read, which needs the
        // write half of the lock. Unbounded stores read concurrently.
        let bytes = if self.max_entries.is_some() {
            let mut shared = self.write_lock();
            let bytes = shared.entries.get(nkey).cloned();
            if bytes.is_some() {
                shared.touch(nkey);
            }
            bytes
        } else {
            self.read_lock().entries.get(nkey).cloned()
        };

        match bytes {
            Some(bytes) => Ok(Some(codec::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write_entry(
        &self,
        nkey: &str,
        entry: &Entry,
        _expires_in: Option<f64>,
        compress: bool,
        compress_threshold: usize,
    ) -> Result<()> {
        let bytes = codec::serialize(entry, compress, compress_threshold)?;

        let mut shared = self.write_lock();
        shared.entries.insert(nkey.to_string(), bytes);

        if let Some(max_entries) = self.max_entries {
            shared.touch(nkey);
            while shared.entries.len() > max_entries {
                match shared.order.pop_back() {
                    Some(oldest) => {
                        shared.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
        Ok(())
    }

    async fn delete_entry(&self, nkey: &str) -> Result<bool> {
        let mut shared = self.write_lock();
        shared.forget(nkey);
        Ok(shared.entries.remove(nkey).is_some())
    }

    async fn clear(&self) -> Result<()> {
        let mut shared = self.write_lock();
        shared.entries.clear();
        shared.order.clear();
        Ok(())
    }
}

#[async_trait]
impl Cleanup for MemoryStore {
    async fn cleanup(&self) -> Result<usize> {
        let mut shared = self.write_lock();

        let doomed: Vec<String> = shared
            .entries
            .iter()
            .filter_map(|(nkey, bytes)| match codec::deserialize(bytes) {
                Ok(entry) if entry.is_expired() => Some(nkey.clone()),
                Ok(_) => None,
                Err(e) => {
                    warn!("dropping undecodable entry '{}' during cleanup: {}", nkey, e);
                    Some(nkey.clone())
                }
            })
            .collect();

        for nkey in &doomed {
            shared.entries.remove(nkey);
            shared.forget(nkey);
        }
        Ok(doomed.len())
    }
}
