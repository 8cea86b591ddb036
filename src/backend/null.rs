//! Null Store Module
//!
//! A store that never stores. Writes are accepted and dropped, every read
//! misses. Stands in wherever caching is switched off without callers
//! having to care.

use async_trait::async_trait;

use crate::cache::{Entry, Store};
use crate::config::StoreConfig;
use crate::error::Result;

// == Null Store ==
#[derive(Debug, Clone, Default)]
pub struct NullStore {
    config: StoreConfig,
}

impl NullStore {
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
}

#[async_trait]
impl Store for NullStore {
    fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn read_entry(&self, _nkey: &str) -> Result<Option<Entry>> {
        Ok(None)
    }

    async fn write_entry(
        &self,
        _nkey: &str,
        _entry: &Entry,
        _expires_in: Option<f64>,
        _compress: bool,
        _compress_threshold: usize,
    ) -> Result<()> {
        Ok(())
    }

    async fn delete_entry(&self, _nkey: &str) -> Result<bool> {
        Ok(false)
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}
