//! Configuration Module
//!
//! Per-store configuration supplied at construction time. Values usually come
//! from an external configuration layer; this crate only applies structural
//! validation and per-call fallback resolution.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Default minimum serialized size (bytes) above which entries are compressed.
pub const DEFAULT_COMPRESS_THRESHOLD: usize = 1024;

/// Per-store configuration.
///
/// Every field is a fallback default: operations may override `expires_in`,
/// `version` and the compression settings per call. The namespace is fixed
/// for the lifetime of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Key prefix isolating this store's keyspace on a shared backend
    pub namespace: Option<String>,
    /// Default relative expiration for written entries (None = never expires)
    pub expires_in: Option<Duration>,
    /// Default version tag checked on reads (None = don't care)
    pub version: Option<i32>,
    /// Whether entries at or above the threshold are compressed
    pub compress: bool,
    /// Minimum serialized entry size in bytes that triggers compression
    pub compress_threshold: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            expires_in: None,
            version: None,
            compress: true,
            compress_threshold: DEFAULT_COMPRESS_THRESHOLD,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with all defaults (no namespace, no default
    /// expiration, no version, compression on at 1 KiB).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the namespace prefix.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the default relative expiration.
    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    /// Sets the default version tag.
    pub fn with_version(mut self, version: i32) -> Self {
        self.version = Some(version);
        self
    }

    /// Enables or disables compression.
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Sets the compression threshold in bytes.
    pub fn with_compress_threshold(mut self, threshold: usize) -> Self {
        self.compress_threshold = threshold;
        self
    }

    // == Validation ==
    /// Checks the configuration for structural errors.
    ///
    /// Called by every backend constructor. A zero `compress_threshold` and an
    /// empty namespace string are rejected outright. A zero default
    /// `expires_in` is rejected too: it would silently expire every write on
    /// arrival (a zero `expires_in` stays legal per call, where it is an
    /// explicit request for an already-expired entry).
    pub fn validate(&self) -> Result<()> {
        if self.compress_threshold == 0 {
            return Err(CacheError::InvalidConfiguration(
                "compress_threshold must be at least 1 byte".to_string(),
            ));
        }
        if let Some(namespace) = &self.namespace {
            if namespace.is_empty() {
                return Err(CacheError::InvalidConfiguration(
                    "namespace must not be an empty string".to_string(),
                ));
            }
        }
        if self.expires_in == Some(Duration::ZERO) {
            return Err(CacheError::InvalidConfiguration(
                "default expires_in must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    // == Per-call fallback resolution ==
    /// Resolves the effective version: explicit argument, else store default.
    pub fn effective_version(&self, version: Option<i32>) -> Option<i32> {
        version.or(self.version)
    }

    /// Resolves the effective compression flag.
    pub fn effective_compress(&self, compress: Option<bool>) -> bool {
        compress.unwrap_or(self.compress)
    }

    /// Resolves the effective compression threshold.
    pub fn effective_compress_threshold(&self, threshold: Option<usize>) -> usize {
        threshold.unwrap_or(self.compress_threshold)
    }

    /// Store-default relative expiration in seconds, if any.
    pub fn default_expires_in_secs(&self) -> Option<f64> {
        self.expires_in.map(|d| d.as_secs_f64())
    }
}
