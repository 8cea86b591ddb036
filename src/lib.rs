//! Cachefront - a pluggable key-value cache store
//!
//! Layers expiration, versioning, compression, namespacing and stampede
//! mitigation over interchangeable backends (in-memory, filesystem, null).
//!
//! ```ignore
//! use cachefront::{MemoryStore, Store, StoreConfig, WriteOptions};
//! use std::time::Duration;
//!
//! let store = MemoryStore::new(StoreConfig::default().with_namespace("app"))?;
//! store
//!     .write(
//!         "greeting",
//!         "hello",
//!         &WriteOptions::new().with_expires_in(Duration::from_secs(60)),
//!     )
//!     .await?;
//! assert_eq!(store.read("greeting", None).await?.as_deref(), Some("hello"));
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use backend::{Cleanup, FileStore, MemoryStore, NullStore};
pub use cache::{Entry, FetchOptions, Store, StoreExt, WriteOptions};
pub use config::StoreConfig;
pub use error::{CacheError, Result};
pub use tasks::spawn_cleanup_task;
