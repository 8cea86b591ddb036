//! File Store Module
//!
//! Filesystem backend keeping one file per entry under a flat directory.
//! Suited for caches shared between processes on one host.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::warn;

use crate::backend::Cleanup;
use crate::cache::codec;
use crate::cache::{Entry, Store};
use crate::config::StoreConfig;
use crate::error::{CacheError, Result};

/// Keys up to this many bytes are hex-encoded into the filename directly;
/// longer ones are digested first so filenames stay under OS limits.
const MAX_PLAIN_KEY_BYTES: usize = 100;

/// Extension marking entry files, so strays in the directory are left alone.
const ENTRY_EXT: &str = "cache";

/// Prefix of in-flight temp files; `cleanup` prunes any left behind by a
/// crashed writer once they are older than [`TEMP_MAX_AGE`].
const TEMP_PREFIX: &str = ".tmp-";

/// Age past which an orphaned temp file is assumed dead. Live temp files
/// exist for one write call, far below this.
const TEMP_MAX_AGE: std::time::Duration = std::time::Duration::from_secs(60);

/// Sequence for collision-free temp file names within one process.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

// == File Store ==
/// File-per-entry cache store rooted at a directory.
///
/// Writes go to a temp file first and are renamed into place, so readers
/// never observe a half-written entry. The directory is created on first
/// write; a missing directory reads as an empty store.
#[derive(Debug, Clone)]
pub struct FileStore {
    config: StoreConfig,
    dir: PathBuf,
}

impl FileStore {
    // == Constructor ==
    /// Creates a file store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            dir: dir.into(),
        })
    }

    /// The directory entries are stored under.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // == Path Mapping ==
    /// Maps a namespaced key to its entry file. Short keys stay readable as
    /// hex; long keys are hashed. The `k`/`h` prefixes keep the two schemes
    /// from ever colliding.
    fn entry_path(&self, nkey: &str) -> PathBuf {
        let name = if nkey.len() <= MAX_PLAIN_KEY_BYTES {
            format!("k{}.{}", hex::encode(nkey), ENTRY_EXT)
        } else {
            let digest = Sha256::digest(nkey.as_bytes());
            format!("h{}.{}", hex::encode(digest), ENTRY_EXT)
        };
        self.dir.join(name)
    }

    fn temp_path(&self) -> PathBuf {
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!("{}{}-{}", TEMP_PREFIX, std::process::id(), seq))
    }
}

fn is_entry_file(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == ENTRY_EXT)
}

fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| name.starts_with(TEMP_PREFIX))
}

/// Whether an orphaned temp file is old enough to prune. Unknown ages read
/// as fresh so a clock hiccup never deletes an in-flight write.
fn temp_is_stale(metadata: &std::fs::Metadata) -> bool {
    metadata
        .modified()
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map_or(false, |age| age > TEMP_MAX_AGE)
}

fn io_unavailable(action: &str, path: &Path, e: io::Error) -> CacheError {
    CacheError::BackendUnavailable(format!("failed to {} {}: {}", action, path.display(), e))
}

#[async_trait]
impl Store for FileStore {
    fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn read_entry(&self, nkey: &str) -> Result<Option<Entry>> {
        let path = self.entry_path(nkey);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(codec::deserialize(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_unavailable("read", &path, e)),
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

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_unavailable("create", &self.dir, e))?;

        // Write-then-rename keeps concurrent readers off partial content.
        let temp = self.temp_path();
        let path = self.entry_path(nkey);
        fs::write(&temp, &bytes)
            .await
            .map_err(|e| io_unavailable("write", &temp, e))?;
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(io_unavailable("rename", &path, e));
        }
        Ok(())
    }

    async fn delete_entry(&self, nkey: &str) -> Result<bool> {
        let path = self.entry_path(nkey);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_unavailable("delete", &path, e)),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_unavailable("list", &self.dir, e)),
        };

        while let Some(dirent) = dir
            .next_entry()
            .await
            .map_err(|e| io_unavailable("list", &self.dir, e))?
        {
            let path = dirent.path();
            if !is_entry_file(&path) {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => {}
                // Lost a race with a concurrent delete, same outcome.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_unavailable("delete", &path, e)),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Cleanup for FileStore {
    async fn cleanup(&self) -> Result<usize> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_unavailable("list", &self.dir, e)),
        };

        let mut removed = 0;
        while let Some(dirent) = dir
            .next_entry()
            .await
            .map_err(|e| io_unavailable("list", &self.dir, e))?
        {
            let path = dirent.path();
            if !is_entry_file(&path) {
                if is_temp_file(&path) {
                    match dirent.metadata().await {
                        Ok(metadata) if temp_is_stale(&metadata) => {
                            warn!("pruning orphaned temp file {}", path.display());
                            let _ = fs::remove_file(&path).await;
                        }
                        _ => {}
                    }
                }
                continue;
            }

            let doomed = match fs::read(&path).await {
                Ok(bytes) => match codec::deserialize(&bytes) {
                    Ok(entry) => entry.is_expired(),
                    Err(e) => {
                        warn!(
                            "dropping undecodable cache file {} during cleanup: {}",
                            path.display(),
                            e
                        );
                        true
                    }
                },
                // Lost a race with a concurrent delete, nothing to do.
                Err(e) if e.kind() == io::ErrorKind::NotFound => false,
                Err(e) => return Err(io_unavailable("read", &path, e)),
            };

            if doomed {
                match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(io_unavailable("delete", &path, e)),
                }
            }
        }
        Ok(removed)
    }
}
