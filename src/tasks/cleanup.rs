//! Expired-Entry Sweep Task
//!
//! Background task that periodically removes expired cache entries, keeping
//! backends from accumulating dead weight between lazy read-time evictions.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::Cleanup;

/// Spawns a background task that periodically sweeps expired entries.
///
/// The task loops forever, sleeping for `interval` between sweeps. Sweep
/// failures are logged and the loop keeps going; a backend that is down for
/// one sweep gets retried on the next.
///
/// # Arguments
/// * `store` - The store to sweep; stores that share state clone cheaply
/// * `interval` - Time between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, used to abort it during shutdown.
///
/// # Example
/// ```ignore
/// let store = MemoryStore::new(StoreConfig::default())?;
/// let handle = spawn_cleanup_task(store.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_cleanup_task<C>(store: C, interval: Duration) -> JoinHandle<()>
where
    C: Cleanup + 'static,
{
    tokio::spawn(async move {
        info!(
            "starting expired-entry sweep with interval of {:?}",
            interval
        );

        loop {
            tokio::time::sleep(interval).await;

            match store.cleanup().await {
                Ok(removed) if removed > 0 => {
                    info!("expired-entry sweep removed {} entries", removed);
                }
                Ok(_) => {
                    debug!("expired-entry sweep found nothing to remove");
                }
                Err(e) => {
                    warn!("expired-entry sweep failed, will retry: {}", e);
                }
            }
        }
    })
}
