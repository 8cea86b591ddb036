//! Integration Tests for the Store Contract
//!
//! Drives the public operations end to end against the shipped backends,
//! including cross-instance behavior a single backend's unit tests can't
//! reach.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cachefront::cache::codec;
use cachefront::{
    spawn_cleanup_task, CacheError, FetchOptions, FileStore, MemoryStore, NullStore, Store,
    StoreConfig, StoreExt, WriteOptions,
};
use tempfile::tempdir;

// == Helper Functions ==

fn memory_store() -> MemoryStore {
    MemoryStore::new(StoreConfig::default()).unwrap()
}

fn file_store(dir: &Path) -> FileStore {
    FileStore::new(dir, StoreConfig::default()).unwrap()
}

fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

/// Paths of the entry files a file store has written under `dir`.
fn cache_files(dir: &Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|dirent| dirent.unwrap().path())
        .filter(|path| path.extension().map_or(false, |ext| ext == "cache"))
        .collect()
}

/// The write/read/exists/delete lifecycle every real backend must satisfy.
async fn assert_greeting_lifecycle<S: Store>(store: &S) {
    store
        .write(
            "greeting",
            "hello",
            &WriteOptions::new().with_expires_in(Duration::from_secs(60)),
        )
        .await
        .unwrap();

    assert_eq!(
        store.read("greeting", None).await.unwrap(),
        Some("hello".to_string())
    );
    assert!(store.exists("greeting", None).await.unwrap());
    assert!(store.delete("greeting").await.unwrap());
    assert_eq!(store.read("greeting", None).await.unwrap(), None);
    assert!(!store.delete("greeting").await.unwrap());
}

// == Lifecycle Tests ==

#[tokio::test]
async fn test_greeting_lifecycle_on_memory() {
    assert_greeting_lifecycle(&memory_store()).await;
}

#[tokio::test]
async fn test_greeting_lifecycle_on_file() {
    let dir = tempdir().unwrap();
    assert_greeting_lifecycle(&file_store(dir.path())).await;
}

#[tokio::test]
async fn test_null_store_accepts_and_drops_everything() {
    let store = NullStore::new(StoreConfig::default()).unwrap();

    store.write("greeting", "hello", &WriteOptions::new()).await.unwrap();

    assert_eq!(store.read("greeting", None).await.unwrap(), None);
    assert!(!store.exists("greeting", None).await.unwrap());
    assert!(!store.delete("greeting").await.unwrap());
}

// == Expiry Tests ==

#[tokio::test]
async fn test_entries_expire_on_memory() {
    let store = memory_store();

    store
        .write(
            "short",
            "lived",
            &WriteOptions::new().with_expires_in(Duration::from_millis(50)),
        )
        .await
        .unwrap();

    assert_eq!(store.read("short", None).await.unwrap(), Some("lived".to_string()));

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(store.read("short", None).await.unwrap(), None);
    assert!(!store.exists("short", None).await.unwrap());
    // The expired read already evicted the entry.
    assert!(!store.delete("short").await.unwrap());
}

#[tokio::test]
async fn test_entries_expire_on_file() {
    let dir = tempdir().unwrap();
    let store = file_store(dir.path());

    store
        .write(
            "short",
            "lived",
            &WriteOptions::new().with_expires_in(Duration::from_millis(50)),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(store.read("short", None).await.unwrap(), None);
    assert!(cache_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_absolute_expiration_in_the_past_is_a_miss() {
    let store = memory_store();

    store
        .write("bygone", "value", &WriteOptions::new().with_expires_at(epoch_secs() - 30.0))
        .await
        .unwrap();

    assert_eq!(store.read("bygone", None).await.unwrap(), None);
}

// == Versioning Tests ==

#[tokio::test]
async fn test_version_mismatch_leaves_entry_intact() {
    let store = memory_store();

    store
        .write("post", "body", &WriteOptions::new().with_version(1))
        .await
        .unwrap();

    assert_eq!(store.read("post", Some(2)).await.unwrap(), None);
    assert_eq!(store.read("post", Some(1)).await.unwrap(), Some("body".to_string()));
}

// == Namespace Tests ==

#[tokio::test]
async fn test_namespaces_isolate_stores_sharing_a_directory() {
    let dir = tempdir().unwrap();
    let sessions = FileStore::new(
        dir.path(),
        StoreConfig::default().with_namespace("sessions"),
    )
    .unwrap();
    let pages = FileStore::new(dir.path(), StoreConfig::default().with_namespace("pages")).unwrap();

    sessions.write("current", "session data", &WriteOptions::new()).await.unwrap();
    pages.write("current", "page data", &WriteOptions::new()).await.unwrap();

    assert_eq!(
        sessions.read("current", None).await.unwrap(),
        Some("session data".to_string())
    );
    assert_eq!(
        pages.read("current", None).await.unwrap(),
        Some("page data".to_string())
    );

    sessions.delete("current").await.unwrap();
    assert_eq!(sessions.read("current", None).await.unwrap(), None);
    assert_eq!(
        pages.read("current", None).await.unwrap(),
        Some("page data".to_string())
    );
}

#[tokio::test]
async fn test_clear_crosses_namespace_boundaries() {
    let dir = tempdir().unwrap();
    let sessions = FileStore::new(
        dir.path(),
        StoreConfig::default().with_namespace("sessions"),
    )
    .unwrap();
    let pages = FileStore::new(dir.path(), StoreConfig::default().with_namespace("pages")).unwrap();

    sessions.write("current", "session data", &WriteOptions::new()).await.unwrap();
    pages.write("current", "page data", &WriteOptions::new()).await.unwrap();

    // Clear empties the backing store, not just the caller's namespace.
    sessions.clear().await.unwrap();

    assert_eq!(sessions.read("current", None).await.unwrap(), None);
    assert_eq!(pages.read("current", None).await.unwrap(), None);
}

// == Compression Tests ==

#[tokio::test]
async fn test_large_values_are_stored_compressed() {
    let dir = tempdir().unwrap();
    let store = file_store(dir.path());
    let value = "a page worth of text ".repeat(200);

    store.write("page", &value, &WriteOptions::new()).await.unwrap();

    let bytes = std::fs::read(&cache_files(dir.path())[0]).unwrap();
    assert_eq!(bytes[0], codec::MARKER_COMPRESSED);
    assert!(bytes.len() < value.len());
    assert_eq!(store.read("page", None).await.unwrap(), Some(value));
}

#[tokio::test]
async fn test_small_values_are_stored_verbatim() {
    let dir = tempdir().unwrap();
    let store = file_store(dir.path());

    store.write("tiny", "hello", &WriteOptions::new()).await.unwrap();

    let bytes = std::fs::read(&cache_files(dir.path())[0]).unwrap();
    assert_eq!(bytes[0], codec::MARKER_UNCOMPRESSED);
    assert_eq!(store.read("tiny", None).await.unwrap(), Some("hello".to_string()));
}

#[tokio::test]
async fn test_disabling_compression_keeps_large_values_verbatim() {
    let dir = tempdir().unwrap();
    let store = FileStore::new(dir.path(), StoreConfig::default().with_compress(false)).unwrap();
    let value = "a page worth of text ".repeat(200);

    store.write("page", &value, &WriteOptions::new()).await.unwrap();

    let bytes = std::fs::read(&cache_files(dir.path())[0]).unwrap();
    assert_eq!(bytes[0], codec::MARKER_UNCOMPRESSED);
    assert_eq!(store.read("page", None).await.unwrap(), Some(value));
}

#[tokio::test]
async fn test_per_call_threshold_overrides_store_default() {
    let dir = tempdir().unwrap();
    let store = file_store(dir.path());

    // Well under the default 1024-byte threshold, but over the override.
    let value = "repetitive ".repeat(20);
    store
        .write("small", &value, &WriteOptions::new().with_compress_threshold(16))
        .await
        .unwrap();

    let bytes = std::fs::read(&cache_files(dir.path())[0]).unwrap();
    assert_eq!(bytes[0], codec::MARKER_COMPRESSED);
    assert_eq!(store.read("small", None).await.unwrap(), Some(value));
}

// == Persistence Tests ==

#[tokio::test]
async fn test_file_entries_survive_across_store_instances() {
    let dir = tempdir().unwrap();

    file_store(dir.path())
        .write("durable", "value", &WriteOptions::new())
        .await
        .unwrap();

    let reopened = file_store(dir.path());
    assert_eq!(
        reopened.read("durable", None).await.unwrap(),
        Some("value".to_string())
    );
}

// == Fetch Tests ==

#[tokio::test]
async fn test_fetch_generates_once_then_hits() {
    let store = memory_store();
    let calls = AtomicUsize::new(0);
    let calls_ref = &calls;

    for _ in 0..3 {
        let value = store
            .fetch("config", &FetchOptions::new(), move || async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                "computed".to_string()
            })
            .await
            .unwrap();
        assert_eq!(value, "computed");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.read("config", None).await.unwrap(), Some("computed".to_string()));
}

#[tokio::test]
async fn test_stale_value_survives_regeneration_window_across_instances() {
    let dir = tempdir().unwrap();
    let first = file_store(dir.path());
    let second = file_store(dir.path());

    first
        .write("report", "stale", &WriteOptions::new().with_expires_in(Duration::ZERO))
        .await
        .unwrap();

    let calls = AtomicUsize::new(0);
    let calls_ref = &calls;
    let options = FetchOptions::new().with_race_condition_ttl(Duration::from_secs(10));

    // The first caller repairs the entry and gets the stale value back.
    let value = first
        .fetch("report", &options, move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            "new".to_string()
        })
        .await
        .unwrap();
    assert_eq!(value, "stale");

    // The repair was persisted, so another instance sees a plain hit.
    let value = second
        .fetch("report", &options, move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            "new".to_string()
        })
        .await
        .unwrap();
    assert_eq!(value, "stale");

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_store_is_usable_as_a_trait_object() {
    let store: Arc<dyn Store> = Arc::new(memory_store());

    store.write("key", "value", &WriteOptions::new()).await.unwrap();
    assert_eq!(store.read("key", None).await.unwrap(), Some("value".to_string()));

    let fetched = store
        .fetch("other", &FetchOptions::new(), || async { "generated".to_string() })
        .await
        .unwrap();
    assert_eq!(fetched, "generated");
}

// == Cleanup Task Tests ==

#[tokio::test]
async fn test_cleanup_task_sweeps_expired_files() {
    let dir = tempdir().unwrap();
    let store = file_store(dir.path());

    store
        .write(
            "doomed",
            "value",
            &WriteOptions::new().with_expires_at(epoch_secs() - 1.0),
        )
        .await
        .unwrap();
    assert_eq!(cache_files(dir.path()).len(), 1);

    let handle = spawn_cleanup_task(store.clone(), Duration::from_millis(50));
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.abort();

    assert!(cache_files(dir.path()).is_empty());
}

// == Error Tests ==

#[tokio::test]
async fn test_invalid_configuration_is_rejected_at_construction() {
    let empty_namespace = StoreConfig::default().with_namespace("");
    assert!(matches!(
        MemoryStore::new(empty_namespace),
        Err(CacheError::InvalidConfiguration(_))
    ));

    let zero_threshold = StoreConfig::default().with_compress_threshold(0);
    assert!(matches!(
        NullStore::new(zero_threshold),
        Err(CacheError::InvalidConfiguration(_))
    ));
}

#[tokio::test]
async fn test_unreachable_directory_reports_backend_unavailable() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"a file where a directory should be").unwrap();

    let store = FileStore::new(blocker.join("sub"), StoreConfig::default()).unwrap();

    let err = store.write("key", "value", &WriteOptions::new()).await.unwrap_err();
    assert!(matches!(err, CacheError::BackendUnavailable(_)));

    let err = store.read("key", None).await.unwrap_err();
    assert!(matches!(err, CacheError::BackendUnavailable(_)));
}

#[tokio::test]
async fn test_tampered_file_is_served_as_a_miss() {
    let dir = tempdir().unwrap();
    let store = file_store(dir.path());

    store.write("key", "value", &WriteOptions::new()).await.unwrap();
    let path = cache_files(dir.path()).pop().unwrap();
    std::fs::write(&path, b"\xFFnot a cache entry").unwrap();

    assert_eq!(store.read("key", None).await.unwrap(), None);
    assert!(!store.exists("key", None).await.unwrap());
}
