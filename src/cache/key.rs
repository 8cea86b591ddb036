//! Key Normalization Module
//!
//! Maps user-facing keys to the namespaced form handed to backends.

// == Namespacing ==
/// Returns the backend key for a user key under an optional namespace.
///
/// With a namespace the result is `"{namespace}:{key}"`; without one the key
/// passes through unchanged. Two stores with different namespaces therefore
/// never collide on the same backend.
pub fn namespaced_key(namespace: Option<&str>, key: &str) -> String {
    match namespace {
        Some(ns) => format!("{}:{}", ns, key),
        None => key.to_string(),
    }
}
