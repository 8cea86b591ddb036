//! Cache Module
//!
//! The backend-agnostic core: the entry value object, the wire codec, key
//! namespacing and the store contract itself.

pub mod codec;
mod entry;
mod key;
mod store;


// Re-export public types
pub use entry::Entry;
pub use key::namespaced_key;
pub use store::{FetchOptions, Store, StoreExt, WriteOptions};

pub(crate) use entry::unix_now;

#[cfg(test)]
pub(crate) use store::testing;
