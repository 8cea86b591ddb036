//! Background Tasks Module
//!
//! Periodic maintenance running alongside the stores.
//!
//! # Tasks
//! - Expired-entry sweep: drops expired entries at a configured interval

mod cleanup;

pub use cleanup::spawn_cleanup_task;
