//! inkwell/crates/storage-adapters/src/lib.rs
//!
//! Storage adapters for the domain ports: a SQLite datastore and local
//! filesystem media storage, each behind a cargo feature.

#[cfg(feature = "media-local")]
pub mod media;
#[cfg(feature = "db-sqlite")]
pub mod sqlite;

#[cfg(feature = "media-local")]
pub use media::{LocalMediaStorage, MediaError};
#[cfg(feature = "db-sqlite")]
pub use sqlite::SqliteStore;
