//! Storage backends for querysmith.
//!
//! Both backends implement `querysmith_core::DatasetStore`.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteStore, SyncReport};
