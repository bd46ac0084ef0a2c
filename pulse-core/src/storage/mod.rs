//! Persistent snapshot storage.
//!
//! A backend persists the registry's point-in-time state and restores
//! it at startup. Two implementations exist: a JSON file snapshot and a
//! PostgreSQL table. Callers serialize access externally; a backend
//! never sees concurrent `save` calls.

use async_trait::async_trait;

use crate::error::Result;

pub mod database;
pub mod file;
pub mod migrations;

pub use database::DbStorage;
pub use file::FileStorage;

/// The interface that groups the persistent storage operations.
#[async_trait]
pub trait PersistentStorage: Send + Sync {
    /// Persist the current registry contents.
    async fn save(&self) -> Result<()>;

    /// Replace the registry contents with the last persisted snapshot.
    async fn restore(&self) -> Result<()>;
}
