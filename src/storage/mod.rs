//! Durable storage for the distribution state
//!
//! Each backend implements
//! [`PersistenceAdapter`](crate::scheduler::PersistenceAdapter) over a single
//! slot holding at most one run:
//!
//! - [`FileStateStore`] - JSON file, replaced atomically on every save
//! - [`SqliteStateStore`] - keyed row in an embedded SQLite database
//! - [`MemoryStateStore`] - shared in-process slot, for tests and embedders

pub mod file;
pub mod memory;
pub mod sqlite;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;

use anyhow::{Context, Result};

use crate::config::{StorageBackend, StorageConfig};
use crate::scheduler::PersistenceAdapter;

/// Open the backend selected by the configuration
pub fn open_store(config: &StorageConfig) -> Result<Box<dyn PersistenceAdapter>> {
    let store: Box<dyn PersistenceAdapter> = match config.backend {
        StorageBackend::File => Box::new(FileStateStore::new(&config.path)),
        StorageBackend::Sqlite => Box::new(
            SqliteStateStore::open(&config.path, &config.key).with_context(|| {
                format!("Failed to open state database: {}", config.path.display())
            })?,
        ),
        StorageBackend::Memory => Box::new(MemoryStateStore::new()),
    };

    tracing::debug!(
        backend = %config.backend,
        path = %config.path.display(),
        "Opened state store"
    );
    Ok(store)
}
