//! Keyed summary store.
//!
//! The pipeline only calls [`ArticleStore::exists`] and [`ArticleStore::upsert`];
//! the display path only calls [`ArticleStore::latest`]. Each call is atomic
//! on its own, so the two paths share a store without extra locking.
//!
//! | Backend | Module | Notes |
//! |---------|--------|-------|
//! | SQLite | [`sqlite`] | Default; survives restarts |
//! | Memory | [`memory`] | `:memory:`; tests and throwaway runs |

pub mod memory;
pub mod sqlite;

use crate::error::StoreError;
use crate::models::SummaryRecord;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Path value selecting the in-memory backend.
pub const MEMORY_PATH: &str = ":memory:";

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Point lookup by primary key.
    async fn exists(&self, url: &str) -> Result<bool, StoreError>;

    async fn get(&self, url: &str) -> Result<Option<SummaryRecord>, StoreError>;

    /// Insert, or replace the record with the same `url`.
    async fn upsert(&self, record: &SummaryRecord) -> Result<(), StoreError>;

    /// Most recent records first, by `created_at`.
    async fn latest(&self, limit: usize) -> Result<Vec<SummaryRecord>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

/// Open the backend named by `path`.
#[instrument(level = "info")]
pub async fn open(path: &str) -> Result<Arc<dyn ArticleStore>, StoreError> {
    if path == MEMORY_PATH {
        info!("Using in-memory summary store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = SqliteStore::open(path).await?;
    Ok(Arc::new(store))
}
