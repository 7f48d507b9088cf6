use crate::error::StoreError;
use crate::store::ArticleStore;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Answers "has this article already been summarised?" from the store.
#[derive(Clone)]
pub struct Deduplicator {
    store: Arc<dyn ArticleStore>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn ArticleStore>) -> Self {
        Self { store }
    }

    /// Parameterized point lookup on the dedup key. No side effects.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn exists(&self, url: &str) -> Result<bool, StoreError> {
        let seen = self.store.exists(url).await?;
        debug!(seen, "Dedup lookup");
        Ok(seen)
    }
}
