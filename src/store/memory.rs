use super::ArticleStore;
use crate::error::StoreError;
use crate::models::SummaryRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, SummaryRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn exists(&self, url: &str) -> Result<bool, StoreError> {
        Ok(self.records.read().await.contains_key(url))
    }

    async fn get(&self, url: &str) -> Result<Option<SummaryRecord>, StoreError> {
        Ok(self.records.read().await.get(url).cloned())
    }

    async fn upsert(&self, record: &SummaryRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.url.clone(), record.clone());
        Ok(())
    }

    async fn latest(&self, limit: usize) -> Result<Vec<SummaryRecord>, StoreError> {
        let mut records: Vec<SummaryRecord> =
            self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.read().await.len())
    }
}
