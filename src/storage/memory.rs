use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::crawler::model::Product;
use crate::storage::DocumentStore;

/// Process-local store with the same upsert semantics as the MongoDB backend
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Product>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Overwrite `key` but keep the first-seen `scraped_at`
fn merge(records: &mut HashMap<String, Product>, key: String, mut product: Product) {
    if let Some(existing) = records.get(&key) {
        if existing.scraped_at.is_some() {
            product.scraped_at = existing.scraped_at;
        }
    }
    records.insert(key, product);
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert(&self, key: &str, product: &Product) -> Result<()> {
        let mut records = self.records.write().await;
        merge(&mut records, key.to_string(), product.clone());
        Ok(())
    }

    async fn batch_upsert(&self, batch: Vec<(String, Product)>) -> Result<()> {
        let mut records = self.records.write().await;
        let size = batch.len();
        for (key, product) in batch {
            merge(&mut records, key, product);
        }
        debug!("Stored batch of {} records in memory", size);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Product>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.records.read().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.records.write().await.remove(key);
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.records.read().await.len() as u64)
    }
}
