pub mod batcher;
pub mod memory;
pub mod mongo;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::cli::config::StorageSettings;
use crate::crawler::model::Product;

// Re-export common types
pub use batcher::{PersistenceBatcher, SaveSummary, BATCH_SIZE};
pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Key/value document sink for product records, keyed by product id
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or overwrite one record
    async fn upsert(&self, key: &str, product: &Product) -> Result<()>;

    /// Upsert every record atomically: either all are written or none
    async fn batch_upsert(&self, records: Vec<(String, Product)>) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Product>>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Number of stored records
    async fn count(&self) -> Result<u64>;
}

/// Builds the configured store backend
pub struct StoreFactory;

impl StoreFactory {
    /// `None` when persistence is disabled
    pub async fn create(settings: &StorageSettings) -> Result<Option<Arc<dyn DocumentStore>>> {
        match settings.storage_type.as_str() {
            "mongodb" => {
                let store = MongoStore::new(settings).await?;
                Ok(Some(Arc::new(store)))
            }
            "memory" => Ok(Some(Arc::new(MemoryStore::new()))),
            "none" => {
                info!("Persistence disabled");
                Ok(None)
            }
            _ => {
                anyhow::bail!("Unsupported storage type: {}", settings.storage_type);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::config::CrawlerConfig;

    fn settings(storage_type: &str) -> StorageSettings {
        StorageSettings {
            storage_type: storage_type.to_string(),
            ..CrawlerConfig::default().storage
        }
    }

    #[tokio::test]
    async fn test_factory_backends() {
        assert!(StoreFactory::create(&settings("none")).await.unwrap().is_none());

        let memory = StoreFactory::create(&settings("memory")).await.unwrap().expect("store");
        assert_eq!(memory.count().await.unwrap(), 0);

        let err = StoreFactory::create(&settings("cassandra")).await.err().expect("unsupported");
        assert!(err.to_string().contains("cassandra"));
    }
}
