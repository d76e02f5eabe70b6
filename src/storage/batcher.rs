use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::crawler::model::Product;
use crate::storage::DocumentStore;

/// Records committed per store transaction
pub const BATCH_SIZE: usize = 500;

/// Outcome of one [`PersistenceBatcher::save_all`] call
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub saved: usize,
    /// 1-based numbers of the batches that failed
    pub failed_batches: Vec<usize>,
}

/// Writes scraped products to the document store in bounded batches
#[derive(Clone)]
pub struct PersistenceBatcher {
    store: Option<Arc<dyn DocumentStore>>,
}

impl PersistenceBatcher {
    pub fn new(store: Option<Arc<dyn DocumentStore>>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Option<&Arc<dyn DocumentStore>> {
        self.store.as_ref()
    }

    /// Stamp and upsert `products` chunk by chunk.
    ///
    /// Every record gets the same `updated_at`; `scraped_at` is only filled in
    /// where missing. A failed chunk is logged and the next one still runs.
    pub async fn save_all(&self, products: &mut [Product]) -> SaveSummary {
        let mut summary = SaveSummary::default();

        let Some(store) = &self.store else {
            warn!("Document store unavailable, skipping save of {} products", products.len());
            return summary;
        };

        if products.is_empty() {
            debug!("No products to save");
            return summary;
        }

        let now = Utc::now();
        for product in products.iter_mut() {
            product.updated_at = Some(now);
            if product.scraped_at.is_none() {
                product.scraped_at = Some(now);
            }
        }

        let total_batches = products.len().div_ceil(BATCH_SIZE);

        for (index, chunk) in products.chunks(BATCH_SIZE).enumerate() {
            let batch = index + 1;
            let records = chunk
                .iter()
                .map(|product| (product.product_id.clone(), product.clone()))
                .collect();

            match store.batch_upsert(records).await {
                Ok(()) => {
                    summary.saved += chunk.len();
                    debug!("Saved batch {}/{} ({} products)", batch, total_batches, chunk.len());
                }
                Err(e) => {
                    warn!("Error saving batch {}/{}: {:#}", batch, total_batches, e);
                    summary.failed_batches.push(batch);
                }
            }
        }

        info!("Saved {}/{} products in {} batches", summary.saved, products.len(), total_batches);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, MockDocumentStore};
    use chrono::Duration;
    use mockall::Sequence;

    fn products(count: usize) -> Vec<Product> {
        (0..count).map(|i| Product::new(format!("sku-{i}"))).collect()
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_later_ones() {
        let mut store = MockDocumentStore::new();
        let mut seq = Sequence::new();

        store
            .expect_batch_upsert()
            .withf(|records| records.len() == 500 && records[0].0 == "sku-0")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        store
            .expect_batch_upsert()
            .withf(|records| records.len() == 500 && records[0].0 == "sku-500")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(anyhow::anyhow!("transaction aborted")));
        store
            .expect_batch_upsert()
            .withf(|records| records.len() == 200 && records[199].0 == "sku-1199")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let batcher = PersistenceBatcher::new(Some(Arc::new(store)));
        let mut items = products(1200);

        let summary = batcher.save_all(&mut items).await;

        assert_eq!(summary.saved, 700);
        assert_eq!(summary.failed_batches, vec![2]);
    }

    #[tokio::test]
    async fn test_stamps_share_one_timestamp() {
        let batcher = PersistenceBatcher::new(Some(Arc::new(MemoryStore::new())));
        let first_seen = Utc::now() - Duration::days(1);

        let mut items = products(3);
        items[1].scraped_at = Some(first_seen);

        batcher.save_all(&mut items).await;

        let updated = items[0].updated_at.expect("stamped");
        assert!(items.iter().all(|p| p.updated_at == Some(updated)));
        assert_eq!(items[0].scraped_at, Some(updated));
        assert_eq!(items[1].scraped_at, Some(first_seen));
    }

    #[tokio::test]
    async fn test_resave_keeps_one_record_with_first_scrape_time() {
        let store = Arc::new(MemoryStore::new());
        let batcher = PersistenceBatcher::new(Some(store.clone() as Arc<dyn DocumentStore>));

        let mut first = vec![Product::new("42")];
        first[0].price = Some(10.0);
        batcher.save_all(&mut first).await;
        let first_scraped = first[0].scraped_at;

        let mut second = vec![Product::new("42")];
        second[0].price = Some(11.0);
        batcher.save_all(&mut second).await;

        assert_eq!(store.count().await.unwrap(), 1);
        let stored = store.get("42").await.unwrap().expect("record");
        assert_eq!(stored.price, Some(11.0));
        assert_eq!(stored.scraped_at, first_scraped);
        assert!(stored.updated_at >= second[0].updated_at);
    }

    #[tokio::test]
    async fn test_no_store_or_empty_list_is_a_no_op() {
        let mut items = products(2);
        let summary = PersistenceBatcher::new(None).save_all(&mut items).await;
        assert!(items.iter().all(|p| p.updated_at.is_none()));
        assert_eq!(summary, SaveSummary::default());

        let mut store = MockDocumentStore::new();
        store.expect_batch_upsert().times(0);
        PersistenceBatcher::new(Some(Arc::new(store))).save_all(&mut []).await;
    }
}
