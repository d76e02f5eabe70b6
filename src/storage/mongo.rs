use anyhow::{Context, Result};
use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{ClientOptions, UpdateOptions};
use mongodb::{Client, ClientSession, Collection};
use tracing::{debug, warn};

use crate::cli::config::StorageSettings;
use crate::crawler::model::Product;
use crate::storage::DocumentStore;

const SCRAPED_AT: &str = "scrapedAt";

/// MongoDB backend; one document per product with `_id` = product id
pub struct MongoStore {
    /// MongoDB client, needed to open transaction sessions
    client: Client,

    collection: Collection<Document>,
}

impl MongoStore {
    pub async fn new(settings: &StorageSettings) -> Result<Self> {
        // Parse connection options
        let client_options = ClientOptions::parse(&settings.connection_string)
            .await
            .context(format!("Failed to parse MongoDB connection string: {}", settings.connection_string))?;

        let client = Client::with_options(client_options)
            .context("Failed to create MongoDB client")?;

        let database = client.database(&settings.database_name);

        // Test connection
        database.list_collection_names(None)
            .await
            .context("Failed to connect to MongoDB")?;

        debug!("Connected to MongoDB database: {}", settings.database_name);

        Ok(Self {
            collection: database.collection(&settings.collection),
            client,
        })
    }

    /// `$set` everything but `scrapedAt`, which is only written on insert
    fn update_for(product: &Product) -> Result<Document> {
        let mut fields = mongodb::bson::to_document(product)
            .context("Failed to convert product to BSON document")?;

        let scraped_at = fields.remove(SCRAPED_AT).unwrap_or(Bson::Null);

        Ok(doc! {
            "$set": fields,
            "$setOnInsert": { SCRAPED_AT: scraped_at },
        })
    }

    fn upsert_options() -> UpdateOptions {
        UpdateOptions::builder().upsert(true).build()
    }

    async fn write_batch(&self, session: &mut ClientSession, records: &[(String, Product)]) -> Result<()> {
        for (key, product) in records {
            let update = Self::update_for(product)?;
            self.collection
                .update_one_with_session(doc! { "_id": key.as_str() }, update, Self::upsert_options(), session)
                .await
                .context(format!("Failed to upsert product {}", key))?;
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn upsert(&self, key: &str, product: &Product) -> Result<()> {
        let update = Self::update_for(product)?;

        self.collection
            .update_one(doc! { "_id": key }, update, Self::upsert_options())
            .await
            .context("Failed to upsert product in MongoDB")?;

        debug!("Upserted product: {}", key);
        Ok(())
    }

    async fn batch_upsert(&self, records: Vec<(String, Product)>) -> Result<()> {
        let mut session = self.client
            .start_session(None)
            .await
            .context("Failed to start MongoDB session")?;

        session
            .start_transaction(None)
            .await
            .context("Failed to start MongoDB transaction")?;

        if let Err(e) = self.write_batch(&mut session, &records).await {
            if let Err(abort) = session.abort_transaction().await {
                warn!("Failed to abort MongoDB transaction: {}", abort);
            }
            return Err(e);
        }

        session
            .commit_transaction()
            .await
            .context("Failed to commit MongoDB transaction")?;

        debug!("Committed batch of {} products", records.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Product>> {
        let result = self.collection
            .find_one(doc! { "_id": key }, None)
            .await
            .context("Failed to query MongoDB for product")?;

        match result {
            Some(mut document) => {
                document.remove("_id");
                let product = mongodb::bson::from_document(document)
                    .context("Failed to convert BSON document to Product")?;
                Ok(Some(product))
            }
            None => Ok(None),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let count = self.collection
            .count_documents(doc! { "_id": key }, None)
            .await
            .context("Failed to count product in MongoDB")?;

        Ok(count > 0)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.collection
            .delete_one(doc! { "_id": key }, None)
            .await
            .context("Failed to delete product from MongoDB")?;

        debug!("Deleted product: {}", key);
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        self.collection
            .count_documents(None, None)
            .await
            .context("Failed to count products in MongoDB")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_scraped_at_is_insert_only() {
        let mut product = Product::new("100234");
        product.name = Some("Mixed Nuts".to_string());
        product.scraped_at = Some(Utc::now());
        product.updated_at = product.scraped_at;

        let update = MongoStore::update_for(&product).unwrap();

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("productId").unwrap(), "100234");
        assert_eq!(set.get_str("name").unwrap(), "Mixed Nuts");
        assert!(set.contains_key("updatedAt"));
        assert!(!set.contains_key(SCRAPED_AT));

        let on_insert = update.get_document("$setOnInsert").unwrap();
        assert!(on_insert.contains_key(SCRAPED_AT));
    }
}
