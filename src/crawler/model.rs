use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A navigable grouping of products on the source site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: String,
    pub url: String,
    pub parent_category: Option<String>,
}

impl Category {
    pub fn new(name: impl Into<String>, url: impl Into<String>, parent_category: Option<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            parent_category,
        }
    }

    /// Top-level label a product is filed under
    pub fn top_level_name(&self) -> &str {
        self.parent_category.as_deref().unwrap_or(&self.name)
    }
}

/// One catalog item as stored in the document store
///
/// Everything except `product_id` is optional: a missing value means the
/// field was not found on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_id: String,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub original_price: Option<f64>,
    pub discount: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub product_url: Option<String>,
    pub description: Option<String>,
    pub availability: bool,
    pub scraped_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Product {
    /// An otherwise empty, available record for `product_id`
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            name: None,
            price: None,
            original_price: None,
            discount: None,
            image_url: None,
            image_urls: Vec::new(),
            category: None,
            sub_category: None,
            product_url: None,
            description: None,
            availability: true,
            scraped_at: None,
            updated_at: None,
        }
    }
}

/// Outcome of one scrape run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRun {
    pub run_id: Uuid,
    pub products: Vec<Product>,
    pub errors: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ScrapeRun {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            products: Vec::new(),
            errors: Vec::new(),
            start_time: None,
            end_time: None,
        }
    }

    pub fn add_products(&mut self, products: Vec<Product>) {
        self.products.extend(products);
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// `end_time - start_time`, zero while either is unset
    pub fn duration(&self) -> chrono::Duration {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end - start,
            _ => chrono::Duration::zero(),
        }
    }

    pub fn duration_seconds(&self) -> i64 {
        self.duration().num_seconds()
    }
}

impl Default for ScrapeRun {
    fn default() -> Self {
        Self::new()
    }
}
