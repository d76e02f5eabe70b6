use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

use crate::browser::{BrowserResult, PageElement};
use crate::crawler::extract::{parse_price, Extractor};
use crate::crawler::model::{Category, Product};
use crate::crawler::selectors;

/// `/p/<id>` segment of a product detail URL
static PRODUCT_PATH_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/p/([^/?]+)").expect("static product id pattern"));

/// Turns product cards into normalized records
#[derive(Debug, Clone)]
pub struct ProductParser {
    base_url: Url,
}

impl ProductParser {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    /// Parse one product card. `Ok(None)` means the card has no identity and
    /// is skipped; errors are hard driver failures or a stale card.
    pub async fn parse(&self, node: &dyn PageElement, category: &Category) -> BrowserResult<Option<Product>> {
        let extractor = Extractor::new(node);

        let Some(product_id) = self.product_id(&extractor).await? else {
            debug!("Skipping product card without an id in {}", category.name);
            return Ok(None);
        };

        let mut product = Product::new(product_id);

        product.name = extractor.text(selectors::NAME).await?;
        product.price = parse_price(extractor.text(selectors::PRICE).await?.as_deref());
        product.original_price = parse_price(extractor.text(selectors::ORIGINAL_PRICE).await?.as_deref());
        product.discount = extractor.text(selectors::DISCOUNT).await?;
        product.description = extractor.text(selectors::DESCRIPTION).await?;

        product.image_url = extractor
            .any_attribute(selectors::IMAGE, selectors::IMAGE_ATTRIBUTES)
            .await?
            .map(|src| self.resolve(&src));
        product.image_urls = extractor
            .all_attributes("img", selectors::IMAGE_ATTRIBUTES)
            .await?
            .iter()
            .map(|src| self.resolve(src))
            .collect();

        product.product_url = extractor
            .attribute(selectors::PRODUCT_LINK, "href")
            .await?
            .map(|href| self.resolve(&href));

        product.category = Some(category.top_level_name().to_string());
        product.sub_category = Some(category.name.clone());
        product.availability = !extractor.exists(selectors::OUT_OF_STOCK).await?;
        product.scraped_at = Some(Utc::now());

        Ok(Some(product))
    }

    /// Identity attributes first, then the detail link, then the element id
    async fn product_id(&self, extractor: &Extractor<'_>) -> BrowserResult<Option<String>> {
        if let Some(id) = extractor.own_attribute(selectors::PRODUCT_ID_ATTRIBUTES).await? {
            return Ok(Some(id));
        }

        if let Some(href) = extractor.attribute(selectors::PRODUCT_DETAIL_LINK, "href").await? {
            if let Some(id) = product_id_from_url(&href) {
                return Ok(Some(id));
            }
        }

        extractor.own_attribute(&["id"]).await
    }

    /// Absolute form of a possibly relative URL; left untouched if it cannot be joined
    pub fn resolve(&self, href: &str) -> String {
        resolve_url(&self.base_url, href)
    }
}

/// Extract the id from a `/p/<id>` product URL
pub fn product_id_from_url(href: &str) -> Option<String> {
    PRODUCT_PATH_ID
        .captures(href)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
}

pub fn resolve_url(base: &Url, href: &str) -> String {
    match Url::parse(href) {
        Ok(absolute) => absolute.to_string(),
        Err(_) => base
            .join(href)
            .map(|joined| joined.to_string())
            .unwrap_or_else(|_| href.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::snapshot::detached::DetachedNode;
    use crate::browser::{BrowserDriver, BrowserError, SnapshotDriver};

    const LISTING: &str = r#"
        <div class="grid">
            <div class="product-tile" data-product-id="100234">
                <a href="/p/100234"><img src="/img/100234.jpg"></a>
                <h3 class="product-title">Kirkland Mixed Nuts 1.13kg</h3>
                <span class="price">NT$ 1,299</span>
                <del>NT$1,499</del>
                <span class="discount">Save NT$200</span>
            </div>
            <div class="product-tile">
                <a href="https://shop.test/p/778899?ref=grid">Detail</a>
                <img class="lazy" data-src="https://cdn.test/778899.jpg">
                <span class="product-name">Paper Towels</span>
                <span class="price">Call us</span>
                <span class="out-of-stock">Sold out</span>
            </div>
            <div class="product-tile" id="tile-55">
                <span class="product-name">Gift Card</span>
            </div>
            <div class="product-tile">
                <span class="product-name">Mystery box</span>
                <a href="/c/mystery">More like this</a>
            </div>
        </div>"#;

    async fn cards() -> Vec<Box<dyn PageElement>> {
        let driver = SnapshotDriver::single("https://shop.test/c/pantry", LISTING);
        driver.navigate("https://shop.test/c/pantry").await.unwrap();
        driver.find_all(".product-tile").await.unwrap()
    }

    fn parser() -> ProductParser {
        ProductParser::new(Url::parse("https://shop.test").unwrap())
    }

    #[test]
    fn test_product_id_from_url() {
        assert_eq!(product_id_from_url("/p/100234").as_deref(), Some("100234"));
        assert_eq!(product_id_from_url("https://x.test/p/ab-9?x=1").as_deref(), Some("ab-9"));
        assert_eq!(product_id_from_url("/c/snacks"), None);
    }

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://shop.test").unwrap();
        assert_eq!(resolve_url(&base, "/p/1"), "https://shop.test/p/1");
        assert_eq!(resolve_url(&base, "https://cdn.test/a.jpg"), "https://cdn.test/a.jpg");
    }

    #[tokio::test]
    async fn test_parses_full_card() {
        let cards = cards().await;
        let category = Category::new("Nuts", "/c/nuts", Some("Food".to_string()));

        let product = parser().parse(cards[0].as_ref(), &category).await.unwrap().expect("product");

        assert_eq!(product.product_id, "100234");
        assert_eq!(product.name.as_deref(), Some("Kirkland Mixed Nuts 1.13kg"));
        assert_eq!(product.price, Some(1299.0));
        assert_eq!(product.original_price, Some(1499.0));
        assert_eq!(product.discount.as_deref(), Some("Save NT$200"));
        assert_eq!(product.image_url.as_deref(), Some("https://shop.test/img/100234.jpg"));
        assert_eq!(product.image_urls, vec!["https://shop.test/img/100234.jpg".to_string()]);
        assert_eq!(product.product_url.as_deref(), Some("https://shop.test/p/100234"));
        assert_eq!(product.category.as_deref(), Some("Food"));
        assert_eq!(product.sub_category.as_deref(), Some("Nuts"));
        assert!(product.availability);
        assert!(product.scraped_at.is_some());
        assert!(product.updated_at.is_none());
    }

    #[tokio::test]
    async fn test_id_from_detail_link_and_lazy_image() {
        let cards = cards().await;
        let category = Category::new("Paper", "/c/paper", None);

        let product = parser().parse(cards[1].as_ref(), &category).await.unwrap().expect("product");

        assert_eq!(product.product_id, "778899");
        assert_eq!(product.image_url.as_deref(), Some("https://cdn.test/778899.jpg"));
        assert_eq!(product.price, None);
        assert!(!product.availability);
        assert_eq!(product.category.as_deref(), Some("Paper"));
    }

    #[tokio::test]
    async fn test_id_falls_back_to_element_id() {
        let cards = cards().await;
        let category = Category::new("Cards", "/c/cards", None);

        let product = parser().parse(cards[2].as_ref(), &category).await.unwrap().expect("product");
        assert_eq!(product.product_id, "tile-55");
        assert_eq!(product.product_url, None);
    }

    #[tokio::test]
    async fn test_card_without_identity_is_skipped() {
        let cards = cards().await;
        let category = Category::new("Misc", "/c/misc", None);

        let product = parser().parse(cards[3].as_ref(), &category).await.unwrap();
        assert!(product.is_none());
    }

    #[tokio::test]
    async fn test_card_detached_after_id_is_an_error() {
        let card = DetachedNode {
            kept: vec![("data-product-id", "100234")],
        };
        let category = Category::new("Nuts", "/c/nuts", None);

        let result = parser().parse(&card, &category).await;
        assert!(matches!(result, Err(BrowserError::StaleElement)));
    }
}
