use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{BrowserDriver, BrowserError, Pacer};
use crate::cli::config::ScraperSettings;
use crate::crawler::model::{Category, Product};
use crate::crawler::parser::ProductParser;
use crate::crawler::selectors;

/// Why a category crawl stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Product grid never appeared
    Timeout,
    NoProducts,
    MaxPages,
    LastPage,
    /// Navigation or another page-level driver failure
    PageError,
}

/// Walks the listing pages of one category
pub struct PaginationCrawler {
    base_url: Url,
    max_pages: u32,
    element_wait: Duration,
    pacer: Pacer,
    parser: ProductParser,
}

impl PaginationCrawler {
    pub fn new(base_url: Url, max_pages: u32, element_wait: Duration, pacer: Pacer) -> Self {
        let parser = ProductParser::new(base_url.clone());
        Self {
            base_url,
            max_pages,
            element_wait,
            pacer,
            parser,
        }
    }

    pub fn from_settings(settings: &ScraperSettings) -> Result<Self> {
        let base_url = Url::parse(&settings.base_url)
            .with_context(|| format!("Invalid base URL: {}", settings.base_url))?;

        Ok(Self::new(
            base_url,
            settings.max_pages,
            Duration::from_secs(settings.element_wait_secs),
            Pacer::from_settings(settings),
        ))
    }

    /// Crawl every listing page of `category` and return the parsed products.
    ///
    /// Page-level failures end the crawl with whatever was collected. Only a
    /// lost browser session or an unusable category URL is an error.
    pub async fn crawl(&self, driver: &dyn BrowserDriver, category: &Category) -> Result<Vec<Product>> {
        let category_url = self.category_url(&category.url)?;
        let mut products = Vec::new();
        let mut page = 1;

        let reason = loop {
            if page > self.max_pages {
                break StopReason::MaxPages;
            }

            let page_url = page_url(&category_url, page);
            info!("Scraping page {} of category: {}", page, category.name);

            match self.crawl_page(driver, category, &page_url, page, &mut products).await {
                Ok(Some(reason)) => break reason,
                Ok(None) => page += 1,
                Err(e) if e.is_fatal() => {
                    return Err(e).with_context(|| format!("Lost browser session on page {}", page));
                }
                Err(e) => {
                    warn!("Error scraping page {} of category {}: {}", page, category.name, e);
                    break StopReason::PageError;
                }
            }
        };

        info!(
            "Finished category {}: {} products ({:?} after page {})",
            category.name,
            products.len(),
            reason,
            page.min(self.max_pages)
        );

        Ok(products)
    }

    /// Scrape one page into `products`. `Some(reason)` means stop after it.
    async fn crawl_page(
        &self,
        driver: &dyn BrowserDriver,
        category: &Category,
        page_url: &str,
        page: u32,
        products: &mut Vec<Product>,
    ) -> Result<Option<StopReason>, BrowserError> {
        driver.navigate(page_url).await?;
        self.pacer.pause().await;

        let product_selector = selectors::group(selectors::PRODUCT_CARD);

        match driver.wait_for_selector(&product_selector, self.element_wait).await {
            Ok(()) => {}
            Err(BrowserError::Timeout(_)) => {
                info!("No products found on page {}, stopping pagination", page);
                return Ok(Some(StopReason::Timeout));
            }
            Err(e) => return Err(e),
        }

        self.pacer.load_lazy_content(driver).await?;

        let elements = driver.find_all(&product_selector).await?;
        if elements.is_empty() {
            info!("No products found on page {}", page);
            return Ok(Some(StopReason::NoProducts));
        }

        info!("Found {} product elements on page {}", elements.len(), page);

        for element in &elements {
            match self.parser.parse(element.as_ref(), category).await {
                Ok(Some(product)) => products.push(product),
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Skipping product on page {}: {}", page, e),
            }
        }

        if has_next_page(driver).await? {
            Ok(None)
        } else {
            debug!("No next page control after page {}", page);
            Ok(Some(StopReason::LastPage))
        }
    }

    fn category_url(&self, url: &str) -> Result<Url> {
        self.base_url
            .join(url)
            .with_context(|| format!("Invalid category URL: {}", url))
    }
}

/// The category URL itself for page 1, `page=N` appended after that
pub fn page_url(category_url: &Url, page: u32) -> String {
    if page <= 1 {
        return category_url.to_string();
    }

    let mut url = category_url.clone();
    url.query_pairs_mut().append_pair("page", &page.to_string());
    url.to_string()
}

/// Whether an enabled "next" control is on the page; lookup failures count as no
async fn has_next_page(driver: &dyn BrowserDriver) -> Result<bool, BrowserError> {
    match driver.find_all(&selectors::group(selectors::NEXT_PAGE)).await {
        Ok(controls) => Ok(!controls.is_empty()),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            debug!("Next page lookup failed: {}", e);
            Ok(false)
        }
    }
}
