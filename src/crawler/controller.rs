use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::browser::{BrowserDriver, DriverFactory};
use crate::cli::config::ScraperSettings;
use crate::crawler::discovery::CategoryDiscoverer;
use crate::crawler::model::{Category, ScrapeRun};
use crate::crawler::pagination::PaginationCrawler;
use crate::storage::PersistenceBatcher;

/// Sequences one scrape run over a single browser session:
/// discovery, per-category crawl, persistence, teardown.
///
/// A run never fails as a whole. Problems are recorded in
/// [`ScrapeRun::errors`] and whatever was collected is still saved.
pub struct RunController {
    factory: Arc<dyn DriverFactory>,
    discoverer: CategoryDiscoverer,
    crawler: PaginationCrawler,
    batcher: PersistenceBatcher,
}

impl RunController {
    pub fn new(settings: &ScraperSettings, factory: Arc<dyn DriverFactory>, batcher: PersistenceBatcher) -> Result<Self> {
        Ok(Self {
            factory,
            discoverer: CategoryDiscoverer::from_settings(settings)?,
            crawler: PaginationCrawler::from_settings(settings)?,
            batcher,
        })
    }

    pub fn from_parts(
        factory: Arc<dyn DriverFactory>,
        discoverer: CategoryDiscoverer,
        crawler: PaginationCrawler,
        batcher: PersistenceBatcher,
    ) -> Self {
        Self {
            factory,
            discoverer,
            crawler,
            batcher,
        }
    }

    pub fn batcher(&self) -> &PersistenceBatcher {
        &self.batcher
    }

    /// Discover every category and crawl them all
    pub async fn run_all(&self) -> ScrapeRun {
        self.run(None).await
    }

    /// Crawl one caller-supplied category, skipping discovery
    pub async fn run_category(&self, url: &str, name: &str) -> ScrapeRun {
        self.run(Some(Category::new(name, url, None))).await
    }

    async fn run(&self, target: Option<Category>) -> ScrapeRun {
        let mut run = ScrapeRun::new();
        run.start_time = Some(Utc::now());

        match &target {
            Some(category) => info!("Run {} started for category {}", run.run_id, category.name),
            None => info!("Run {} started for all categories", run.run_id),
        }

        match self.factory.acquire().await {
            Ok(mut driver) => {
                if let Err(e) = self.execute(driver.as_ref(), target, &mut run).await {
                    error!("Run {} failed: {:#}", run.run_id, e);
                    run.add_error(format!("Critical: {:#}", e));
                }

                if let Err(e) = driver.dispose().await {
                    warn!("Error closing browser session: {}", e);
                }
            }
            Err(e) => {
                error!("Run {} could not start a browser session: {:#}", run.run_id, e);
                run.add_error(format!("Critical: {:#}", e));
            }
        }

        run.end_time = Some(Utc::now());
        info!(
            "Run {} completed: {} products, {} errors in {}s",
            run.run_id,
            run.products.len(),
            run.errors.len(),
            run.duration_seconds()
        );

        run
    }

    async fn execute(&self, driver: &dyn BrowserDriver, target: Option<Category>, run: &mut ScrapeRun) -> Result<()> {
        let categories = match target {
            Some(category) => vec![category],
            None => self.discoverer.discover(driver).await?,
        };

        info!("Crawling {} categories", categories.len());

        for category in &categories {
            info!("Scraping category: {}", category.name);
            match self.crawler.crawl(driver, category).await {
                Ok(products) => {
                    info!("Scraped {} products from {}", products.len(), category.name);
                    run.add_products(products);
                }
                Err(e) => {
                    error!("Error scraping category {}: {:#}", category.name, e);
                    run.add_error(format!("{}: {:#}", category.name, e));
                }
            }
        }

        if !run.products.is_empty() {
            self.batcher.save_all(&mut run.products).await;
        }

        Ok(())
    }
}
