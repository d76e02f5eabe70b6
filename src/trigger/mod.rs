pub mod http;
pub mod schedule;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::crawler::guard::{RunPermit, SingleFlightGuard};
use crate::crawler::model::ScrapeRun;
use crate::crawler::RunController;

/// Why a trigger did not produce a run
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Scraping is already in progress")]
    Busy,

    #[error("Scrape run aborted: {0}")]
    Aborted(String),
}

/// Outcome of a fire-and-forget trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Accepted,
    Busy,
}

/// What a caller gets back about a finished run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub products_scraped: usize,
    pub errors: Vec<String>,
    pub duration_seconds: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn from_run(run: &ScrapeRun, category: Option<&str>) -> Self {
        Self {
            run_id: run.run_id,
            category: category.map(str::to_string),
            products_scraped: run.products.len(),
            errors: run.errors.clone(),
            duration_seconds: run.duration_seconds(),
            start_time: run.start_time,
            end_time: run.end_time,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub is_running: bool,
    pub product_count: u64,
    pub timestamp: DateTime<Utc>,
}

enum Target {
    All,
    Category { url: String, name: String },
}

/// Entry points shared by the HTTP surface, the scheduler and the CLI.
/// Every run goes through the single-flight guard.
#[derive(Clone)]
pub struct ScrapeService {
    guard: Arc<SingleFlightGuard>,
    controller: Arc<RunController>,
}

impl ScrapeService {
    pub fn new(controller: Arc<RunController>) -> Self {
        Self {
            guard: Arc::new(SingleFlightGuard::new()),
            controller,
        }
    }

    pub fn guard(&self) -> &Arc<SingleFlightGuard> {
        &self.guard
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Start a full run in the background
    pub fn trigger_async(&self) -> Dispatch {
        let Some(permit) = self.guard.permit() else {
            warn!("Scraping is already in progress");
            return Dispatch::Busy;
        };

        let controller = Arc::clone(&self.controller);
        tokio::spawn(async move {
            info!("Starting async scraping task");
            if let Ok(run) = supervise(controller, Target::All, permit).await {
                log_run("Scraping", &run);
            }
        });

        Dispatch::Accepted
    }

    /// Run everything and wait for the result
    pub async fn trigger_sync(&self) -> Result<ScrapeRun, TriggerError> {
        let permit = self.guard.permit().ok_or(TriggerError::Busy)?;
        supervise(Arc::clone(&self.controller), Target::All, permit).await
    }

    /// Crawl one category and wait for the result
    pub async fn trigger_category(&self, url: &str, name: &str) -> Result<ScrapeRun, TriggerError> {
        let permit = self.guard.permit().ok_or(TriggerError::Busy)?;
        let target = Target::Category {
            url: url.to_string(),
            name: name.to_string(),
        };
        supervise(Arc::clone(&self.controller), target, permit).await
    }

    /// Cron tick: skipped while another run holds the guard, never fails
    pub async fn scheduled_run(&self) {
        info!("Starting scheduled scraping task at {}", Utc::now().to_rfc3339());

        match self.trigger_sync().await {
            Ok(run) => log_run("Scheduled scraping", &run),
            Err(TriggerError::Busy) => warn!("Skipping scheduled scraping: a run is already in progress"),
            Err(e) => error!("Scheduled scraping failed: {}", e),
        }
    }

    pub async fn status(&self) -> ServiceStatus {
        ServiceStatus {
            is_running: self.is_running(),
            product_count: self.product_count().await,
            timestamp: Utc::now(),
        }
    }

    /// Stored product count; zero when persistence is off or the store fails
    pub async fn product_count(&self) -> u64 {
        let Some(store) = self.controller.batcher().store() else {
            return 0;
        };

        match store.count().await {
            Ok(count) => count,
            Err(e) => {
                warn!("Error getting product count: {:#}", e);
                0
            }
        }
    }
}

/// Run on its own task so a panic is reported instead of taking the caller down.
/// The permit moves into the task and is released when it ends either way.
async fn supervise(controller: Arc<RunController>, target: Target, permit: RunPermit) -> Result<ScrapeRun, TriggerError> {
    let handle = tokio::spawn(async move {
        let _permit = permit;
        match target {
            Target::All => controller.run_all().await,
            Target::Category { url, name } => controller.run_category(&url, &name).await,
        }
    });

    handle.await.map_err(|e| {
        error!("Scrape run aborted: {}", e);
        TriggerError::Aborted(e.to_string())
    })
}

fn log_run(label: &str, run: &ScrapeRun) {
    info!(
        "{} completed. Products: {}, Errors: {}, Duration: {}s",
        label,
        run.products.len(),
        run.errors.len(),
        run.duration_seconds()
    );

    if !run.errors.is_empty() {
        warn!("Scraping completed with {} errors:", run.errors.len());
        for error in &run.errors {
            warn!(" - {}", error);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::browser::{BrowserDriver, DriverFactory, Pacer, SnapshotDriver};
    use crate::crawler::{CategoryDiscoverer, PaginationCrawler};
    use crate::storage::{DocumentStore, MemoryStore, PersistenceBatcher};
    use async_trait::async_trait;
    use std::time::Duration;
    use url::Url;

    struct ShopFactory;

    #[async_trait]
    impl DriverFactory for ShopFactory {
        async fn acquire(&self) -> anyhow::Result<Box<dyn BrowserDriver>> {
            let index = r#"<html><body><div class="category-tile"><a href="/c/tea">Tea</a></div></body></html>"#;
            let listing = r#"<html><body>
                <div class="product-tile" data-product-id="t1"><span class="product-name">Green tea</span></div>
                <div class="product-tile" data-product-id="t2"><span class="product-name">Black tea</span></div>
            </body></html>"#;

            Ok(Box::new(
                SnapshotDriver::new()
                    .with_page("https://shop.test/c/all-categories", index)
                    .with_page("https://shop.test/c/tea", listing),
            ))
        }
    }

    pub(crate) fn service() -> ScrapeService {
        let base = Url::parse("https://shop.test").unwrap();
        let wait = Duration::from_millis(10);
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());

        let controller = RunController::from_parts(
            Arc::new(ShopFactory),
            CategoryDiscoverer::new(base.clone(), "/c/all-categories", wait, Pacer::immediate()).unwrap(),
            PaginationCrawler::new(base, 2, wait, Pacer::immediate()),
            PersistenceBatcher::new(Some(store)),
        );

        ScrapeService::new(Arc::new(controller))
    }

    #[tokio::test]
    async fn test_sync_run_releases_guard() {
        let service = service();

        let run = service.trigger_sync().await.unwrap();

        assert_eq!(run.products.len(), 2);
        assert!(!service.is_running());
        assert_eq!(service.status().await.product_count, 2);
    }

    #[tokio::test]
    async fn test_busy_triggers_are_rejected() {
        let service = service();
        let _permit = service.guard().permit().expect("idle");

        assert!(matches!(service.trigger_sync().await, Err(TriggerError::Busy)));
        assert!(matches!(service.trigger_category("/c/tea", "Tea").await, Err(TriggerError::Busy)));
        assert_eq!(service.trigger_async(), Dispatch::Busy);
        assert!(service.status().await.is_running);
    }

    #[tokio::test]
    async fn test_async_trigger_runs_in_background() {
        let service = service();

        assert_eq!(service.trigger_async(), Dispatch::Accepted);

        for _ in 0..200 {
            if !service.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(!service.is_running());
        assert_eq!(service.product_count().await, 2);
    }

    #[tokio::test]
    async fn test_scheduled_tick_skips_when_busy() {
        let service = service();
        let permit = service.guard().permit().expect("idle");

        service.scheduled_run().await;
        assert_eq!(service.product_count().await, 0);

        drop(permit);
        service.scheduled_run().await;
        assert_eq!(service.product_count().await, 2);
    }

    #[test]
    fn test_report_from_run() {
        let mut run = ScrapeRun::new();
        run.add_error("Dairy: timed out");
        let report = RunReport::from_run(&run, Some("Dairy"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["productsScraped"], 0);
        assert_eq!(json["category"], "Dairy");
        assert_eq!(json["errors"][0], "Dairy: timed out");
        assert_eq!(json["durationSeconds"], 0);
    }
}
