use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::browser::{BrowserDriver, ChromeSessionFactory, SnapshotDriver};
use crate::cli::config::CrawlerConfig;
use crate::crawler::{selectors, Category, Product, ProductParser, RunController};
use crate::storage::{PersistenceBatcher, StoreFactory};
use crate::trigger::{http, schedule, RunReport, ScrapeService};

/// Wire the browser, store and engine together from configuration
async fn build_service(config: &CrawlerConfig) -> Result<ScrapeService> {
    let store = StoreFactory::create(&config.storage)
        .await
        .context("Failed to initialize document store")?;

    let factory = Arc::new(ChromeSessionFactory::new(config.browser.clone()));
    let controller = RunController::new(&config.scraper, factory, PersistenceBatcher::new(store))?;

    Ok(ScrapeService::new(Arc::new(controller)))
}

fn print_report(report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
    println!("{}", json);
    Ok(())
}

/// Run every category once
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = CrawlerConfig::load(config_path)?;
    let service = build_service(&config).await?;

    let run = service.trigger_sync().await?;
    print_report(&RunReport::from_run(&run, None))
}

/// Run a single category once
pub async fn category(config_path: Option<&Path>, url: &str, name: &str) -> Result<()> {
    let config = CrawlerConfig::load(config_path)?;
    let service = build_service(&config).await?;

    let run = service.trigger_category(url, name).await?;
    print_report(&RunReport::from_run(&run, Some(name)))
}

/// Serve the trigger API with the cron schedule running alongside
pub async fn serve(config_path: Option<&Path>, bind: Option<String>) -> Result<()> {
    let config = CrawlerConfig::load(config_path)?;
    let service = build_service(&config).await?;

    // Dropping the scheduler stops the ticks
    let _scheduler = schedule::start(service.clone(), &config.schedule).await?;

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    http::serve(service, &bind).await
}

/// Parse a saved listing page and print the products as JSON
pub async fn parse(config_path: Option<&Path>, html_file: &Path, category: &str, parent: Option<String>) -> Result<()> {
    let config = CrawlerConfig::load(config_path)?;
    let base_url = Url::parse(&config.scraper.base_url)
        .with_context(|| format!("Invalid base URL: {}", config.scraper.base_url))?;

    let html = tokio::fs::read_to_string(html_file)
        .await
        .with_context(|| format!("Failed to read {}", html_file.display()))?;

    let category = Category::new(category, base_url.as_str(), parent);
    let products = parse_listing(&html, &base_url, &category).await?;
    info!("Parsed {} products from {}", products.len(), html_file.display());

    let json = serde_json::to_string_pretty(&products).context("Failed to serialize products")?;
    println!("{}", json);
    Ok(())
}

/// Run the product parser over every card of an offline listing page
pub async fn parse_listing(html: &str, base_url: &Url, category: &Category) -> Result<Vec<Product>> {
    let driver = SnapshotDriver::single(base_url.as_str(), html);
    driver.navigate(base_url.as_str()).await?;

    let parser = ProductParser::new(base_url.clone());
    let elements = driver.find_all(&selectors::group(selectors::PRODUCT_CARD)).await?;

    let mut products = Vec::new();
    for element in &elements {
        match parser.parse(element.as_ref(), category).await {
            Ok(Some(product)) => products.push(product),
            Ok(None) => {}
            Err(e) => warn!("Skipping product: {}", e),
        }
    }

    Ok(products)
}

/// Print the number of stored products
pub async fn status(config_path: Option<&Path>) -> Result<()> {
    let config = CrawlerConfig::load(config_path)?;

    match StoreFactory::create(&config.storage).await? {
        Some(store) => {
            let count = store.count().await?;
            println!("Storage: {} ({})", config.storage.storage_type, config.storage.collection);
            println!("Products: {}", count);
        }
        None => println!("Persistence is disabled"),
    }

    Ok(())
}

/// Print the effective configuration
pub async fn show_config(config_path: Option<&Path>) -> Result<()> {
    let config = CrawlerConfig::load(config_path)?;
    let source = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(CrawlerConfig::default_path);

    println!("# {}", source.display());
    println!("{}", serde_yaml::to_string(&config).context("Failed to serialize configuration")?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parse_listing() {
        let html = r#"<html><body>
            <div class="product-item" data-item-id="9001">
                <a href="/p/9001">Shortbread</a>
                <span class="product-price">$12.50</span>
            </div>
            <div class="product-item"><span>Ad slot</span></div>
        </body></html>"#;
        let base = Url::parse("https://shop.test").unwrap();
        let category = Category::new("Cookies", "https://shop.test/c/cookies", Some("Food".to_string()));

        let products = parse_listing(html, &base, &category).await.unwrap();

        assert_eq!(products.len(), 1);
        assert_eq!(products[0].product_id, "9001");
        assert_eq!(products[0].price, Some(12.5));
        assert_eq!(products[0].product_url.as_deref(), Some("https://shop.test/p/9001"));
        assert_eq!(products[0].category.as_deref(), Some("Food"));
    }
}
