use anyhow::{Context, Result};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{BrowserDriver, BrowserError, BrowserResult, Pacer, PageElement};
use crate::cli::config::ScraperSettings;
use crate::crawler::extract::Extractor;
use crate::crawler::model::Category;
use crate::crawler::parser::resolve_url;
use crate::crawler::selectors;

/// Harvests categories from the site's category index page
pub struct CategoryDiscoverer {
    base_url: Url,
    index_url: Url,
    element_wait: Duration,
    pacer: Pacer,
}

impl CategoryDiscoverer {
    pub fn new(base_url: Url, categories_path: &str, element_wait: Duration, pacer: Pacer) -> Result<Self> {
        let index_url = base_url
            .join(categories_path)
            .with_context(|| format!("Invalid categories path: {}", categories_path))?;

        Ok(Self {
            base_url,
            index_url,
            element_wait,
            pacer,
        })
    }

    pub fn from_settings(settings: &ScraperSettings) -> Result<Self> {
        let base_url = Url::parse(&settings.base_url)
            .with_context(|| format!("Invalid base URL: {}", settings.base_url))?;

        Self::new(
            base_url,
            &settings.categories_path,
            Duration::from_secs(settings.element_wait_secs),
            Pacer::from_settings(settings),
        )
    }

    /// Categories in first-seen order, deduplicated by URL.
    ///
    /// An index page that never shows a category link yields an empty list;
    /// failing to load it at all is an error.
    pub async fn discover(&self, driver: &dyn BrowserDriver) -> Result<Vec<Category>> {
        info!("Navigating to categories page: {}", self.index_url);
        driver
            .navigate(self.index_url.as_str())
            .await
            .with_context(|| format!("Failed to load category index {}", self.index_url))?;
        self.pacer.pause().await;

        match driver
            .wait_for_selector(selectors::CATEGORY_LINK_PRESENT, self.element_wait)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e).context("Lost browser session on category index"),
            Err(e) => {
                warn!("No category links on {}: {}", self.index_url, e);
                return Ok(Vec::new());
            }
        }

        let links = driver
            .find_all(&selectors::group(selectors::CATEGORY_LINKS))
            .await
            .context("Failed to collect category links")?;

        let mut seen = HashSet::new();
        let mut categories = Vec::new();

        for link in &links {
            match self.read_link(link.as_ref(), &mut seen).await {
                Ok(Some(category)) => {
                    debug!("Found category: {} - {}", category.name, category.url);
                    categories.push(category);
                }
                Ok(None) => {}
                Err(BrowserError::StaleElement) => warn!("Stale element, skipping category link"),
                Err(e) if e.is_fatal() => return Err(e).context("Lost browser session during discovery"),
                Err(e) => warn!("Skipping category link: {}", e),
            }
        }

        info!("Discovered {} categories", categories.len());
        Ok(categories)
    }

    async fn read_link(&self, link: &dyn PageElement, seen: &mut HashSet<String>) -> BrowserResult<Option<Category>> {
        let Some(href) = link.attribute("href").await?.filter(|h| !h.trim().is_empty()) else {
            return Ok(None);
        };

        let url = resolve_url(&self.base_url, href.trim());
        if !url.contains(selectors::CATEGORY_PATH_MARKER) || self.is_index(&url) || seen.contains(&url) {
            return Ok(None);
        }
        seen.insert(url.clone());

        let mut name = link.text().await?.trim().to_string();
        if name.is_empty() {
            name = Extractor::new(link)
                .attribute(&["img"], "alt")
                .await?
                .unwrap_or_default();
        }
        if name.is_empty() {
            return Ok(None);
        }

        let parent_category = parent_label(link).await?;

        Ok(Some(Category::new(name, url, parent_category)))
    }

    fn is_index(&self, url: &str) -> bool {
        url.contains(self.index_url.path())
    }
}

/// Heading of the enclosing category group, if any
async fn parent_label(link: &dyn PageElement) -> BrowserResult<Option<String>> {
    let group = match link.ancestor_with_class(selectors::CATEGORY_GROUP_CLASS).await {
        Ok(Some(group)) => group,
        Ok(None) => return Ok(None),
        Err(e) if e.is_transient() => return Ok(None),
        Err(e) => return Err(e),
    };

    Extractor::new(group.as_ref())
        .text(selectors::CATEGORY_GROUP_HEADING)
        .await
}
