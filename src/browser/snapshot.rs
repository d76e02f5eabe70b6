use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use crate::browser::{BrowserDriver, BrowserError, BrowserResult, PageElement};

/// Offline browser over saved HTML pages keyed by URL.
///
/// Pages are static: waits succeed immediately when the selector matches and
/// time out otherwise, and the page height never changes.
pub struct SnapshotDriver {
    pages: HashMap<String, Arc<str>>,
    current: Mutex<Option<Arc<str>>>,
    visited: Mutex<Vec<String>>,
}

impl SnapshotDriver {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            current: Mutex::new(None),
            visited: Mutex::new(Vec::new()),
        }
    }

    /// Driver serving exactly one page
    pub fn single(url: &str, html: &str) -> Self {
        Self::new().with_page(url, html)
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), Arc::from(html));
        self
    }

    /// URLs navigated to so far, in order
    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn current_page(&self) -> BrowserResult<Arc<str>> {
        self.current
            .lock()
            .map_err(|_| BrowserError::SessionLost("snapshot state poisoned".to_string()))?
            .clone()
            .ok_or_else(|| BrowserError::Navigation("no page loaded".to_string()))
    }
}

impl Default for SnapshotDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserDriver for SnapshotDriver {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        if let Ok(mut visited) = self.visited.lock() {
            visited.push(url.to_string());
        }

        let page = self
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| BrowserError::Navigation(format!("no snapshot for {}", url)))?;

        let mut current = self
            .current
            .lock()
            .map_err(|_| BrowserError::SessionLost("snapshot state poisoned".to_string()))?;
        *current = Some(page);

        debug!("Loaded snapshot: {}", url);
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> BrowserResult<()> {
        let page = self.current_page()?;
        let parsed = parse_selector(selector)?;
        let html = Html::parse_document(&page);

        if html.select(&parsed).next().is_some() {
            Ok(())
        } else {
            Err(BrowserError::Timeout(selector.to_string()))
        }
    }

    async fn find_all(&self, selector: &str) -> BrowserResult<Vec<Box<dyn PageElement>>> {
        let page = self.current_page()?;
        let parsed = parse_selector(selector)?;
        let html = Html::parse_document(&page);

        Ok(html
            .select(&parsed)
            .filter_map(|element| SnapshotElement::locate(&page, &html, element))
            .map(|element| Box::new(element) as Box<dyn PageElement>)
            .collect())
    }

    async fn execute_script(&self, script: &str) -> BrowserResult<serde_json::Value> {
        let page = self.current_page()?;

        if script.contains("scrollHeight") {
            Ok(serde_json::json!(page.len()))
        } else {
            Ok(serde_json::Value::Null)
        }
    }

    async fn dispose(&mut self) -> BrowserResult<()> {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
        Ok(())
    }
}

/// Element of a snapshot page, addressed by its position among the
/// document's elements so it stays `Send` without holding the parsed tree
struct SnapshotElement {
    page: Arc<str>,
    ordinal: usize,
}

impl SnapshotElement {
    fn locate(page: &Arc<str>, html: &Html, element: ElementRef<'_>) -> Option<Self> {
        let ordinal = html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .position(|candidate| candidate.id() == element.id())?;

        Some(Self {
            page: Arc::clone(page),
            ordinal,
        })
    }

    /// Re-parse the page and run `f` against this element
    fn with_element<T>(&self, f: impl FnOnce(&Html, ElementRef<'_>) -> T) -> BrowserResult<T> {
        let html = Html::parse_document(&self.page);
        let element = html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .nth(self.ordinal)
            .ok_or(BrowserError::StaleElement)?;

        Ok(f(&html, element))
    }

    fn boxed(&self, html: &Html, element: ElementRef<'_>) -> Option<Box<dyn PageElement>> {
        Self::locate(&self.page, html, element).map(|e| Box::new(e) as Box<dyn PageElement>)
    }
}

#[async_trait]
impl PageElement for SnapshotElement {
    async fn text(&self) -> BrowserResult<String> {
        self.with_element(|_, element| {
            element
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ")
        })
    }

    async fn attribute(&self, name: &str) -> BrowserResult<Option<String>> {
        self.with_element(|_, element| element.value().attr(name).map(str::to_string))
    }

    async fn find(&self, selector: &str) -> BrowserResult<Option<Box<dyn PageElement>>> {
        let parsed = parse_selector(selector)?;
        self.with_element(|html, element| {
            element
                .select(&parsed)
                .next()
                .and_then(|found| self.boxed(html, found))
        })
    }

    async fn find_all(&self, selector: &str) -> BrowserResult<Vec<Box<dyn PageElement>>> {
        let parsed = parse_selector(selector)?;
        self.with_element(|html, element| {
            element
                .select(&parsed)
                .filter_map(|found| self.boxed(html, found))
                .collect()
        })
    }

    async fn ancestor_with_class(&self, fragment: &str) -> BrowserResult<Option<Box<dyn PageElement>>> {
        self.with_element(|html, element| {
            element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .filter(|ancestor| {
                    ancestor
                        .value()
                        .attr("class")
                        .is_some_and(|class| class.contains(fragment))
                })
                .last()
                .and_then(|outermost| self.boxed(html, outermost))
        })
    }
}

fn parse_selector(selector: &str) -> BrowserResult<Selector> {
    Selector::parse(selector).map_err(|e| BrowserError::InvalidSelector(format!("{}: {:?}", selector, e)))
}
