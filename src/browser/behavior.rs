use rand::{thread_rng, Rng};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::browser::{BrowserDriver, BrowserResult};
use crate::cli::config::ScraperSettings;

const PAGE_HEIGHT_SCRIPT: &str = "return document.body.scrollHeight";
const SCROLL_TO_BOTTOM_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";
const SCROLL_TO_TOP_SCRIPT: &str = "window.scrollTo(0, 0);";

/// Human-like pacing between page loads and lazy-load scrolling
#[derive(Debug, Clone)]
pub struct Pacer {
    /// Delay bounds in milliseconds, inclusive
    delay_ms: (u64, u64),

    /// Pause after each scroll before re-measuring the page
    scroll_pause: Duration,

    max_scroll_probes: u32,
}

impl Pacer {
    pub fn new(min_delay_ms: u64, max_delay_ms: u64, scroll_pause_ms: u64, max_scroll_probes: u32) -> Self {
        Self {
            delay_ms: (min_delay_ms.min(max_delay_ms), min_delay_ms.max(max_delay_ms)),
            scroll_pause: Duration::from_millis(scroll_pause_ms),
            max_scroll_probes,
        }
    }

    pub fn from_settings(settings: &ScraperSettings) -> Self {
        Self::new(
            settings.min_delay_ms,
            settings.max_delay_ms,
            settings.scroll_pause_ms,
            settings.max_scroll_probes,
        )
    }

    /// No waiting at all; for offline snapshots
    pub fn immediate() -> Self {
        Self::new(0, 0, 0, 1)
    }

    /// Pick a delay within the configured bounds
    pub fn next_delay(&self) -> Duration {
        let (min, max) = self.delay_ms;
        let ms = if min == max { min } else { thread_rng().gen_range(min..=max) };
        Duration::from_millis(ms)
    }

    /// Random pause between requests
    pub async fn pause(&self) {
        let delay = self.next_delay();
        if delay.is_zero() {
            return;
        }

        debug!("Waiting {}ms before next request", delay.as_millis());
        sleep(delay).await;
    }

    /// Scroll to the bottom until the page stops growing, then back to the top.
    ///
    /// Returns the number of scroll probes made. Script failures are logged and
    /// end the probing early; only a lost session is returned as an error.
    pub async fn load_lazy_content(&self, driver: &dyn BrowserDriver) -> BrowserResult<u32> {
        match self.probe(driver).await {
            Ok(probes) => Ok(probes),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Error during scroll: {}", e);
                Ok(0)
            }
        }
    }

    async fn probe(&self, driver: &dyn BrowserDriver) -> BrowserResult<u32> {
        let mut last_height = page_height(driver).await?;
        let mut probes = 0;

        while probes < self.max_scroll_probes {
            driver.execute_script(SCROLL_TO_BOTTOM_SCRIPT).await?;
            probes += 1;

            if !self.scroll_pause.is_zero() {
                sleep(self.scroll_pause).await;
            }

            let height = page_height(driver).await?;
            if height == last_height {
                break;
            }
            last_height = height;
        }

        driver.execute_script(SCROLL_TO_TOP_SCRIPT).await?;
        debug!("Lazy-load probing finished after {} probes (height {})", probes, last_height);

        Ok(probes)
    }
}

async fn page_height(driver: &dyn BrowserDriver) -> BrowserResult<u64> {
    let value = driver.execute_script(PAGE_HEIGHT_SCRIPT).await?;
    Ok(value.as_u64().or_else(|| value.as_f64().map(|h| h as u64)).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserError, PageElement};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Page whose height grows for a fixed number of scrolls
    struct GrowingPage {
        heights: Mutex<Vec<u64>>,
        scripts: Mutex<Vec<String>>,
    }

    impl GrowingPage {
        fn new(heights: Vec<u64>) -> Self {
            Self {
                heights: Mutex::new(heights),
                scripts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BrowserDriver for GrowingPage {
        async fn navigate(&self, _url: &str) -> BrowserResult<()> {
            Ok(())
        }

        async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> BrowserResult<()> {
            Err(BrowserError::Timeout(selector.to_string()))
        }

        async fn find_all(&self, _selector: &str) -> BrowserResult<Vec<Box<dyn PageElement>>> {
            Ok(Vec::new())
        }

        async fn execute_script(&self, script: &str) -> BrowserResult<serde_json::Value> {
            self.scripts.lock().unwrap().push(script.to_string());
            if script == PAGE_HEIGHT_SCRIPT {
                let mut heights = self.heights.lock().unwrap();
                let height = if heights.len() > 1 { heights.remove(0) } else { heights[0] };
                return Ok(serde_json::json!(height));
            }
            Ok(serde_json::Value::Null)
        }

        async fn dispose(&mut self) -> BrowserResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_delay_stays_within_bounds() {
        let pacer = Pacer::new(10, 20, 0, 1);
        for _ in 0..100 {
            let delay = pacer.next_delay().as_millis();
            assert!((10..=20).contains(&delay));
        }
    }

    #[test]
    fn test_inverted_bounds_are_normalized() {
        let pacer = Pacer::new(50, 5, 0, 1);
        let delay = pacer.next_delay().as_millis();
        assert!((5..=50).contains(&delay));
    }

    #[tokio::test]
    async fn test_probing_stops_when_height_stabilizes() {
        let page = GrowingPage::new(vec![1000, 2000, 3000, 3000]);
        let pacer = Pacer::new(0, 0, 0, 10);

        let probes = pacer.load_lazy_content(&page).await.unwrap();
        assert_eq!(probes, 3);

        let scripts = page.scripts.lock().unwrap();
        assert_eq!(scripts.last().map(String::as_str), Some(SCROLL_TO_TOP_SCRIPT));
    }

    #[tokio::test]
    async fn test_probing_is_capped() {
        let page = GrowingPage::new((1..=50).map(|h| h * 100).collect());
        let pacer = Pacer::new(0, 0, 0, 4);

        assert_eq!(pacer.load_lazy_content(&page).await.unwrap(), 4);
    }
}
