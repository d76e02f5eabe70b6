use anyhow::{Result, Context};
use async_trait::async_trait;
use fantoccini::error::CmdError;
use thirtyfour::error::WebDriverError;
use thirtyfour::prelude::*;
use thirtyfour::ChromeCapabilities;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::browser::fingerprint::UserAgentPool;
use crate::browser::{BrowserDriver, BrowserError, BrowserResult, DriverFactory, PageElement};
use crate::cli::config::BrowserSettings;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Starts a fresh Chrome session per run
pub struct ChromeSessionFactory {
    /// Browser settings
    config: BrowserSettings,

    user_agents: UserAgentPool,
}

impl ChromeSessionFactory {
    pub fn new(config: BrowserSettings) -> Self {
        let user_agents = UserAgentPool::new(config.user_agents.clone());
        if user_agents.is_empty() {
            warn!("No user agents configured, using the built-in default");
        }

        Self { config, user_agents }
    }

    fn capabilities(&self) -> Result<ChromeCapabilities> {
        let mut caps = DesiredCapabilities::chrome();

        // Set headless mode if configured
        if self.config.headless {
            caps.set_headless()?;
        }

        // Required when running inside containers
        caps.add_chrome_arg("--no-sandbox")?;
        caps.add_chrome_arg("--disable-dev-shm-usage")?;
        caps.add_chrome_arg("--disable-gpu")?;

        caps.add_chrome_arg(&format!(
            "--window-size={},{}",
            self.config.viewport.width, self.config.viewport.height
        ))?;

        caps.add_chrome_arg(&format!("--user-agent={}", self.user_agents.pick()))?;

        // Hide the usual automation markers
        caps.add_chrome_arg("--disable-blink-features=AutomationControlled")?;
        caps.add_chrome_option("excludeSwitches", serde_json::json!(["enable-automation"]))?;
        caps.add_chrome_option("useAutomationExtension", serde_json::json!(false))?;

        caps.add_chrome_arg("--disable-extensions")?;
        caps.add_chrome_arg("--disable-infobars")?;
        caps.add_chrome_arg("--disable-notifications")?;
        caps.add_chrome_arg("--disable-popup-blocking")?;

        caps.add_chrome_arg(&format!("--lang={}", self.config.language))?;
        caps.add_chrome_arg(&format!("--accept-lang={}", self.config.accept_language))?;

        Ok(caps)
    }
}

#[async_trait]
impl DriverFactory for ChromeSessionFactory {
    async fn acquire(&self) -> Result<Box<dyn BrowserDriver>> {
        let caps = self.capabilities()
            .context("Failed to build Chrome capabilities")?;

        // Connect to WebDriver
        let driver = WebDriver::new(&self.config.webdriver_url, caps).await
            .context(format!("Failed to connect to WebDriver at {}", self.config.webdriver_url))?;

        driver.set_page_load_timeout(Duration::from_secs(self.config.page_load_timeout_secs)).await
            .context("Failed to set page load timeout")?;

        info!("WebDriver initialized");

        Ok(Box::new(WebDriverSession { driver: Some(driver) }))
    }
}

/// One live browser session
pub struct WebDriverSession {
    /// WebDriver instance, `None` once disposed
    driver: Option<WebDriver>,
}

impl WebDriverSession {
    fn driver(&self) -> BrowserResult<&WebDriver> {
        self.driver
            .as_ref()
            .ok_or_else(|| BrowserError::SessionLost("browser session already closed".to_string()))
    }
}

#[async_trait]
impl BrowserDriver for WebDriverSession {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        debug!("Navigating to: {}", url);
        self.driver()?
            .goto(url)
            .await
            .map_err(|e| match classify(e) {
                BrowserError::Driver(message) => BrowserError::Navigation(format!("{}: {}", url, message)),
                other => other,
            })
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        self.driver()?
            .query(By::Css(selector))
            .wait(timeout, WAIT_POLL_INTERVAL)
            .first()
            .await
            .map(|_| ())
            .map_err(|e| match classify(e) {
                BrowserError::NoSuchElement(_) | BrowserError::Timeout(_) => BrowserError::Timeout(selector.to_string()),
                other => other,
            })
    }

    async fn find_all(&self, selector: &str) -> BrowserResult<Vec<Box<dyn PageElement>>> {
        let elements = self.driver()?
            .find_all(By::Css(selector))
            .await
            .map_err(classify)?;

        Ok(boxed(elements))
    }

    async fn execute_script(&self, script: &str) -> BrowserResult<serde_json::Value> {
        let result = self.driver()?
            .execute(script, Vec::new())
            .await
            .map_err(|e| match classify(e) {
                BrowserError::Driver(message) => BrowserError::Script(message),
                other => other,
            })?;

        Ok(result.json().clone())
    }

    /// Close the browser session
    async fn dispose(&mut self) -> BrowserResult<()> {
        if let Some(driver) = self.driver.take() {
            driver.quit().await.map_err(classify)?;
            info!("WebDriver closed");
        }

        Ok(())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            // Spawn a task to quit the driver
            tokio::spawn(async move {
                if let Err(e) = driver.quit().await {
                    error!("Error closing browser session during drop: {}", e);
                }
            });
        }
    }
}

struct WebDriverElement {
    element: WebElement,
}

#[async_trait]
impl PageElement for WebDriverElement {
    async fn text(&self) -> BrowserResult<String> {
        let text = self.element.text().await.map_err(classify)?;
        Ok(text.trim().to_string())
    }

    async fn attribute(&self, name: &str) -> BrowserResult<Option<String>> {
        self.element.attr(name).await.map_err(classify)
    }

    async fn find(&self, selector: &str) -> BrowserResult<Option<Box<dyn PageElement>>> {
        match self.element.find(By::Css(selector)).await.map_err(classify) {
            Ok(element) => Ok(Some(Box::new(WebDriverElement { element }))),
            Err(BrowserError::NoSuchElement(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn find_all(&self, selector: &str) -> BrowserResult<Vec<Box<dyn PageElement>>> {
        let elements = self.element.find_all(By::Css(selector)).await.map_err(classify)?;
        Ok(boxed(elements))
    }

    async fn ancestor_with_class(&self, fragment: &str) -> BrowserResult<Option<Box<dyn PageElement>>> {
        let xpath = format!("./ancestor::*[contains(@class,'{}')]", fragment.replace('\'', ""));
        match self.element.find(By::XPath(&xpath)).await.map_err(classify) {
            Ok(element) => Ok(Some(Box::new(WebDriverElement { element }))),
            Err(BrowserError::NoSuchElement(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn boxed(elements: Vec<WebElement>) -> Vec<Box<dyn PageElement>> {
    elements
        .into_iter()
        .map(|element| Box::new(WebDriverElement { element }) as Box<dyn PageElement>)
        .collect()
}

/// Map WebDriver failures onto the engine's error kinds
fn classify(error: WebDriverError) -> BrowserError {
    match error {
        WebDriverError::NoSuchElement(message) => BrowserError::NoSuchElement(message),
        WebDriverError::NoSuchWindow(message) => BrowserError::SessionLost(message),
        WebDriverError::Timeout(message) => BrowserError::Timeout(message),
        WebDriverError::CmdError(CmdError::Standard(e)) => from_status(e.error(), e.message.to_string()),
        WebDriverError::CmdError(CmdError::Lost(e)) => BrowserError::SessionLost(e.to_string()),
        WebDriverError::CmdError(CmdError::WaitTimeout) => BrowserError::Timeout("wait condition".to_string()),
        other => BrowserError::Driver(other.to_string()),
    }
}

/// Map a W3C error code reported by the WebDriver server
fn from_status(code: &str, message: String) -> BrowserError {
    match code {
        "no such element" => BrowserError::NoSuchElement(message),
        "stale element reference" => BrowserError::StaleElement,
        "invalid selector" => BrowserError::InvalidSelector(message),
        "invalid session id" | "no such window" => BrowserError::SessionLost(message),
        "javascript error" | "script timeout" => BrowserError::Script(message),
        "timeout" => BrowserError::Timeout(message),
        _ => BrowserError::Driver(format!("{}: {}", code, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_classify_lifted_variants() {
        assert!(matches!(
            classify(WebDriverError::NoSuchElement("#grid".to_string())),
            BrowserError::NoSuchElement(_)
        ));
        assert!(classify(WebDriverError::NoSuchWindow("closed".to_string())).is_fatal());
        assert!(matches!(
            classify(WebDriverError::Timeout("page load".to_string())),
            BrowserError::Timeout(_)
        ));
        assert!(matches!(
            classify(WebDriverError::CustomError("odd reply".to_string())),
            BrowserError::Driver(_)
        ));
    }

    #[test]
    fn test_classify_command_errors() {
        let lost = CmdError::Lost(io::Error::new(io::ErrorKind::ConnectionReset, "chromedriver went away"));
        assert!(classify(WebDriverError::CmdError(lost)).is_fatal());

        assert!(matches!(
            classify(WebDriverError::CmdError(CmdError::WaitTimeout)),
            BrowserError::Timeout(_)
        ));
    }

    #[test]
    fn test_status_codes() {
        let message = || "detail".to_string();

        assert!(matches!(from_status("stale element reference", message()), BrowserError::StaleElement));
        assert!(from_status("stale element reference", message()).is_transient());
        assert!(from_status("no such element", message()).is_transient());
        assert!(from_status("invalid session id", message()).is_fatal());
        assert!(matches!(from_status("invalid selector", message()), BrowserError::InvalidSelector(_)));
        assert!(matches!(from_status("javascript error", message()), BrowserError::Script(_)));
        assert!(matches!(from_status("timeout", message()), BrowserError::Timeout(_)));

        match from_status("unknown error", message()) {
            BrowserError::Driver(text) => assert_eq!(text, "unknown error: detail"),
            other => panic!("unexpected mapping: {:?}", other),
        }
    }
}
