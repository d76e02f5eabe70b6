pub mod behavior;
pub mod fingerprint;
pub mod session;
pub mod snapshot;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

// Re-export common types
pub use behavior::Pacer;
pub use fingerprint::UserAgentPool;
pub use session::{ChromeSessionFactory, WebDriverSession};
pub use snapshot::SnapshotDriver;

pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

/// Failures surfaced by a browser driver or one of its elements
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("no element matches selector: {0}")]
    NoSuchElement(String),

    #[error("element is no longer attached to the page")]
    StaleElement,

    #[error("timed out waiting for: {0}")]
    Timeout(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("script execution failed: {0}")]
    Script(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("browser session lost: {0}")]
    SessionLost(String),

    #[error("webdriver error: {0}")]
    Driver(String),
}

impl BrowserError {
    /// "Not found" style outcomes that only affect the element or field being read
    pub fn is_transient(&self) -> bool {
        matches!(self, BrowserError::NoSuchElement(_) | BrowserError::StaleElement)
    }

    /// The session itself is gone; nothing further can be done with this driver
    pub fn is_fatal(&self) -> bool {
        matches!(self, BrowserError::SessionLost(_))
    }
}

/// A node on the current page
#[async_trait]
pub trait PageElement: Send + Sync {
    /// Visible text, whitespace-normalized
    async fn text(&self) -> BrowserResult<String>;

    /// Attribute value, `None` when the attribute is absent
    async fn attribute(&self, name: &str) -> BrowserResult<Option<String>>;

    /// First descendant matching a CSS selector
    async fn find(&self, selector: &str) -> BrowserResult<Option<Box<dyn PageElement>>>;

    /// All descendants matching a CSS selector, in document order
    async fn find_all(&self, selector: &str) -> BrowserResult<Vec<Box<dyn PageElement>>>;

    /// Outermost ancestor whose class attribute contains `fragment`
    async fn ancestor_with_class(&self, fragment: &str) -> BrowserResult<Option<Box<dyn PageElement>>>;
}

/// Capability consumed by the scrape engine to drive one browser session
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> BrowserResult<()>;

    /// Resolves once at least one element matches, `BrowserError::Timeout` otherwise
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> BrowserResult<()>;

    async fn find_all(&self, selector: &str) -> BrowserResult<Vec<Box<dyn PageElement>>>;

    async fn execute_script(&self, script: &str) -> BrowserResult<serde_json::Value>;

    /// Release the underlying session. Calling it twice is a no-op.
    async fn dispose(&mut self) -> BrowserResult<()>;
}

/// Hands out a fresh driver session for each run
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn acquire(&self) -> anyhow::Result<Box<dyn BrowserDriver>>;
}
