use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use tracing::{info, debug, error};

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CrawlerConfig {
    pub scraper: ScraperSettings,
    pub browser: BrowserSettings,
    pub storage: StorageSettings,
    pub schedule: ScheduleSettings,
    pub server: ServerSettings,
}

/// Crawl behaviour against the target site
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScraperSettings {
    pub base_url: String,
    /// Path of the page listing every category, relative to `base_url`
    pub categories_path: String,
    /// Pacing delay bounds in milliseconds, applied after every navigation
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_pages: u32,
    pub element_wait_secs: u64,
    /// Pause between lazy-load scroll probes
    pub scroll_pause_ms: u64,
    pub max_scroll_probes: u32,
}

/// Browser session settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agents: Vec<String>,
    pub language: String,
    pub accept_language: String,
    pub page_load_timeout_secs: u64,
}

/// Browser window size
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Document store settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageSettings {
    pub storage_type: String, // "mongodb", "memory", "none"
    /// Batches are written in transactions, so MongoDB must run as a replica set or behind mongos
    pub connection_string: String,
    pub database_name: String,
    pub collection: String,
}

/// Recurring trigger settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScheduleSettings {
    pub enabled: bool,
    /// Six-field cron expression (seconds first)
    pub cron: String,
}

/// HTTP trigger surface settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            scraper: ScraperSettings {
                base_url: "https://www.costco.com.tw".to_string(),
                categories_path: "/c/all-categories".to_string(),
                min_delay_ms: 3000,
                max_delay_ms: 5000,
                max_pages: 100,
                element_wait_secs: 10,
                scroll_pause_ms: 1000,
                max_scroll_probes: 10,
            },
            browser: BrowserSettings {
                webdriver_url: "http://localhost:4444".to_string(),
                headless: true,
                viewport: Viewport {
                    width: 1920,
                    height: 1080,
                },
                user_agents: vec![
                    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                ],
                language: "zh-TW".to_string(),
                accept_language: "zh-TW,zh;q=0.9,en;q=0.8".to_string(),
                page_load_timeout_secs: 30,
            },
            storage: StorageSettings {
                storage_type: "mongodb".to_string(),
                connection_string: "mongodb://localhost:27017/?replicaSet=rs0".to_string(),
                database_name: "catalog".to_string(),
                collection: "products".to_string(),
            },
            schedule: ScheduleSettings {
                enabled: true,
                cron: "0 0 3 * * *".to_string(),
            },
            server: ServerSettings {
                bind: "0.0.0.0:8080".to_string(),
            },
        }
    }
}

impl CrawlerConfig {
    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "catalog-crawler", "catalog-crawler") {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        }
    }

    /// Path of the default configuration file
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("default.yaml")
    }

    /// Load the default configuration, writing one out on first use
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_path();

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            info!("Default configuration not found. Creating {}", config_path.display());
            let config = Self::default();
            if let Err(e) = config.save_to_file(&config_path) {
                // The in-memory defaults are still usable
                error!("Failed to write default configuration: {:#}", e);
            }
            Ok(config)
        }
    }

    /// Load an explicit file when given, the default configuration otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load_default(),
        }
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.scraper.base_url)
            .context(format!("Invalid base_url: {}", self.scraper.base_url))?;

        if self.scraper.min_delay_ms > self.scraper.max_delay_ms {
            anyhow::bail!(
                "min_delay_ms ({}) is greater than max_delay_ms ({})",
                self.scraper.min_delay_ms,
                self.scraper.max_delay_ms
            );
        }

        if self.scraper.max_pages == 0 {
            anyhow::bail!("max_pages must be at least 1");
        }

        Ok(())
    }

    /// Save the configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self)
            .context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }
}
