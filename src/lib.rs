//! Browser-driven product catalog crawler.
//!
//! Discovers categories on a retail site, walks their paginated listings
//! through a WebDriver session, and upserts the normalized products into a
//! document store. Runs are started from the CLI, the HTTP trigger API or a
//! cron schedule, one at a time.

pub mod browser;
pub mod cli;
pub mod crawler;
pub mod storage;
pub mod trigger;
pub mod utils;
