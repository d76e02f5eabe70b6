pub mod controller;
pub mod discovery;
pub mod extract;
pub mod guard;
pub mod model;
pub mod pagination;
pub mod parser;
pub mod selectors;

// Re-export common types
pub use controller::RunController;
pub use discovery::CategoryDiscoverer;
pub use guard::{RunPermit, RunState, SingleFlightGuard};
pub use model::{Category, Product, ScrapeRun};
pub use pagination::PaginationCrawler;
pub use parser::ProductParser;
