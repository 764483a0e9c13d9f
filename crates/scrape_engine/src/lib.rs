//! Scrape orchestration engine: turns a route list into a deduplicated
//! month-request plan, drives it under bounded concurrency and pacing, and
//! reassembles per-route results as their month-fetches complete.

pub mod aggregator;
pub mod catalog;
pub mod dispatcher;
pub mod oracle;
pub mod planner;
pub mod progress;
pub mod run;

pub use catalog::{ConfigCatalog, RouteCatalog};
pub use dispatcher::{dispatch, DispatchOptions, DispatchReport};
pub use oracle::FreshnessOracle;
pub use progress::RunStats;
pub use run::{parse_filters, RouteFilter, ScrapeRun, ScrapeSummary};
