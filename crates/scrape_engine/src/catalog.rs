//! Route catalog seam.
//!
//! The production site adapter (reading route options out of the carrier's
//! page DOM) lives behind this trait; the shipped implementation reads
//! routes from configuration.

use async_trait::async_trait;

use common::config::RouteConfig;
use common::{Result, Route, YearMonth};

#[async_trait]
pub trait RouteCatalog: Send + Sync {
    async fn discover_routes(&self) -> Result<Vec<Route>>;

    /// Candidate months the carrier publishes for a route. An empty list
    /// means "let the planner fall back to the next 12 months".
    async fn available_months(&self, route: &Route) -> Result<Vec<YearMonth>>;
}

/// Catalog backed by the `[[routes]]` entries in `config.toml`.
pub struct ConfigCatalog {
    routes: Vec<RouteConfig>,
}

impl ConfigCatalog {
    pub fn new(routes: Vec<RouteConfig>) -> Self {
        Self { routes }
    }
}

fn display_name(name: &str, code: &str) -> String {
    if name.is_empty() {
        code.to_string()
    } else {
        name.to_string()
    }
}

#[async_trait]
impl RouteCatalog for ConfigCatalog {
    async fn discover_routes(&self) -> Result<Vec<Route>> {
        Ok(self
            .routes
            .iter()
            .map(|rc| {
                let origin = rc.origin.trim().to_ascii_uppercase();
                let destination = rc.destination.trim().to_ascii_uppercase();
                Route {
                    code: format!("{origin}-{destination}"),
                    origin_name: display_name(&rc.origin_name, &origin),
                    destination_name: display_name(&rc.destination_name, &destination),
                    origin,
                    destination,
                    region: rc.region.clone(),
                    candidate_months: rc.months.clone(),
                }
            })
            .collect())
    }

    async fn available_months(&self, route: &Route) -> Result<Vec<YearMonth>> {
        Ok(route.candidate_months.clone())
    }
}
