//! Month request planning: route list → deduplicated fetch graph.

use std::collections::HashMap;

use tracing::{debug, warn};

use common::{Dependent, Direction, MonthRequest, MonthRequestKey, Route, YearMonth};

use crate::oracle::FreshnessOracle;

/// Months planned per route when the catalog supplied none.
pub const FALLBACK_MONTHS: usize = 12;

/// Normalize routes before planning: drop malformed ones, dedup and sort
/// candidate months, and apply the 12-month fallback window.
///
/// The returned list is what the planner *and* the aggregator must share, so
/// month indices line up.
pub fn normalize_routes(routes: Vec<Route>) -> Vec<Route> {
    routes
        .into_iter()
        .filter_map(|mut route| {
            if !route.is_resolved() {
                warn!(
                    "skipping route {}: unresolved endpoint codes ({} → {})",
                    route.code, route.origin, route.destination
                );
                return None;
            }
            if route.candidate_months.is_empty() {
                debug!("route {}: no candidate months, using fallback window", route.code);
                route.candidate_months = YearMonth::upcoming(FALLBACK_MONTHS);
            } else {
                route.candidate_months.sort();
                route.candidate_months.dedup();
            }
            Some(route)
        })
        .collect()
}

/// Build the deduplicated request queue for a normalized route list.
///
/// For every route and month two keys are synthesized: outbound
/// `(origin, destination, month)` and inbound `(destination, origin, month)`.
/// Identical 4-tuples collapse to one request carrying every dependent.
pub fn plan(routes: &[Route], oracle: &FreshnessOracle, force_fresh: bool) -> Vec<MonthRequest> {
    let mut queue: Vec<MonthRequest> = Vec::new();
    let mut index: HashMap<MonthRequestKey, usize> = HashMap::new();

    for route in routes {
        for (month_index, month) in route.candidate_months.iter().enumerate() {
            let legs = [
                (Direction::Outbound, &route.origin, &route.destination),
                (Direction::Inbound, &route.destination, &route.origin),
            ];
            for (direction, from, to) in legs {
                let key = MonthRequestKey::new(from, to, month);
                let dependent = Dependent {
                    route_code: route.code.clone(),
                    direction,
                    month_index,
                };
                match index.get(&key) {
                    Some(&at) => queue[at].dependents.push(dependent),
                    None => {
                        let likely_cache_hit = oracle.predicts_cache_hit(&key, force_fresh);
                        index.insert(key.clone(), queue.len());
                        queue.push(MonthRequest {
                            key,
                            dependents: vec![dependent],
                            likely_cache_hit,
                        });
                    }
                }
            }
        }
    }

    queue
}
