//! Route completion tracking.
//!
//! Each route starts with a pending counter of 2 × its month count. Every
//! resolved request fans its day map out to its dependents' slots and
//! decrements the counters; a route is evaluated exactly once, the moment
//! its counter reaches zero, regardless of the order fetches land in.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::info;

use common::{Direction, MonthAvailability, MonthRequest, Route, RouteAvailability};

struct PendingRoute {
    slots: RouteAvailability,
    remaining: usize,
}

struct State {
    pending: HashMap<String, PendingRoute>,
    completed: HashMap<String, RouteAvailability>,
    dropped: Vec<String>,
}

/// Owns route completion counters and partially-filled availability slots.
pub struct Aggregator {
    state: Mutex<State>,
}

impl Aggregator {
    /// `routes` must be the same normalized list the planner ran over, so
    /// month indices and counts agree.
    pub fn new(routes: &[Route]) -> Self {
        let pending = routes
            .iter()
            .map(|route| {
                let n = route.candidate_months.len();
                (
                    route.code.clone(),
                    PendingRoute {
                        slots: RouteAvailability {
                            outbound: vec![MonthAvailability::new(); n],
                            inbound: vec![MonthAvailability::new(); n],
                        },
                        remaining: 2 * n,
                    },
                )
            })
            .collect();
        Self {
            state: Mutex::new(State {
                pending,
                completed: HashMap::new(),
                dropped: Vec::new(),
            }),
        }
    }

    /// Fan one resolved request out to every dependent. A request with two
    /// dependents from the same route decrements that route twice.
    pub fn apply(&self, request: &MonthRequest, days: &MonthAvailability) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        for dependent in &request.dependents {
            let Some(pending) = state.pending.get_mut(&dependent.route_code) else {
                continue;
            };
            let slot = match dependent.direction {
                Direction::Outbound => &mut pending.slots.outbound,
                Direction::Inbound => &mut pending.slots.inbound,
            };
            if let Some(cell) = slot.get_mut(dependent.month_index) {
                *cell = days.clone();
            }
            pending.remaining -= 1;

            if pending.remaining == 0 {
                let done = state
                    .pending
                    .remove(&dependent.route_code)
                    .expect("pending route present");
                if done.slots.has_any_days() {
                    state
                        .completed
                        .insert(dependent.route_code.clone(), done.slots);
                } else {
                    info!("route {}: no availability in any month", dependent.route_code);
                    state.dropped.push(dependent.route_code.clone());
                }
            }
        }
    }

    /// Completed routes and the codes dropped for having no availability.
    pub fn finish(self) -> (HashMap<String, RouteAvailability>, Vec<String>) {
        let state = self.state.into_inner().unwrap_or_else(|p| p.into_inner());
        (state.completed, state.dropped)
    }
}
