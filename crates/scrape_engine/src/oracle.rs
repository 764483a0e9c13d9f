//! Plan-time prediction of whether a request will be served from cache.
//!
//! The prediction has no side effects and feeds the dispatcher's pacing
//! exemption only; the fetch protocol re-checks authoritatively, so a wrong
//! prediction can cost pacing fairness but never correctness.

use cache_store::{fresh_month_entry, CacheStore};
use common::MonthRequestKey;

#[derive(Debug, Clone)]
pub struct FreshnessOracle {
    store: CacheStore,
    freshness: chrono::Duration,
}

impl FreshnessOracle {
    pub fn new(store: CacheStore, freshness: chrono::Duration) -> Self {
        Self { store, freshness }
    }

    /// `true` only when not forced and a valid, current-schema, fresh entry
    /// exists for the key.
    pub fn predicts_cache_hit(&self, key: &MonthRequestKey, force_fresh: bool) -> bool {
        !force_fresh && fresh_month_entry(&self.store, key, self.freshness).is_some()
    }
}
