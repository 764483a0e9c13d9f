//! The fetch seam between the dispatcher and the carrier client.

use async_trait::async_trait;

use crate::types::{MonthAvailability, MonthRequestKey};
use crate::Result;

/// Terminal status of one month-fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Fetched (or read from cache) with at least one available date.
    Success,
    /// Fetched successfully but zero dates had reward space.
    Empty,
    /// All protocol tiers failed.
    Failed,
}

/// The outcome of driving one `MonthRequest` through the fetch protocol.
#[derive(Debug, Clone)]
pub struct FetchResolution {
    pub status: FetchStatus,
    /// Empty for `Empty` and `Failed` resolutions.
    pub days: MonthAvailability,
    pub from_cache: bool,
    pub used_fallback: bool,
    /// Failure reason for logging; `None` unless `status == Failed`.
    pub reason: Option<String>,
}

impl FetchResolution {
    pub fn resolved(days: MonthAvailability, from_cache: bool, used_fallback: bool) -> Self {
        let status = if days.is_empty() {
            FetchStatus::Empty
        } else {
            FetchStatus::Success
        };
        Self {
            status,
            days,
            from_cache,
            used_fallback,
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: FetchStatus::Failed,
            days: MonthAvailability::new(),
            from_cache: false,
            used_fallback: false,
            reason: Some(reason.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == FetchStatus::Failed
    }
}

/// Executes the per-request fetch protocol. Implemented for real by the
/// carrier client; mocked in dispatcher tests.
#[async_trait]
pub trait MonthFetcher: Send + Sync {
    /// Run one full protocol pass (cache check, direct attempt + retry,
    /// browser fallback). Never returns `Err`: per-request failures resolve
    /// as `FetchStatus::Failed` with a reason.
    async fn fetch_month(&self, key: &MonthRequestKey, force_fresh: bool) -> FetchResolution;

    /// Re-establish the carrier session (landing page + consent prompt).
    /// Serialized by the dispatcher; implementations need not lock.
    async fn refresh_session(&self) -> Result<()>;
}
