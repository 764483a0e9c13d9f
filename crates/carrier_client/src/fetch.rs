//! The per-request fetch protocol:
//! cache check → direct attempt → direct retry → browser fallback.
//!
//! Every terminal state resolves, never errors: failures become a
//! `FetchStatus::Failed` with a reason string for the statistics.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use cache_store::{fresh_month_entry, month_key, CacheStore};
use common::{FetchResolution, MonthFetcher, MonthRequestKey, Result};

use crate::browser::BrowserCapture;
use crate::rest::CarrierRestClient;

/// Session cookies may take a moment to settle after a failure.
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Drives one `MonthRequest` through the fetch protocol.
#[derive(Clone)]
pub struct CarrierFetcher {
    rest: CarrierRestClient,
    browser: BrowserCapture,
    cache: CacheStore,
    freshness: chrono::Duration,
}

impl CarrierFetcher {
    pub fn new(
        rest: CarrierRestClient,
        browser: BrowserCapture,
        cache: CacheStore,
        freshness: chrono::Duration,
    ) -> Self {
        Self {
            rest,
            browser,
            cache,
            freshness,
        }
    }

    /// Authoritative cache check. On a hit, days written before the capture
    /// timestamp existed are backfilled with the envelope write time and the
    /// upgraded entry is written back.
    fn check_cache(&self, key: &MonthRequestKey) -> Option<FetchResolution> {
        let entry = fresh_month_entry(&self.cache, key, self.freshness)?;
        let mut days = entry.data;

        let mut backfilled = false;
        for day in days.values_mut() {
            if day.captured_at.is_none() {
                day.captured_at = Some(entry.written_at);
                backfilled = true;
            }
        }
        if backfilled {
            // Keep the original envelope time: the upgrade must not make a
            // stale-in-an-hour entry fresh for another full window.
            if let Err(e) = self.cache.write_at(&month_key(key), &days, entry.written_at) {
                warn!("{key}: backfill write failed: {e}");
            }
        }

        debug!("{key}: served from cache ({} days)", days.len());
        Some(FetchResolution::resolved(days, true, false))
    }
}

#[async_trait]
impl MonthFetcher for CarrierFetcher {
    async fn fetch_month(&self, key: &MonthRequestKey, force_fresh: bool) -> FetchResolution {
        // CacheCheck
        if !force_fresh {
            if let Some(hit) = self.check_cache(key) {
                return hit;
            }
        }

        let captured_at = Utc::now();

        // DirectAttempt
        let direct_err = match self.rest.fetch_month_direct(key, captured_at).await {
            Ok(days) => {
                return self.store_and_resolve(key, days, false);
            }
            Err(e) => e,
        };
        debug!("{key}: direct attempt failed: {direct_err}");

        // DirectRetry, one more shot after the cookies settle.
        tokio::time::sleep(RETRY_DELAY).await;
        let retry_err = match self.rest.fetch_month_direct(key, captured_at).await {
            Ok(days) => {
                return self.store_and_resolve(key, days, false);
            }
            Err(e) => e,
        };
        debug!("{key}: direct retry failed: {retry_err}");

        // BrowserFallback
        match self.browser.capture_month(key, captured_at).await {
            Ok(days) => self.store_and_resolve(key, days, true),
            Err(fallback_err) => {
                FetchResolution::failed(format!("direct: {retry_err}; fallback: {fallback_err}"))
            }
        }
    }

    async fn refresh_session(&self) -> Result<()> {
        let cookies = self.browser.refresh_session().await?;
        self.rest.adopt_cookies(&cookies);
        Ok(())
    }
}

impl CarrierFetcher {
    /// Successful captures overwrite any stale cache entry unconditionally.
    fn store_and_resolve(
        &self,
        key: &MonthRequestKey,
        days: common::MonthAvailability,
        used_fallback: bool,
    ) -> FetchResolution {
        if let Err(e) = self.cache.write(&month_key(key), &days) {
            warn!("{key}: cache write failed: {e}");
        }
        FetchResolution::resolved(days, false, used_fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::CarrierConfig;
    use common::{CabinAward, DayAvailability, FetchStatus, MonthAvailability};

    fn key() -> MonthRequestKey {
        MonthRequestKey::new("LHR", "JFK", &"2026-09".parse().unwrap())
    }

    fn fetcher(cache: CacheStore) -> CarrierFetcher {
        let config = CarrierConfig::default();
        CarrierFetcher::new(
            CarrierRestClient::new(config.clone()).unwrap(),
            BrowserCapture::new(config),
            cache,
            chrono::Duration::hours(1),
        )
    }

    fn day(points: u32, seats: Option<u32>) -> DayAvailability {
        DayAvailability {
            economy: Some(CabinAward {
                points,
                seats,
                saver: false,
            }),
            premium: None,
            upper: None,
            cash_price: None,
            currency: None,
            captured_at: None,
        }
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_and_backfills_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();

        let mut month = MonthAvailability::new();
        month.insert("2026-09-01".into(), day(12_000, Some(4)));
        cache.write(&month_key(&key()), &month).unwrap();

        let fetcher = fetcher(cache.clone());
        let resolution = fetcher.fetch_month(&key(), false).await;

        assert_eq!(resolution.status, FetchStatus::Success);
        assert!(resolution.from_cache);
        assert!(!resolution.used_fallback);
        assert!(resolution.days["2026-09-01"].captured_at.is_some());

        // The upgrade was written back.
        let upgraded: MonthAvailability = cache.read(&month_key(&key())).unwrap();
        assert!(upgraded["2026-09-01"].captured_at.is_some());
    }

    #[tokio::test]
    async fn backfill_write_keeps_the_original_envelope_time() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();

        // A 30-minute-old entry whose days predate the capture timestamp.
        let written_at = chrono::Utc::now() - chrono::Duration::minutes(30);
        let mut month = MonthAvailability::new();
        month.insert("2026-09-01".into(), day(12_000, Some(4)));
        let envelope = serde_json::json!({
            "schemaVersion": cache_store::SCHEMA_VERSION,
            "writtenAt": written_at,
            "data": month,
        });
        std::fs::write(
            dir.path().join(month_key(&key())),
            serde_json::to_vec(&envelope).unwrap(),
        )
        .unwrap();

        let resolution = fetcher(cache.clone()).fetch_month(&key(), false).await;
        assert!(resolution.from_cache);

        // The upgrade-write backfilled the timestamp but did not restamp
        // the envelope, so the entry is still 30 minutes from going stale.
        let entry = cache
            .read_entry::<MonthAvailability>(&month_key(&key()))
            .unwrap();
        assert_eq!(entry.written_at, written_at);
        assert_eq!(entry.data["2026-09-01"].captured_at, Some(written_at));
    }

    #[tokio::test]
    async fn cached_empty_month_resolves_empty_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();
        cache
            .write(&month_key(&key()), &MonthAvailability::new())
            .unwrap();

        let resolution = fetcher(cache).fetch_month(&key(), false).await;
        assert_eq!(resolution.status, FetchStatus::Empty);
        assert!(resolution.from_cache);
    }

    #[tokio::test]
    async fn legacy_cabin_entry_is_not_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();

        // Priced cabin with no seat count: the schema-upgrade marker.
        let mut month = MonthAvailability::new();
        month.insert("2026-09-01".into(), day(12_000, None));
        cache.write(&month_key(&key()), &month).unwrap();

        let fetcher = fetcher(cache);
        assert!(fetcher.check_cache(&key()).is_none());
    }
}
