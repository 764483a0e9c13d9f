//! One scrape run end to end: discover → plan → dispatch → persist.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use cache_store::{CacheStore, DATASET_KEY, MANIFEST_KEY};
use common::config::TuningConfig;
use common::{is_airport_code, Error, MonthFetcher, Result, Route, RouteAvailability, RunManifest};

use crate::catalog::RouteCatalog;
use crate::dispatcher::{dispatch, DispatchOptions};
use crate::oracle::FreshnessOracle;
use crate::planner;
use crate::progress::RunStats;

/// A positional CLI selection: a full route code or a bare airport code
/// matching either endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteFilter {
    Code(String),
    Airport(String),
}

impl RouteFilter {
    pub fn parse(raw: &str) -> Option<RouteFilter> {
        let upper = raw.trim().to_ascii_uppercase();
        if let Some((origin, destination)) = upper.split_once('-') {
            if is_airport_code(origin) && is_airport_code(destination) {
                return Some(RouteFilter::Code(upper));
            }
            return None;
        }
        if is_airport_code(&upper) {
            return Some(RouteFilter::Airport(upper));
        }
        None
    }

    pub fn matches(&self, route: &Route) -> bool {
        match self {
            RouteFilter::Code(code) => route.code == *code,
            RouteFilter::Airport(airport) => {
                route.origin == *airport || route.destination == *airport
            }
        }
    }
}

/// Parse raw positional arguments, warning about anything unrecognizable.
pub fn parse_filters(args: &[String]) -> Vec<RouteFilter> {
    args.iter()
        .filter_map(|raw| {
            let filter = RouteFilter::parse(raw);
            if filter.is_none() {
                warn!("ignoring unrecognized route selection '{raw}'");
            }
            filter
        })
        .collect()
}

/// What a successful run hands back to the caller.
#[derive(Debug)]
pub struct ScrapeSummary {
    pub manifest: RunManifest,
    pub dataset: BTreeMap<String, RouteAvailability>,
    pub dropped_routes: Vec<String>,
    pub stats: RunStats,
}

/// Owns all per-run state: catalog, fetcher, cache, tuning.
pub struct ScrapeRun {
    catalog: Arc<dyn RouteCatalog>,
    fetcher: Arc<dyn MonthFetcher>,
    store: CacheStore,
    tuning: TuningConfig,
    freshness: chrono::Duration,
}

impl ScrapeRun {
    pub fn new(
        catalog: Arc<dyn RouteCatalog>,
        fetcher: Arc<dyn MonthFetcher>,
        store: CacheStore,
        tuning: TuningConfig,
        freshness: chrono::Duration,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            store,
            tuning,
            freshness,
        }
    }

    pub async fn execute(
        &self,
        filters: &[RouteFilter],
        force_fresh: bool,
    ) -> Result<ScrapeSummary> {
        let mut routes = self.catalog.discover_routes().await?;
        info!("catalog produced {} routes", routes.len());

        if !filters.is_empty() {
            routes.retain(|route| filters.iter().any(|f| f.matches(route)));
            info!("{} routes match the requested selection", routes.len());
        }

        for route in &mut routes {
            if route.candidate_months.is_empty() {
                route.candidate_months = self.catalog.available_months(route).await?;
            }
        }

        let routes = planner::normalize_routes(routes);
        let oracle = FreshnessOracle::new(self.store.clone(), self.freshness);
        let queue = planner::plan(&routes, &oracle, force_fresh);
        if queue.is_empty() {
            return Err(Error::NothingPlanned);
        }
        let predicted_hits = queue.iter().filter(|r| r.likely_cache_hit).count();
        info!(
            "planned {} month requests for {} routes ({predicted_hits} predicted cache hits)",
            queue.len(),
            routes.len()
        );

        let opts = DispatchOptions::from_tuning(&self.tuning, force_fresh);
        let report = dispatch(queue, &routes, self.fetcher.clone(), opts).await;

        let dataset: BTreeMap<String, RouteAvailability> = report.routes.into_iter().collect();

        // Completed work survives even an aborted run.
        if !dataset.is_empty() {
            self.store.write(DATASET_KEY, &dataset)?;
        }

        if report.tripped {
            return Err(Error::CircuitBreaker {
                consecutive: self.tuning.failure_abort_threshold,
            });
        }
        if dataset.is_empty() {
            return Err(Error::NoData);
        }

        let manifest = RunManifest {
            routes: routes
                .iter()
                .filter(|r| dataset.contains_key(&r.code))
                .cloned()
                .collect(),
            months: routes
                .iter()
                .filter(|r| dataset.contains_key(&r.code))
                .map(|r| (r.code.clone(), r.candidate_months.clone()))
                .collect(),
            scraped_at: Utc::now(),
        };
        self.store.write(MANIFEST_KEY, &manifest)?;

        info!(
            "run complete: {} routes with availability, {} without",
            dataset.len(),
            report.dropped_routes.len()
        );

        Ok(ScrapeSummary {
            manifest,
            dataset,
            dropped_routes: report.dropped_routes,
            stats: report.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ConfigCatalog;
    use async_trait::async_trait;
    use common::config::RouteConfig;
    use common::{
        CabinAward, DayAvailability, FetchResolution, MonthAvailability, MonthRequestKey,
    };

    struct AlwaysAvailable;

    #[async_trait]
    impl MonthFetcher for AlwaysAvailable {
        async fn fetch_month(&self, _key: &MonthRequestKey, _force: bool) -> FetchResolution {
            let mut days = MonthAvailability::new();
            days.insert(
                "2026-09-05".into(),
                DayAvailability {
                    upper: Some(CabinAward {
                        points: 47_500,
                        seats: Some(2),
                        saver: true,
                    }),
                    ..Default::default()
                },
            );
            FetchResolution::resolved(days, false, false)
        }

        async fn refresh_session(&self) -> Result<()> {
            Ok(())
        }
    }

    struct NeverAvailable;

    #[async_trait]
    impl MonthFetcher for NeverAvailable {
        async fn fetch_month(&self, _key: &MonthRequestKey, _force: bool) -> FetchResolution {
            FetchResolution::resolved(MonthAvailability::new(), false, false)
        }

        async fn refresh_session(&self) -> Result<()> {
            Ok(())
        }
    }

    fn route_config(origin: &str, destination: &str) -> RouteConfig {
        RouteConfig {
            origin: origin.into(),
            destination: destination.into(),
            origin_name: String::new(),
            destination_name: String::new(),
            region: None,
            months: vec!["2026-09".parse().unwrap()],
        }
    }

    fn run_with(fetcher: Arc<dyn MonthFetcher>, store: CacheStore) -> ScrapeRun {
        ScrapeRun::new(
            Arc::new(ConfigCatalog::new(vec![
                route_config("LHR", "JFK"),
                route_config("MAN", "BOS"),
            ])),
            fetcher,
            store,
            TuningConfig {
                max_in_flight: 2,
                dispatch_interval_ms: 0,
                dispatch_jitter_ms: 0,
                retry_limit: 1,
                failure_abort_threshold: 5,
                destination_concurrency: 2,
            },
            chrono::Duration::hours(1),
        )
    }

    #[tokio::test]
    async fn full_run_persists_dataset_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let run = run_with(Arc::new(AlwaysAvailable), store.clone());

        let summary = run.execute(&[], false).await.unwrap();
        assert_eq!(summary.dataset.len(), 2);
        assert_eq!(summary.stats.completed, 4);

        let persisted: BTreeMap<String, RouteAvailability> = store.read(DATASET_KEY).unwrap();
        assert!(persisted.contains_key("LHR-JFK"));
        let manifest: RunManifest = store.read(MANIFEST_KEY).unwrap();
        assert_eq!(manifest.routes.len(), 2);
        assert_eq!(manifest.months["MAN-BOS"].len(), 1);
    }

    #[tokio::test]
    async fn empty_run_is_a_distinct_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let run = run_with(Arc::new(NeverAvailable), store);

        match run.execute(&[], false).await {
            Err(Error::NoData) => {}
            other => panic!("expected NoData, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn filters_restrict_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let run = run_with(Arc::new(AlwaysAvailable), store);

        let filters = parse_filters(&["lhr-jfk".to_string()]);
        let summary = run.execute(&filters, false).await.unwrap();
        assert_eq!(summary.dataset.len(), 1);
        assert!(summary.dataset.contains_key("LHR-JFK"));
    }

    #[tokio::test]
    async fn filter_matching_nothing_is_nothing_planned() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let run = run_with(Arc::new(AlwaysAvailable), store);

        let filters = vec![RouteFilter::Airport("SYD".into())];
        match run.execute(&filters, false).await {
            Err(Error::NothingPlanned) => {}
            other => panic!("expected NothingPlanned, got {other:?}"),
        }
    }

    #[test]
    fn filter_parsing() {
        assert_eq!(
            RouteFilter::parse("lhr-jfk"),
            Some(RouteFilter::Code("LHR-JFK".into()))
        );
        assert_eq!(
            RouteFilter::parse("MAN"),
            Some(RouteFilter::Airport("MAN".into()))
        );
        assert_eq!(RouteFilter::parse("heathrow"), None);
        assert_eq!(RouteFilter::parse("LHR-"), None);
    }

    #[test]
    fn airport_filter_matches_either_endpoint() {
        let route = Route {
            code: "LHR-JFK".into(),
            origin: "LHR".into(),
            destination: "JFK".into(),
            origin_name: String::new(),
            destination_name: String::new(),
            region: None,
            candidate_months: vec![],
        };
        assert!(RouteFilter::Airport("JFK".into()).matches(&route));
        assert!(RouteFilter::Airport("LHR".into()).matches(&route));
        assert!(!RouteFilter::Airport("BOS".into()).matches(&route));
    }
}
