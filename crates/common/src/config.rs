//! Scraper configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::YearMonth;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoutConfig {
    /// Carrier endpoints.
    #[serde(default)]
    pub carrier: CarrierConfig,

    /// Cache location and freshness.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Output directory for processed artifacts.
    #[serde(default)]
    pub output: OutputConfig,

    /// Dispatch tuning knobs.
    #[serde(default)]
    pub tuning: TuningConfig,

    /// Routes to scrape.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// Carrier-facing endpoints. Paths are joined onto `base_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Machine API path template; `{origin}`, `{destination}`, `{year}` and
    /// `{month}` are substituted per request.
    #[serde(default = "default_api_path")]
    pub availability_path: String,

    /// User-facing results page template used by the browser fallback.
    #[serde(default = "default_search_path")]
    pub search_path: String,

    /// Landing page navigated during a session refresh.
    #[serde(default = "default_landing_path")]
    pub landing_path: String,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            availability_path: default_api_path(),
            search_path: default_search_path(),
            landing_path: default_landing_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Entries older than this are refetched even when otherwise valid.
    #[serde(default = "default_freshness_secs")]
    pub freshness_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            freshness_secs: default_freshness_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

/// Dispatcher tuning. Every knob has a safe default; the loader falls back
/// to the default on an unparseable override instead of failing the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Maximum concurrently in-flight month requests.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Minimum spacing between network-bound dispatches.
    #[serde(default = "default_interval_ms")]
    pub dispatch_interval_ms: u64,

    /// Random jitter added on top of the spacing.
    #[serde(default = "default_jitter_ms")]
    pub dispatch_jitter_ms: u64,

    /// Full fetch-protocol passes per request before it resolves failed.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Consecutive failures (across all requests) that abort the run.
    #[serde(default = "default_abort_threshold")]
    pub failure_abort_threshold: usize,

    /// Concurrent requests allowed per destination airport.
    #[serde(default = "default_dest_concurrency")]
    pub destination_concurrency: usize,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            dispatch_interval_ms: default_interval_ms(),
            dispatch_jitter_ms: default_jitter_ms(),
            retry_limit: default_retry_limit(),
            failure_abort_threshold: default_abort_threshold(),
            destination_concurrency: default_dest_concurrency(),
        }
    }
}

/// One route entry from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Origin IATA code.
    pub origin: String,
    /// Destination IATA code.
    pub destination: String,
    #[serde(default)]
    pub origin_name: String,
    #[serde(default)]
    pub destination_name: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Candidate months; empty means "next 12 months" at plan time.
    #[serde(default)]
    pub months: Vec<YearMonth>,
}

fn default_base_url() -> String {
    "https://www.virginatlantic.com".into()
}

fn default_api_path() -> String {
    "/reward-seat-checker/api/availability/{origin}/{destination}/{year}/{month}".into()
}

fn default_search_path() -> String {
    "/reward-seat-checker/results?origin={origin}&destination={destination}&month={year}-{month}"
        .into()
}

fn default_landing_path() -> String {
    "/reward-seat-checker".into()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_freshness_secs() -> u64 {
    3600
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("site")
}

fn default_max_in_flight() -> usize {
    3
}

fn default_interval_ms() -> u64 {
    1200
}

fn default_jitter_ms() -> u64 {
    400
}

fn default_retry_limit() -> u32 {
    2
}

fn default_abort_threshold() -> usize {
    8
}

fn default_dest_concurrency() -> usize {
    2
}
