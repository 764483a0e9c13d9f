//! award-scout: reward-seat availability scraper.
//!
//! Single-binary Tokio application that:
//! 1. Plans deduplicated month requests for the configured routes
//! 2. Fetches each month via the direct API, falling back to browser capture
//! 3. Caches raw months and merged aggregates under a schema version
//! 4. Processes the aggregates into JSON artifacts plus a static page

mod artifacts;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use cache_store::CacheStore;
use carrier_client::{BrowserCapture, CarrierFetcher, CarrierRestClient};
use common::{Error, Result, ScoutConfig};
use scrape_engine::{parse_filters, ConfigCatalog, ScrapeRun};

/// Reward-seat availability scraper
#[derive(Parser)]
#[command(name = "award-scout", about = "Reward-seat availability scraper")]
struct Cli {
    /// Configuration file (defaults to ./config.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ignore cached months and refetch everything.
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch availability and update the cache.
    Scrape {
        /// Route codes (LHR-JFK) or airport codes (JFK) to restrict the run.
        selections: Vec<String>,
    },
    /// Turn cached aggregates into the report's data files.
    Process,
    /// Write the static report page.
    Build,
    /// Scrape, process, and build in sequence.
    All {
        /// Route codes (LHR-JFK) or airport codes (JFK) to restrict the run.
        selections: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "award_scout=info,scrape_engine=info,carrier_client=info,cache_store=info".into()
            }),
        )
        .with_target(true)
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let cfg = match config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    let command = cli.command.unwrap_or(Command::All { selections: vec![] });
    if let Err(e) = run(command, cfg, cli.no_cache).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(command: Command, cfg: ScoutConfig, no_cache: bool) -> Result<()> {
    match command {
        Command::Scrape { selections } => {
            scrape(&cfg, &selections, no_cache).await?;
        }
        Command::Process => {
            let store = CacheStore::open(&cfg.cache.dir)?;
            let freshness = chrono::Duration::seconds(cfg.cache.freshness_secs as i64);
            let stale = no_cache
                || store
                    .age(cache_store::DATASET_KEY)
                    .map_or(true, |age| age > freshness);
            if stale {
                info!("scraped dataset is missing or stale, scraping first");
                scrape(&cfg, &[], no_cache).await?;
            }
            artifacts::process(&store, &cfg.output.dir)?;
        }
        Command::Build => {
            artifacts::build(&cfg.output.dir)?;
        }
        Command::All { selections } => {
            // A tripped breaker still leaves completed routes in the cache;
            // any other scrape failure means there is nothing new to process.
            let tripped = match scrape(&cfg, &selections, no_cache).await {
                Ok(()) => None,
                Err(Error::CircuitBreaker { consecutive }) => {
                    warn!("run aborted early, processing the routes that completed");
                    Some(consecutive)
                }
                Err(e) => return Err(e),
            };
            let store = CacheStore::open(&cfg.cache.dir)?;
            refresh_artifacts(&store, &cfg.output.dir, tripped.is_some())?;
            artifacts::build(&cfg.output.dir)?;
            if let Some(consecutive) = tripped {
                return Err(Error::CircuitBreaker { consecutive });
            }
        }
    }
    Ok(())
}

/// Regenerate the processed artifacts after a scrape, skipping when they are
/// already newer than the dataset. An aborted first-ever run persists a
/// dataset but no manifest; that leaves nothing to process, and the breaker
/// abort must surface instead of a missing-manifest error.
fn refresh_artifacts(store: &CacheStore, output: &std::path::Path, aborted: bool) -> Result<()> {
    if aborted && !store.exists(cache_store::MANIFEST_KEY) {
        warn!("no manifest from a completed run yet, skipping artifact processing");
        return Ok(());
    }
    if artifacts::is_stale(store, output) {
        artifacts::process(store, output)?;
    } else {
        info!("processed artifacts are up to date");
    }
    Ok(())
}

async fn scrape(cfg: &ScoutConfig, selections: &[String], no_cache: bool) -> Result<()> {
    let store = CacheStore::open(&cfg.cache.dir)?;
    let freshness = chrono::Duration::seconds(cfg.cache.freshness_secs as i64);

    let rest = CarrierRestClient::new(cfg.carrier.clone())?;
    let browser = BrowserCapture::new(cfg.carrier.clone());
    let fetcher = CarrierFetcher::new(rest, browser, store.clone(), freshness);

    let scrape_run = ScrapeRun::new(
        Arc::new(ConfigCatalog::new(cfg.routes.clone())),
        Arc::new(fetcher),
        store,
        cfg.tuning.clone(),
        freshness,
    );

    let filters = parse_filters(selections);
    if !selections.is_empty() && filters.is_empty() {
        return Err(Error::Config(format!(
            "no usable route selections in {selections:?}"
        )));
    }

    let summary = scrape_run.execute(&filters, no_cache).await?;
    info!(
        "{} routes with space; months: {} fetched ({} via fallback), {} cache hits, {} empty, {} failed",
        summary.dataset.len(),
        summary.stats.successful,
        summary.stats.fallback_used,
        summary.stats.cache_hits,
        summary.stats.empty,
        summary.stats.failed,
    );
    for code in &summary.dropped_routes {
        info!("{code}: no reward availability in the scanned window");
    }
    Ok(())
}
