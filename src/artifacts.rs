//! Processed output artifacts: turns the cached scrape aggregates into the
//! JSON files the report frontend reads, plus a static page shell.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use cache_store::{CacheStore, DATASET_KEY, MANIFEST_KEY};
use common::{Error, MonthAvailability, Result, RouteAvailability, RunManifest, YearMonth};

/// One route as the report sees it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteSummary<'a> {
    code: &'a str,
    origin: &'a str,
    destination: &'a str,
    origin_name: &'a str,
    destination_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<&'a str>,
    months: &'a [YearMonth],
}

/// Both legs of a route with their months flattened into one date map.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct MergedRoute {
    outbound: MonthAvailability,
    inbound: MonthAvailability,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Status {
    scraped_at: DateTime<Utc>,
    generated_at: DateTime<Utc>,
    route_count: usize,
    days_with_space: usize,
}

fn data_dir(output: &Path) -> PathBuf {
    output.join("data")
}

/// The processed artifacts are missing or older than the scraped dataset.
pub fn is_stale(store: &CacheStore, output: &Path) -> bool {
    let artifact = data_dir(output).join("availability.json");
    let Ok(artifact_meta) = std::fs::metadata(&artifact) else {
        return true;
    };
    let dataset_meta = match std::fs::metadata(store.root().join(DATASET_KEY)) {
        Ok(m) => m,
        Err(_) => return true,
    };
    match (artifact_meta.modified(), dataset_meta.modified()) {
        (Ok(artifact_time), Ok(dataset_time)) => artifact_time < dataset_time,
        _ => true,
    }
}

/// Flatten month slots into one date→availability map. Slots are merged in
/// order, so a date scraped in two overlapping months keeps the later slot's
/// value.
fn merge_months(months: &[MonthAvailability]) -> MonthAvailability {
    let mut merged = MonthAvailability::new();
    for month in months {
        merged.extend(month.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, body)
        .map_err(|e| Error::Other(format!("writing {}: {e}", path.display())))
}

/// Read the scrape aggregates and write `data/routes.json`,
/// `data/availability.json` and `data/status.json` under the output dir.
pub fn process(store: &CacheStore, output: &Path) -> Result<()> {
    let manifest: RunManifest = store
        .read(MANIFEST_KEY)
        .ok_or_else(|| Error::Cache("no scrape metadata cached; run a scrape first".into()))?;
    let dataset: BTreeMap<String, RouteAvailability> = store
        .read(DATASET_KEY)
        .ok_or_else(|| Error::Cache("no scraped dataset cached; run a scrape first".into()))?;

    let dir = data_dir(output);
    std::fs::create_dir_all(&dir)?;

    let empty_months: Vec<YearMonth> = Vec::new();
    let routes: Vec<RouteSummary<'_>> = manifest
        .routes
        .iter()
        .map(|r| RouteSummary {
            code: &r.code,
            origin: &r.origin,
            destination: &r.destination,
            origin_name: &r.origin_name,
            destination_name: &r.destination_name,
            region: r.region.as_deref(),
            months: manifest.months.get(&r.code).unwrap_or(&empty_months),
        })
        .collect();
    write_json(&dir.join("routes.json"), &routes)?;

    let merged: BTreeMap<&String, MergedRoute> = dataset
        .iter()
        .map(|(code, availability)| {
            (
                code,
                MergedRoute {
                    outbound: merge_months(&availability.outbound),
                    inbound: merge_months(&availability.inbound),
                },
            )
        })
        .collect();
    write_json(&dir.join("availability.json"), &merged)?;

    let days_with_space = merged
        .values()
        .flat_map(|r| r.outbound.values().chain(r.inbound.values()))
        .filter(|d| d.has_award_space())
        .count();
    let status = Status {
        scraped_at: manifest.scraped_at,
        generated_at: Utc::now(),
        route_count: routes.len(),
        days_with_space,
    };
    write_json(&dir.join("status.json"), &status)?;

    info!(
        "processed {} routes ({days_with_space} days with space) into {}",
        routes.len(),
        dir.display()
    );
    Ok(())
}

/// Write the static page shell that loads the processed data files.
pub fn build(output: &Path) -> Result<()> {
    std::fs::create_dir_all(output)?;
    let page = output.join("index.html");
    std::fs::write(&page, INDEX_HTML)
        .map_err(|e| Error::Other(format!("writing {}: {e}", page.display())))?;
    info!("wrote {}", page.display());
    Ok(())
}

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Reward Seat Availability</title>
  <style>
    body { font-family: system-ui, sans-serif; margin: 2rem auto; max-width: 64rem; }
    h1 { font-size: 1.4rem; }
    table { border-collapse: collapse; width: 100%; margin-top: 1rem; }
    th, td { border: 1px solid #ccc; padding: 0.3rem 0.6rem; text-align: left; }
    .saver { font-weight: bold; }
    #status { color: #666; font-size: 0.85rem; }
  </style>
</head>
<body>
  <h1>Reward Seat Availability</h1>
  <p id="status">Loading…</p>
  <div id="routes"></div>
  <script>
    async function load(name) {
      const res = await fetch(`data/${name}.json`);
      if (!res.ok) throw new Error(`${name}: ${res.status}`);
      return res.json();
    }
    function cabinCell(day, cabin) {
      const award = day[cabin];
      if (!award) return "<td>–</td>";
      const cls = award.saver ? ' class="saver"' : "";
      const seats = award.seats == null ? "" : ` ×${award.seats}`;
      return `<td${cls}>${award.points.toLocaleString()}${seats}</td>`;
    }
    (async () => {
      try {
        const [routes, availability, status] = await Promise.all([
          load("routes"), load("availability"), load("status"),
        ]);
        document.getElementById("status").textContent =
          `${status.routeCount} routes, ${status.daysWithSpace} days with space, ` +
          `scraped ${new Date(status.scrapedAt).toLocaleString()}`;
        const container = document.getElementById("routes");
        for (const route of routes) {
          const data = availability[route.code];
          if (!data) continue;
          for (const [direction, days] of [["Outbound", data.outbound], ["Inbound", data.inbound]]) {
            const dates = Object.keys(days);
            if (!dates.length) continue;
            const rows = dates.map((date) => {
              const day = days[date];
              return `<tr><td>${date}</td>` +
                cabinCell(day, "economy") + cabinCell(day, "premium") + cabinCell(day, "upper") +
                `</tr>`;
            }).join("");
            container.insertAdjacentHTML("beforeend",
              `<h2>${route.originName} → ${route.destinationName} (${direction})</h2>` +
              `<table><tr><th>Date</th><th>Economy</th><th>Premium</th><th>Upper</th></tr>${rows}</table>`);
          }
        }
      } catch (err) {
        document.getElementById("status").textContent = `Failed to load data: ${err.message}`;
      }
    })();
  </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CabinAward, DayAvailability, Route};

    fn day(points: u32) -> DayAvailability {
        DayAvailability {
            economy: Some(CabinAward {
                points,
                seats: Some(1),
                saver: false,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn merge_is_last_write_wins_on_overlapping_dates() {
        let mut first = MonthAvailability::new();
        first.insert("2026-09-10".into(), day(10_000));
        first.insert("2026-09-11".into(), day(12_000));
        let mut second = MonthAvailability::new();
        second.insert("2026-09-11".into(), day(20_000));

        let merged = merge_months(&[first, second]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["2026-09-11"].economy.as_ref().unwrap().points, 20_000);
        assert_eq!(merged["2026-09-10"].economy.as_ref().unwrap().points, 10_000);
    }

    #[test]
    fn process_writes_all_three_artifacts() {
        let cache_dir = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let store = CacheStore::open(cache_dir.path()).unwrap();

        let route = Route {
            code: "LHR-JFK".into(),
            origin: "LHR".into(),
            destination: "JFK".into(),
            origin_name: "London Heathrow".into(),
            destination_name: "New York JFK".into(),
            region: None,
            candidate_months: vec!["2026-09".parse().unwrap()],
        };
        let mut month = MonthAvailability::new();
        month.insert("2026-09-10".into(), day(10_000));
        let mut dataset = BTreeMap::new();
        dataset.insert(
            "LHR-JFK".to_string(),
            RouteAvailability {
                outbound: vec![month],
                inbound: vec![MonthAvailability::new()],
            },
        );
        let manifest = RunManifest {
            months: [("LHR-JFK".to_string(), route.candidate_months.clone())].into(),
            routes: vec![route],
            scraped_at: Utc::now(),
        };
        store.write(MANIFEST_KEY, &manifest).unwrap();
        store.write(DATASET_KEY, &dataset).unwrap();

        assert!(is_stale(&store, output.path()));
        process(&store, output.path()).unwrap();
        assert!(!is_stale(&store, output.path()));

        let raw = std::fs::read_to_string(output.path().join("data/availability.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value["LHR-JFK"]["outbound"]["2026-09-10"]["economy"]["points"],
            10_000
        );
        let status_raw = std::fs::read_to_string(output.path().join("data/status.json")).unwrap();
        let status: serde_json::Value = serde_json::from_str(&status_raw).unwrap();
        assert_eq!(status["routeCount"], 1);
        assert_eq!(status["daysWithSpace"], 1);
    }

    #[test]
    fn process_without_a_scrape_is_an_error() {
        let cache_dir = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let store = CacheStore::open(cache_dir.path()).unwrap();
        assert!(process(&store, output.path()).is_err());
    }

    #[test]
    fn build_writes_the_page_shell() {
        let output = tempfile::tempdir().unwrap();
        build(output.path()).unwrap();
        let page = std::fs::read_to_string(output.path().join("index.html")).unwrap();
        assert!(page.contains("data/"));
    }
}
