//! Domain data model: routes, months, per-day reward availability, and the
//! planned unit of network work (`MonthRequest`).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

// ── Calendar months ───────────────────────────────────────────────────

/// A calendar month, serialized as `"YYYY-MM"`.
///
/// Ordering is by `(year, month)`, which the derived impls give us because
/// both components are zero-padded strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    /// 4-digit year.
    pub year: String,
    /// 2-digit month, `01`–`12`.
    pub month: String,
}

impl YearMonth {
    pub fn new(year: impl Into<String>, month: impl Into<String>) -> Self {
        Self {
            year: year.into(),
            month: month.into(),
        }
    }

    /// The next `n` calendar months starting from the current one (UTC).
    ///
    /// Used as the planning fallback when a route carries no scraped
    /// candidate months.
    pub fn upcoming(n: usize) -> Vec<YearMonth> {
        let now = Utc::now();
        let mut year = now.year();
        let mut month = now.month();
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(YearMonth::new(format!("{year:04}"), format!("{month:02}")));
            month += 1;
            if month > 12 {
                month = 1;
                year += 1;
            }
        }
        out
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| Error::Config(format!("invalid month '{s}', expected YYYY-MM")))?;
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Config(format!("invalid year in month '{s}'")));
        }
        let m: u32 = month
            .parse()
            .map_err(|_| Error::Config(format!("invalid month in '{s}'")))?;
        if month.len() != 2 || !(1..=12).contains(&m) {
            return Err(Error::Config(format!("invalid month in '{s}'")));
        }
        Ok(YearMonth::new(year, month))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

// ── Routes ────────────────────────────────────────────────────────────

/// An ordered origin/destination pair tracked as one planning unit.
///
/// Immutable once produced by the route catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Unique `ORIGIN-DEST` code, e.g. `LHR-JFK`.
    pub code: String,
    pub origin: String,
    pub destination: String,
    pub origin_name: String,
    pub destination_name: String,
    /// Display grouping (e.g. a region label) for the report.
    #[serde(default)]
    pub region: Option<String>,
    /// Deduplicated, sorted candidate months chosen for this route.
    #[serde(default)]
    pub candidate_months: Vec<YearMonth>,
}

impl Route {
    /// Both endpoint codes resolved to 3-letter IATA codes.
    pub fn is_resolved(&self) -> bool {
        is_airport_code(&self.origin) && is_airport_code(&self.destination)
    }
}

/// `true` for a plausible 3-letter IATA airport code.
pub fn is_airport_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

/// Which leg of a route a month-fetch serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outbound,
    Inbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outbound => write!(f, "outbound"),
            Direction::Inbound => write!(f, "inbound"),
        }
    }
}

// ── Per-day availability ──────────────────────────────────────────────

/// Reward pricing for one cabin on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CabinAward {
    /// Points price. Never zero: a zero-points cabin is dropped at parse
    /// time rather than stored.
    pub points: u32,
    /// Remaining reward seats. `None` only on entries written by an older
    /// schema; its absence marks the cache entry for refetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seats: Option<u32>,
    /// Promotional / lowest-tier price marker.
    #[serde(default)]
    pub saver: bool,
}

/// Reward availability for a single date.
///
/// A missing cabin field means that cabin had no reward inventory that day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayAvailability {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economy: Option<CabinAward>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium: Option<CabinAward>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<CabinAward>,
    /// Lowest cash fare seen for the day, if the carrier published one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// When this day was captured. Backfilled from the envelope write time
    /// for entries written before the field existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
}

impl DayAvailability {
    pub fn cabins(&self) -> impl Iterator<Item = &CabinAward> {
        [&self.economy, &self.premium, &self.upper]
            .into_iter()
            .flatten()
    }

    /// At least one cabin has reward inventory.
    pub fn has_award_space(&self) -> bool {
        self.cabins().next().is_some()
    }

    /// Any cabin priced but missing a seat count, the marker left behind
    /// by the pre-seat-count schema.
    pub fn has_legacy_cabin(&self) -> bool {
        self.cabins().any(|c| c.seats.is_none())
    }
}

/// ISO date string → availability. Empty means "fetched, nothing available",
/// which is distinct from "not fetched".
pub type MonthAvailability = BTreeMap<String, DayAvailability>;

// ── Per-route aggregation ─────────────────────────────────────────────

/// Month-by-month availability for both legs of a route, indexed identically
/// to the route's candidate months.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteAvailability {
    pub outbound: Vec<MonthAvailability>,
    pub inbound: Vec<MonthAvailability>,
}

impl RouteAvailability {
    /// At least one month slot in either direction holds at least one date.
    pub fn has_any_days(&self) -> bool {
        self.outbound
            .iter()
            .chain(self.inbound.iter())
            .any(|m| !m.is_empty())
    }
}

/// Run-scoped summary persisted after aggregation completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunManifest {
    /// Routes that contributed at least one non-empty month.
    pub routes: Vec<Route>,
    /// Months actually planned for each route, keyed by route code.
    pub months: BTreeMap<String, Vec<YearMonth>>,
    pub scraped_at: DateTime<Utc>,
}

// ── Planned network work ──────────────────────────────────────────────

/// The unit of network work: one directed origin→destination pair for one
/// calendar month. Two routes needing the same 4-tuple collapse to one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthRequestKey {
    pub origin: String,
    pub destination: String,
    pub year: String,
    pub month: String,
}

impl MonthRequestKey {
    pub fn new(origin: &str, destination: &str, ym: &YearMonth) -> Self {
        Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
            year: ym.year.clone(),
            month: ym.month.clone(),
        }
    }

    /// Cache file stem: `ORIGIN-DEST-YYYY-MM`.
    pub fn cache_name(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.origin, self.destination, self.year, self.month
        )
    }
}

impl fmt::Display for MonthRequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}→{} {}-{}",
            self.origin, self.destination, self.year, self.month
        )
    }
}

/// A (route, direction, month-index) triple that needs a request's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependent {
    pub route_code: String,
    pub direction: Direction,
    pub month_index: usize,
}

/// One planned month-fetch plus everything that depends on it.
#[derive(Debug, Clone)]
pub struct MonthRequest {
    pub key: MonthRequestKey,
    pub dependents: Vec<Dependent>,
    /// Plan-time prediction; the fetch protocol re-checks authoritatively.
    pub likely_cache_hit: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_month_parses_and_round_trips() {
        let ym: YearMonth = "2026-09".parse().unwrap();
        assert_eq!(ym, YearMonth::new("2026", "09"));
        assert_eq!(ym.to_string(), "2026-09");

        let json = serde_json::to_string(&ym).unwrap();
        assert_eq!(json, "\"2026-09\"");
        let back: YearMonth = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ym);
    }

    #[test]
    fn year_month_rejects_garbage() {
        assert!("2026".parse::<YearMonth>().is_err());
        assert!("26-09".parse::<YearMonth>().is_err());
        assert!("2026-13".parse::<YearMonth>().is_err());
        assert!("2026-9".parse::<YearMonth>().is_err());
    }

    #[test]
    fn year_month_orders_across_year_boundary() {
        let dec: YearMonth = "2026-12".parse().unwrap();
        let jan: YearMonth = "2027-01".parse().unwrap();
        assert!(dec < jan);
    }

    #[test]
    fn upcoming_crosses_year_boundary() {
        let months = YearMonth::upcoming(13);
        assert_eq!(months.len(), 13);
        // 13 consecutive months always span a December→January step.
        let mut sorted = months.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, months);
    }

    #[test]
    fn legacy_cabin_detection() {
        let day = DayAvailability {
            economy: Some(CabinAward {
                points: 12_000,
                seats: None,
                saver: false,
            }),
            premium: None,
            upper: None,
            cash_price: None,
            currency: None,
            captured_at: None,
        };
        assert!(day.has_legacy_cabin());
        assert!(day.has_award_space());
    }

    #[test]
    fn airport_code_validation() {
        assert!(is_airport_code("LHR"));
        assert!(!is_airport_code("lhr"));
        assert!(!is_airport_code("LHRX"));
        assert!(!is_airport_code(""));
    }
}
