//! Decoding of the carrier's month-availability payload.
//!
//! The carrier has shipped two response shapes over time. Decoding is an
//! explicit untagged union tried in precedence order: the current flat
//! `days` list first, then the legacy `calendar.dayStates` wrapper. Both
//! carry the same per-day object.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use common::{CabinAward, DayAvailability, Error, MonthAvailability, Result};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPayload {
    /// Current shape: `{"days": [...]}`.
    Flat { days: Vec<RawDay> },
    /// Legacy shape: `{"calendar": {"dayStates": [...]}}`.
    Legacy { calendar: RawCalendar },
}

#[derive(Debug, Deserialize)]
struct RawCalendar {
    #[serde(rename = "dayStates", default)]
    day_states: Vec<RawDay>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDay {
    date: String,
    #[serde(default)]
    award_economy: Option<RawCabin>,
    #[serde(default)]
    award_premium: Option<RawCabin>,
    #[serde(default)]
    award_upper: Option<RawCabin>,
    #[serde(default)]
    lowest_price: Option<RawPrice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCabin {
    #[serde(default)]
    cabin_points_value: u32,
    #[serde(default)]
    seats_remaining: Option<u32>,
    #[serde(default)]
    is_saver_offer: bool,
}

#[derive(Debug, Deserialize)]
struct RawPrice {
    amount: f64,
    #[serde(default)]
    currency: Option<String>,
}

fn convert_cabin(raw: Option<RawCabin>) -> Option<CabinAward> {
    let raw = raw?;
    // A zero points price means no reward offer for the cabin; drop the
    // field rather than storing zero.
    if raw.cabin_points_value == 0 {
        return None;
    }
    Some(CabinAward {
        points: raw.cabin_points_value,
        seats: raw.seats_remaining,
        saver: raw.is_saver_offer,
    })
}

/// Parse a raw month payload into a date-keyed availability map.
///
/// Days where every cabin ends up empty are dropped from the map; an empty
/// map is a valid "fetched, nothing available" result. `captured_at` is the
/// only injected non-determinism: the same payload and timestamp always
/// produce the same map.
pub fn parse_month(raw: &str, captured_at: DateTime<Utc>) -> Result<MonthAvailability> {
    let payload: RawPayload = serde_json::from_str(raw)
        .map_err(|e| Error::Payload(format!("unrecognized month payload: {e}")))?;

    let days = match payload {
        RawPayload::Flat { days } => days,
        RawPayload::Legacy { calendar } => calendar.day_states,
    };

    let mut month = MonthAvailability::new();
    for raw_day in days {
        let day = DayAvailability {
            economy: convert_cabin(raw_day.award_economy),
            premium: convert_cabin(raw_day.award_premium),
            upper: convert_cabin(raw_day.award_upper),
            cash_price: raw_day.lowest_price.as_ref().map(|p| p.amount),
            currency: raw_day.lowest_price.and_then(|p| p.currency),
            captured_at: Some(captured_at),
        };
        if day.has_award_space() {
            month.insert(raw_day.date, day);
        }
    }
    Ok(month)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()
    }

    const FLAT: &str = r#"{
        "days": [
            {
                "date": "2026-09-01",
                "awardEconomy": {"cabinPointsValue": 12000, "seatsRemaining": 4, "isSaverOffer": true},
                "awardUpper": {"cabinPointsValue": 47500, "seatsRemaining": 2},
                "lowestPrice": {"amount": 345.5, "currency": "GBP"}
            },
            {
                "date": "2026-09-02",
                "awardEconomy": {"cabinPointsValue": 0, "seatsRemaining": 9}
            }
        ]
    }"#;

    #[test]
    fn parses_current_shape() {
        let month = parse_month(FLAT, ts()).unwrap();
        let day = &month["2026-09-01"];
        let economy = day.economy.as_ref().unwrap();
        assert_eq!(economy.points, 12_000);
        assert_eq!(economy.seats, Some(4));
        assert!(economy.saver);
        assert!(day.premium.is_none());
        assert_eq!(day.upper.as_ref().unwrap().points, 47_500);
        assert_eq!(day.cash_price, Some(345.5));
        assert_eq!(day.currency.as_deref(), Some("GBP"));
        assert_eq!(day.captured_at, Some(ts()));
    }

    #[test]
    fn zero_points_cabin_is_dropped_entirely() {
        let month = parse_month(FLAT, ts()).unwrap();
        // The only cabin on 09-02 priced at zero points, so the whole day
        // disappears rather than being stored as zero.
        assert!(!month.contains_key("2026-09-02"));
        assert_eq!(month.len(), 1);
    }

    #[test]
    fn parses_legacy_shape() {
        let raw = r#"{
            "calendar": {
                "dayStates": [
                    {
                        "date": "2026-10-14",
                        "awardPremium": {"cabinPointsValue": 27500, "seatsRemaining": 1}
                    }
                ]
            }
        }"#;
        let month = parse_month(raw, ts()).unwrap();
        assert_eq!(month["2026-10-14"].premium.as_ref().unwrap().points, 27_500);
    }

    #[test]
    fn empty_result_set_is_empty_not_error() {
        let month = parse_month(r#"{"days": []}"#, ts()).unwrap();
        assert!(month.is_empty());
    }

    #[test]
    fn unrecognized_shape_is_an_error() {
        assert!(parse_month(r#"{"surprise": true}"#, ts()).is_err());
        assert!(parse_month("<html>blocked</html>", ts()).is_err());
    }

    #[test]
    fn parsing_is_deterministic() {
        let a = serde_json::to_vec(&parse_month(FLAT, ts()).unwrap()).unwrap();
        let b = serde_json::to_vec(&parse_month(FLAT, ts()).unwrap()).unwrap();
        assert_eq!(a, b);
    }
}
