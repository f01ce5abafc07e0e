//! Lenient timestamp and amount parsing for stored documents.
//!
//! Stored values may come from older writers (offset-qualified ISO strings,
//! numeric strings for amounts). Anything unparsable resolves to `None`
//! instead of failing the whole document load.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a stored timestamp into local wall-clock time.
///
/// Offset-qualified values keep their own wall-clock reading.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Lower bound of a query range. A date-only bound starts at midnight.
pub fn parse_range_start(raw: &str) -> Option<NaiveDateTime> {
    parse_timestamp(raw).or_else(|| {
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .ok()
            .map(|d| d.and_time(NaiveTime::MIN))
    })
}

/// Upper bound of a query range. A date-only bound covers the whole day.
pub fn parse_range_end(raw: &str) -> Option<NaiveDateTime> {
    parse_timestamp(raw).or_else(|| {
        let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()?;
        let end = NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?;
        Some(date.and_time(end))
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Text(String),
    Number(f64),
    Other(serde_json::Value),
}

pub fn deserialize_opt_timestamp<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawValue>::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawValue::Text(s)) => parse_timestamp(&s),
        _ => None,
    })
}

pub fn deserialize_timestamps<'de, D>(deserializer: D) -> Result<Vec<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<RawValue>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|v| match v {
            RawValue::Text(s) => parse_timestamp(&s),
            _ => None,
        })
        .collect())
}

fn amount_from(raw: RawValue) -> Option<f64> {
    match raw {
        RawValue::Number(n) if n.is_finite() => Some(n),
        RawValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Amount stored either as a number or a numeric string; anything else is 0.
pub fn deserialize_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawValue>::deserialize(deserializer)?;
    Ok(raw.and_then(amount_from).unwrap_or(0.0))
}

pub fn deserialize_opt_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawValue>::deserialize(deserializer)?;
    Ok(raw.and_then(amount_from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_naive_and_offset_timestamps() {
        let naive = parse_timestamp("2026-10-19T08:00:00").unwrap();
        assert_eq!(naive.to_string(), "2026-10-19 08:00:00");

        let offset = parse_timestamp("2026-10-19T08:00:00.123456+02:00").unwrap();
        assert_eq!(offset.format("%H:%M:%S").to_string(), "08:00:00");

        assert_eq!(parse_timestamp("2026-10-19 21:30"), NaiveDate::from_ymd_opt(2026, 10, 19).unwrap().and_hms_opt(21, 30, 0));
    }

    #[test]
    fn garbage_timestamp_is_none() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2026-13-45T99:00:00").is_none());
    }

    #[test]
    fn date_only_bounds_cover_whole_day() {
        let start = parse_range_start("2026-10-01").unwrap();
        let end = parse_range_end("2026-10-01").unwrap();
        assert_eq!(start.to_string(), "2026-10-01 00:00:00");
        assert_eq!(end.format("%H:%M:%S%.3f").to_string(), "23:59:59.999");
    }

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "deserialize_amount")]
        amount: f64,
        #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
        at: Option<NaiveDateTime>,
        #[serde(default, deserialize_with = "deserialize_timestamps")]
        list: Vec<NaiveDateTime>,
    }

    #[test]
    fn lenient_fields_accept_strings_and_drop_garbage() {
        let sample: Sample = serde_json::from_str(
            r#"{"amount": "2.5", "at": "not a date", "list": ["2026-10-19T08:00:00", 5, "x"]}"#,
        )
        .unwrap();
        assert_eq!(sample.amount, 2.5);
        assert!(sample.at.is_none());
        assert_eq!(sample.list.len(), 1);

        let sample: Sample = serde_json::from_str(r#"{"amount": null, "at": null}"#).unwrap();
        assert_eq!(sample.amount, 0.0);
        assert!(sample.list.is_empty());
    }
}
