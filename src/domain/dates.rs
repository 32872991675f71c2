use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A date as it arrives from the backend, before interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDate {
    /// Backend timestamp object (`{seconds, nanoseconds}` or the
    /// underscore-prefixed variant produced by admin SDK serialization).
    Timestamp {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "_nanoseconds")]
        nanoseconds: u32,
    },
    /// Milliseconds since the Unix epoch.
    Millis(f64),
    /// Any textual representation (ISO, `DD/MM/YYYY`, digits-only epoch).
    Text(String),
}

impl RawDate {
    /// Interpret a loosely-typed JSON value, returning `None` for anything
    /// that cannot be a date (null, booleans, arrays, empty strings).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).map(RawDate::Millis),
            Value::String(s) if !s.trim().is_empty() => Some(RawDate::Text(s.trim().to_string())),
            Value::Object(map) => {
                let seconds = map
                    .get("seconds")
                    .or_else(|| map.get("_seconds"))
                    .and_then(Value::as_i64)?;
                let nanoseconds = map
                    .get("nanoseconds")
                    .or_else(|| map.get("_nanoseconds"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0)
                    .min(999_999_999) as u32;
                Some(RawDate::Timestamp {
                    seconds,
                    nanoseconds,
                })
            }
            _ => None,
        }
    }

    /// Parse into a UTC instant, or `None` when the value is not a date.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        parse_fecha(self)
    }
}

impl From<&str> for RawDate {
    fn from(value: &str) -> Self {
        RawDate::Text(value.to_string())
    }
}

impl From<String> for RawDate {
    fn from(value: String) -> Self {
        RawDate::Text(value)
    }
}

impl From<DateTime<Utc>> for RawDate {
    fn from(value: DateTime<Utc>) -> Self {
        RawDate::Text(value.to_rfc3339())
    }
}

impl From<NaiveDate> for RawDate {
    fn from(value: NaiveDate) -> Self {
        RawDate::Text(value.format("%Y-%m-%d").to_string())
    }
}

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d", "%Y%m%d"];

/// Parse a backend date into a UTC instant.
/// Dates and date-times without an offset are taken as UTC.
pub fn parse_fecha(raw: &RawDate) -> Option<DateTime<Utc>> {
    match raw {
        RawDate::Timestamp {
            seconds,
            nanoseconds,
        } => DateTime::from_timestamp(*seconds, *nanoseconds),
        RawDate::Millis(ms) if ms.is_finite() => DateTime::from_timestamp_millis(*ms as i64),
        RawDate::Millis(_) => None,
        RawDate::Text(text) => parse_date_text(text),
    }
}

/// Parse a textual date in any of the accepted formats.
pub fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if is_epoch_digits(text) {
        return text
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(widen_short_year(naive).and_utc());
        }
    }

    parse_date_only(text).and_then(|date| date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc()))
}

/// Parse a calendar date without a time of day. Epoch values and
/// date-times return `None`.
pub fn parse_date_only(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if is_epoch_digits(text) {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| widen_short_year(naive).date())
}

/// Digits-only strings longer than YYYYMMDD are epoch milliseconds.
fn is_epoch_digits(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    digits.len() > 8 && digits.chars().all(|c| c.is_ascii_digit())
}

/// `05/03/24` parses as year 24; spreadsheets mean 2024.
fn widen_short_year(naive: NaiveDateTime) -> NaiveDateTime {
    if (0..100).contains(&naive.year()) {
        naive.with_year(naive.year() + 2000).unwrap_or(naive)
    } else {
        naive
    }
}

/// Milliseconds since epoch, with missing dates at epoch 0.
pub fn millis_or_epoch(date: Option<DateTime<Utc>>) -> i64 {
    date.map(|d| d.timestamp_millis()).unwrap_or(0)
}

/// Creation time embedded in a time-ordered identifier.
///
/// Recognizes 24-hex-digit object ids (leading 8 hex digits are seconds
/// since epoch) and UUID v7 (leading 48 bits are milliseconds). Any other
/// id yields `None`; this is a heuristic on the id's shape, not a guarantee
/// that the backend actually issued a time-ordered id.
pub fn id_embedded_millis(id: &str) -> Option<i64> {
    if id.len() == 24 && id.chars().all(|c| c.is_ascii_hexdigit()) {
        let seconds = u32::from_str_radix(&id[..8], 16).ok()?;
        return Some(i64::from(seconds) * 1000);
    }

    let uuid = Uuid::parse_str(id).ok()?;
    if uuid.get_version_num() != 7 {
        return None;
    }
    let bytes = uuid.as_bytes();
    let millis = bytes[..6]
        .iter()
        .fold(0i64, |acc, byte| (acc << 8) | i64::from(*byte));
    Some(millis)
}

/// Composite ordering key for ledger movements.
///
/// Field order is the comparison order: movement date, then creation
/// time, then the id string. Missing dates compare as epoch 0.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChronoKey {
    pub fecha: i64,
    pub created: i64,
    pub id: String,
}
