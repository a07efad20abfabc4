//! Datetime helpers shared by persisted records.
//!
//! Everything is UTC. Timestamps are written as RFC 3339 with a `Z` suffix and
//! read back leniently: naive ISO-8601 strings are taken as UTC, and strings
//! that cannot be parsed at all fall back to the current time so a single
//! damaged field never makes a whole record unreadable.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Current time in UTC.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Render a timestamp as RFC 3339 (`2025-01-01T12:00:00Z`).
pub fn serialize_datetime(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(format_datetime)
}

pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse a timestamp leniently. `None` stays `None`; garbage becomes "now".
pub fn deserialize_datetime(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    Some(parse_datetime(raw).unwrap_or_else(|| {
        tracing::debug!(value = %raw, "unparsable timestamp, using current time");
        now()
    }))
}

/// Strict parse used by [`deserialize_datetime`].
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Normalise the named timestamp fields of a JSON object.
///
/// Strings are re-rendered in canonical form (lenient parse), `null` becomes
/// the current time. Fields that are absent are not inserted and all other
/// keys are left as they are.
pub fn process_datetime_fields(
    mut data: Map<String, Value>,
    fields: &[&str],
) -> Map<String, Value> {
    for field in fields {
        let Some(value) = data.get_mut(*field) else {
            continue;
        };
        let normalised = match value {
            Value::String(s) => deserialize_datetime(Some(s)),
            Value::Null => Some(now()),
            _ => None,
        };
        if let Some(dt) = normalised {
            *value = Value::String(format_datetime(dt));
        }
    }
    data
}

/// Interval of `secs` seconds, capped at roughly a century.
pub fn interval_secs(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(3_153_600_000) as i64)
}

/// Whether a periodic job last run at `last` is due again at `at`.
pub fn is_due(last: Option<DateTime<Utc>>, interval: chrono::Duration, at: DateTime<Utc>) -> bool {
    match last {
        Some(t) => at - t >= interval,
        None => true,
    }
}

/// `#[serde(with = "crate::time::lenient")]` for required timestamps.
pub mod lenient {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_datetime(*dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        let parsed = super::deserialize_datetime(Some(&raw));
        Ok(parsed.unwrap_or_else(super::now))
    }
}

/// `#[serde(with = "crate::time::lenient_option")]` for optional timestamps.
pub mod lenient_option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => s.serialize_some(&super::format_datetime(*dt)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(super::deserialize_datetime(raw.as_deref()))
    }
}
