use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_WATERMARK_KEY: &str = "source_magento_bt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Store {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), metadata: BTreeMap::new() }
    }

    /// Last-sync watermark stored under `key`; empty strings count as absent.
    pub fn watermark(&self, key: &str) -> Option<Watermark> {
        self.metadata
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(Watermark::new)
    }
}

/// Opaque "last successfully synced at" marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(String);

impl Watermark {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.0).ok().map(|dt| dt.with_timezone(&Utc))
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Value for Magento's `updated_at` filter. Values that are not RFC 3339
    /// are passed through untouched.
    pub fn as_source_filter(&self) -> String {
        match self.parse() {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => self.0.clone(),
        }
    }

    /// Watermark for a pass finishing at `now`, strictly after `previous`.
    pub fn advance(previous: Option<&Watermark>, now: DateTime<Utc>) -> Self {
        let floor = previous.and_then(Watermark::parse);
        match floor {
            Some(prev) if now <= prev => Self::from_datetime(prev + Duration::milliseconds(1)),
            _ => Self::from_datetime(now),
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn watermark_formats_for_source_filter() {
        let wm = Watermark::new("2024-03-05T10:20:30.123Z");
        assert_eq!(wm.as_source_filter(), "2024-03-05 10:20:30");
        assert_eq!(Watermark::new("yesterday").as_source_filter(), "yesterday");
    }

    #[test]
    fn advance_is_strictly_greater() {
        let prev = Watermark::new("2030-01-01T00:00:00.000Z");
        let stale_clock = Utc.with_ymd_and_hms(2029, 12, 31, 23, 0, 0).unwrap();
        let next = Watermark::advance(Some(&prev), stale_clock);
        assert_eq!(next.as_str(), "2030-01-01T00:00:00.001Z");
        assert!(next.parse().unwrap() > prev.parse().unwrap());

        let now = Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(Watermark::advance(Some(&prev), now).as_str(), "2031-01-01T00:00:00.000Z");
        assert_eq!(Watermark::advance(None, now).as_str(), "2031-01-01T00:00:00.000Z");
    }

    #[test]
    fn store_reads_watermark_from_metadata() {
        let mut store = Store::new("store_1", "Main");
        assert!(store.watermark(DEFAULT_WATERMARK_KEY).is_none());
        store.metadata.insert(DEFAULT_WATERMARK_KEY.into(), json!(""));
        assert!(store.watermark(DEFAULT_WATERMARK_KEY).is_none());
        store.metadata.insert(DEFAULT_WATERMARK_KEY.into(), json!("2024-01-01T00:00:00.000Z"));
        assert_eq!(store.watermark(DEFAULT_WATERMARK_KEY), Some(Watermark::new("2024-01-01T00:00:00.000Z")));
    }
}
