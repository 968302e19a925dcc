use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::event::{FieldValue, HttpRequestInfo};

/// Time precision of a point's timestamp, using the InfluxDB 1.x
/// `precision` query parameter spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Precision {
    #[serde(rename = "ns")]
    Nanoseconds,
    #[serde(rename = "u")]
    Microseconds,
    #[serde(rename = "ms")]
    Milliseconds,
    #[default]
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "m")]
    Minutes,
    #[serde(rename = "h")]
    Hours,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Nanoseconds => "ns",
            Precision::Microseconds => "u",
            Precision::Milliseconds => "ms",
            Precision::Seconds => "s",
            Precision::Minutes => "m",
            Precision::Hours => "h",
        }
    }

    /// Timestamp of `time` expressed in this precision, truncated.
    ///
    /// Nanoseconds fall back to microseconds * 1000 outside the range
    /// chrono can represent as `i64` nanos.
    pub fn timestamp(&self, time: &DateTime<Utc>) -> i64 {
        match self {
            Precision::Nanoseconds => time
                .timestamp_nanos_opt()
                .unwrap_or_else(|| time.timestamp_micros().saturating_mul(1_000)),
            Precision::Microseconds => time.timestamp_micros(),
            Precision::Milliseconds => time.timestamp_millis(),
            Precision::Seconds => time.timestamp(),
            Precision::Minutes => time.timestamp().div_euclid(60),
            Precision::Hours => time.timestamp().div_euclid(3600),
        }
    }
}

/// Value of a point field.
///
/// The hook only ever writes strings: the message, and JSON documents for
/// structured values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PointField {
    Str(String),
    Request(HttpRequestInfo),
    Map(BTreeMap<String, FieldValue>),
}

impl From<&str> for PointField {
    fn from(value: &str) -> Self {
        PointField::Str(value.to_string())
    }
}

impl From<String> for PointField {
    fn from(value: String) -> Self {
        PointField::Str(value)
    }
}

/// One time-series record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, PointField>,
    pub time: DateTime<Utc>,
    pub precision: Precision,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Point {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            time: Utc::now(),
            precision: Precision::default(),
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn field(&self, key: &str) -> Option<&PointField> {
        self.fields.get(key)
    }
}

/// Points sent in one write call, with their destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchPoints {
    pub points: Vec<Point>,
    pub database: String,
    pub retention_policy: String,
}

impl BatchPoints {
    /// Precision used for the whole write request.
    ///
    /// A write carries a single `precision` parameter, so the first point
    /// decides; an empty batch defaults to seconds.
    pub fn precision(&self) -> Precision {
        self.points
            .first()
            .map(|p| p.precision)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_follow_precision() {
        let t = Utc.with_ymd_and_hms(2018, 11, 14, 8, 9, 10).unwrap();
        assert_eq!(Precision::Seconds.timestamp(&t), 1_542_182_950);
        assert_eq!(Precision::Milliseconds.timestamp(&t), 1_542_182_950_000);
        assert_eq!(Precision::Nanoseconds.timestamp(&t), 1_542_182_950_000_000_000);
        assert_eq!(Precision::Minutes.timestamp(&t), 1_542_182_950 / 60);
        assert_eq!(Precision::Hours.timestamp(&t), 1_542_182_950 / 3600);
    }

    #[test]
    fn batch_precision_comes_from_first_point() {
        let mut point = Point::new("logrus");
        point.precision = Precision::Milliseconds;
        let batch = BatchPoints {
            points: vec![point],
            database: "db".into(),
            retention_policy: "default".into(),
        };
        assert_eq!(batch.precision(), Precision::Milliseconds);

        let empty = BatchPoints { points: vec![], ..batch };
        assert_eq!(empty.precision(), Precision::Seconds);
    }
}
