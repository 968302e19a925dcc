//! InfluxDB line protocol encoding.
//!
//! <https://docs.influxdata.com/influxdb/v1/write_protocols/line_protocol_reference/>

use crate::point::{BatchPoints, Point, PointField};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum EncodeError {
    #[error("point `{measurement}` has no fields")]
    NoFields { measurement: String },

    #[error("failed to encode field `{field}` as JSON: {message}")]
    Json { field: String, message: String },
}

/// Encode every point of `batch`, one line each, timestamps in the batch
/// precision.
pub fn encode_batch(batch: &BatchPoints) -> Result<String, EncodeError> {
    let precision = batch.precision();
    let mut out = String::new();
    for point in &batch.points {
        encode_point(point, precision.timestamp(&point.time), &mut out)?;
    }
    Ok(out)
}

/// Append `point` as a single line terminated by `\n`.
pub fn encode_point(point: &Point, timestamp: i64, out: &mut String) -> Result<(), EncodeError> {
    if point.fields.is_empty() {
        return Err(EncodeError::NoFields {
            measurement: point.measurement.clone(),
        });
    }

    encode_key(&point.measurement, out);

    for (key, value) in &point.tags {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        out.push(',');
        encode_key(key, out);
        out.push('=');
        encode_key(value, out);
    }
    out.push(' ');

    let fields_start = out.len();
    for (key, value) in &point.fields {
        if out.len() > fields_start {
            out.push(',');
        }
        encode_key(key, out);
        out.push('=');
        encode_field(key, value, out)?;
    }

    out.push(' ');
    out.push_str(&timestamp.to_string());
    out.push('\n');
    Ok(())
}

fn encode_field(key: &str, value: &PointField, out: &mut String) -> Result<(), EncodeError> {
    match value {
        PointField::Str(s) => encode_string_field(s, out),
        PointField::Request(_) | PointField::Map(_) => {
            let json = serde_json::to_string(value).map_err(|e| EncodeError::Json {
                field: key.to_string(),
                message: e.to_string(),
            })?;
            encode_string_field(&json, out);
        }
    }
    Ok(())
}

fn encode_string_field(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

/// Measurement names, tag keys, tag values and field keys.
///
/// A line break would end the line early, so `\n` and `\r` become an
/// escaped space.
fn encode_key(key: &str, out: &mut String) {
    for c in key.chars() {
        match c {
            '\\' | ',' | '=' | ' ' => {
                out.push('\\');
                out.push(c);
            }
            '\n' | '\r' => out.push_str("\\ "),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{FieldValue, HttpRequestInfo};
    use crate::point::Precision;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn point() -> Point {
        let mut point = Point::new("logrus");
        point.time = Utc.with_ymd_and_hms(2018, 11, 14, 8, 9, 10).unwrap();
        point.precision = Precision::Seconds;
        point
    }

    fn batch(point: Point) -> BatchPoints {
        BatchPoints {
            points: vec![point],
            database: "logrus".into(),
            retention_policy: "default".into(),
        }
    }

    #[test]
    fn encodes_tags_fields_and_timestamp() {
        let mut p = point();
        p.tags.insert("level".into(), "warn".into());
        p.tags.insert("host".into(), "db 1".into());
        p.fields.insert("message".into(), "disk low".into());
        p.fields.insert("server".into(), "db1".into());

        let line = encode_batch(&batch(p)).unwrap();
        assert_eq!(
            line,
            "logrus,host=db\\ 1,level=warn message=\"disk low\",server=\"db1\" 1542182950\n"
        );
    }

    #[test]
    fn line_breaks_in_tags_stay_on_one_line() {
        let mut p = point();
        p.tags.insert("logger".into(), "a\nb\r\nc".into());
        p.fields.insert("message".into(), "m".into());

        let line = encode_batch(&batch(p)).unwrap();
        assert_eq!(line, "logrus,logger=a\\ b\\ \\ c message=\"m\" 1542182950\n");
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn escapes_special_characters() {
        let mut p = point();
        p.tags.insert("a,b".into(), "x=y".into());
        p.fields
            .insert("message".into(), r#"say "hi" \ bye"#.into());

        let line = encode_batch(&batch(p)).unwrap();
        assert_eq!(
            line,
            "logrus,a\\,b=x\\=y message=\"say \\\"hi\\\" \\\\ bye\" 1542182950\n"
        );
    }

    #[test]
    fn skips_empty_tag_values() {
        let mut p = point();
        p.tags.insert("empty".into(), String::new());
        p.fields.insert("message".into(), "m".into());

        let line = encode_batch(&batch(p)).unwrap();
        assert_eq!(line, "logrus message=\"m\" 1542182950\n");
    }

    #[test]
    fn map_and_request_fields_become_json_strings() {
        let mut extras = BTreeMap::new();
        extras.insert("logger".to_string(), FieldValue::from("diskmon"));
        let mut p = point();
        p.fields.insert("extras".into(), PointField::Map(extras));
        p.fields.insert(
            "http_request".into(),
            PointField::Request(HttpRequestInfo::new("GET", "/")),
        );

        let line = encode_batch(&batch(p)).unwrap();
        assert_eq!(
            line,
            "logrus extras=\"{\\\"logger\\\":\\\"diskmon\\\"}\",http_request=\"{\\\"method\\\":\\\"GET\\\",\\\"url\\\":\\\"/\\\"}\" 1542182950\n"
        );
    }

    #[test]
    fn numeric_extras_stay_inside_the_json_string() {
        let mut extras = BTreeMap::new();
        extras.insert("big".to_string(), FieldValue::from(u64::MAX));
        extras.insert("ratio".to_string(), FieldValue::from(f64::NAN));
        let mut p = point();
        p.fields.insert("extras".into(), PointField::Map(extras));

        let line = encode_batch(&batch(p)).unwrap();
        assert_eq!(
            line,
            "logrus extras=\"{\\\"big\\\":18446744073709551615,\\\"ratio\\\":null}\" 1542182950\n"
        );
    }

    #[test]
    fn rejects_points_without_fields() {
        let err = encode_batch(&batch(point())).unwrap_err();
        assert_eq!(
            err,
            EncodeError::NoFields {
                measurement: "logrus".into()
            }
        );
    }
}
