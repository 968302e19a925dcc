use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Severity of a [`LogEvent`].
///
/// The string form (see `Display`) is what ends up in the `level` tag of
/// every point written by the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Panic,
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Panic => "panic",
            Level::Fatal => "fatal",
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        if level == tracing::Level::ERROR {
            Level::Error
        } else if level == tracing::Level::WARN {
            Level::Warn
        } else if level == tracing::Level::INFO {
            Level::Info
        } else if level == tracing::Level::DEBUG {
            Level::Debug
        } else {
            Level::Trace
        }
    }
}

/// Snapshot of an incoming HTTP request attached to a log event under the
/// `http_request` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequestInfo {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
}

impl HttpRequestInfo {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        HttpRequestInfo {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            remote_addr: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }
}

/// Value stored under a key of [`LogEvent::fields`].
///
/// Serializes untagged, so a map of these turns into a plain JSON object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Request(HttpRequestInfo),
    Json(serde_json::Value),
}

impl FieldValue {
    /// The string behind `Str` or a JSON string, `None` for anything else.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            FieldValue::Json(serde_json::Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_request(&self) -> Option<&HttpRequestInfo> {
        match self {
            FieldValue::Request(req) => Some(req),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::UInt(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<HttpRequestInfo> for FieldValue {
    fn from(value: HttpRequestInfo) -> Self {
        FieldValue::Request(value)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        FieldValue::Json(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// A single log event as handed to [`InfluxDbHook::fire`](crate::hook::InfluxDbHook::fire).
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl LogEvent {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        LogEvent {
            level,
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_strings_are_lowercase_names() {
        let got: Vec<String> = [
            Level::Panic,
            Level::Fatal,
            Level::Error,
            Level::Warn,
            Level::Info,
            Level::Debug,
        ]
        .iter()
        .map(|l| l.to_string())
        .collect();
        assert_eq!(got, ["panic", "fatal", "error", "warn", "info", "debug"]);
    }

    #[test]
    fn tracing_levels_map_one_to_one() {
        assert_eq!(Level::from(tracing::Level::ERROR), Level::Error);
        assert_eq!(Level::from(tracing::Level::WARN), Level::Warn);
        assert_eq!(Level::from(tracing::Level::TRACE), Level::Trace);
    }

    #[test]
    fn fields_serialize_as_plain_json() {
        let event = LogEvent::new(Level::Info, "hi")
            .with_field("user_id", 42i64)
            .with_field("ok", true)
            .with_field("missing", None::<String>)
            .with_field("http_request", HttpRequestInfo::new("GET", "/health"));

        let json = serde_json::to_value(&event.fields).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "http_request": {"method": "GET", "url": "/health"},
                "missing": null,
                "ok": true,
                "user_id": 42,
            })
        );
    }
}
