use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::env;

/// Default InfluxDB hostname.
pub const DEFAULT_HOST: &str = "localhost";
/// Default InfluxDB HTTP port.
pub const DEFAULT_PORT: u16 = 8086;
/// Database used when none (or an empty name) is given.
pub const DEFAULT_DATABASE: &str = "logrus";
/// Retention policy every write targets unless configured otherwise.
pub const DEFAULT_RETENTION_POLICY: &str = "default";
/// Request timeout of the HTTP client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Connection and routing settings for [`InfluxDbHook`].
///
/// **Fields**
/// - `host` / `port`: where the InfluxDB HTTP API listens; the base URL is
///   `http://{host}:{port}`.
/// - `database`: target database, created on construction if missing.
/// - `tags`: default tags attached to every point.
/// - `username` / `password`: empty strings mean anonymous access.
/// - `timeout`: per-request timeout enforced by the HTTP client.
/// - `retention_policy`: retention policy named in every write.
///
/// [`InfluxDbHook`]: crate::hook::InfluxDbHook
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub tags: BTreeMap<String, String>,
    pub username: String,
    pub password: String,
    #[serde(with = "millis")]
    pub timeout: Duration,
    pub retention_policy: String,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: DEFAULT_DATABASE.to_string(),
            tags: BTreeMap::new(),
            username: String::new(),
            password: String::new(),
            timeout: DEFAULT_TIMEOUT,
            retention_policy: DEFAULT_RETENTION_POLICY.to_string(),
        }
    }
}

impl HookConfig {
    /// Defaults for `host`/`database`/`tags`, credentials taken from the
    /// environment.
    pub fn new(host: impl Into<String>, database: &str, tags: Option<BTreeMap<String, String>>) -> Self {
        let (username, password) = env::credentials_from_env();
        Self {
            host: host.into(),
            database: database_or_default(database),
            tags: tags.unwrap_or_default(),
            username,
            password,
            ..Self::default()
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retention_policy(mut self, rp: impl Into<String>) -> Self {
        self.retention_policy = rp.into();
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

pub(crate) fn database_or_default(database: &str) -> String {
    if database.is_empty() {
        DEFAULT_DATABASE.to_string()
    } else {
        database.to_string()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_database_falls_back_to_default() {
        let cfg = HookConfig::new("localhost", "", None);
        assert_eq!(cfg.database, "logrus");
        assert!(cfg.tags.is_empty());
        assert_eq!(cfg.port, 8086);
        assert_eq!(cfg.timeout, Duration::from_millis(100));
        assert_eq!(cfg.base_url(), "http://localhost:8086");
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: HookConfig =
            serde_json::from_str(r#"{"host":"influx","timeout":250,"tags":{"app":"api"}}"#).unwrap();
        assert_eq!(cfg.host, "influx");
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.database, DEFAULT_DATABASE);
        assert_eq!(cfg.timeout, Duration::from_millis(250));
        assert_eq!(cfg.tags.get("app").map(String::as_str), Some("api"));
        assert_eq!(cfg.retention_policy, "default");
    }
}
