use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::{ClientError, InfluxClient, Query, QueryResult};
use crate::config::{self, HookConfig};
use crate::error::{DatabaseStatus, HookError};
use crate::event::{FieldValue, Level, LogEvent};
use crate::point::{BatchPoints, Point, PointField, Precision};

/// Measurement name of every point written by the hook.
pub const MEASUREMENT: &str = "logrus";

/// Levels accepted by [`InfluxDbHook`], most severe first.
pub const LEVELS: [Level; 6] = [
    Level::Panic,
    Level::Fatal,
    Level::Error,
    Level::Warn,
    Level::Info,
    Level::Debug,
];

/// Delivers log events to an InfluxDB database, one point per event.
///
/// The default tags are fixed at construction. Each [`fire`](Self::fire)
/// works on its own copy, so a hook can be shared across tasks behind an
/// `Arc` without extra locking.
pub struct InfluxDbHook {
    client: Arc<dyn InfluxClient>,
    database: String,
    retention_policy: String,
    tags: BTreeMap<String, String>,
}

impl std::fmt::Debug for InfluxDbHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxDbHook")
            .field("database", &self.database)
            .field("retention_policy", &self.retention_policy)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

impl InfluxDbHook {
    /// Connect to `http://{host}:8086`, check it answers a ping and create
    /// `database` if it does not exist yet.
    ///
    /// **Parameters**
    /// - `host`: InfluxDB hostname.
    /// - `database`: target database; empty means `"logrus"`.
    /// - `tags`: default tags for every point; `None` means none.
    ///
    /// Credentials are read from `INFLUX_USER` / `INFLUX_PWD`.
    ///
    /// **Returns**
    /// - `Err(HookError::Connection)` if the URL, the client or the ping
    ///   fails.
    /// - `Err(HookError::Provisioning)` if the database had to be created
    ///   and `CREATE DATABASE` failed.
    #[cfg(feature = "http")]
    pub async fn connect(
        host: &str,
        database: &str,
        tags: Option<BTreeMap<String, String>>,
    ) -> Result<Self, HookError> {
        Self::from_config(HookConfig::new(host, database, tags)).await
    }

    /// Same as [`connect`](Self::connect) with every setting taken from
    /// `config`.
    #[cfg(feature = "http")]
    pub async fn from_config(config: HookConfig) -> Result<Self, HookError> {
        let client = crate::http::HttpClient::from_config(&config).map_err(HookError::Connection)?;
        Self::connect_with_client(Arc::new(client), config).await
    }

    /// Run the connect sequence (ping, then autocreate) against an
    /// arbitrary client. `config.host`, `port` and `timeout` are not used.
    pub async fn connect_with_client(
        client: Arc<dyn InfluxClient>,
        config: HookConfig,
    ) -> Result<Self, HookError> {
        debug!(database = %config.database, "pinging InfluxDB");
        client.ping().await.map_err(HookError::Connection)?;

        let hook = Self::from_parts(client, &config);
        hook.autocreate_database().await?;
        Ok(hook)
    }

    /// Wrap an already configured client. No ping and no autocreate: the
    /// caller is responsible for the database existing.
    ///
    /// With `client == None` this falls back to [`connect`](Self::connect)
    /// on `localhost`.
    pub async fn with_client(
        client: Option<Arc<dyn InfluxClient>>,
        database: &str,
        tags: Option<BTreeMap<String, String>>,
    ) -> Result<Self, HookError> {
        let database = config::database_or_default(database);
        let tags = tags.unwrap_or_default();

        match client {
            Some(client) => {
                let config = HookConfig {
                    database,
                    tags,
                    ..HookConfig::default()
                };
                Ok(Self::from_parts(client, &config))
            }
            #[cfg(feature = "http")]
            None => Self::connect(config::DEFAULT_HOST, &database, Some(tags)).await,
            #[cfg(not(feature = "http"))]
            None => Err(HookError::Connection(ClientError::Other(
                "no client given and the http feature is disabled".to_string(),
            ))),
        }
    }

    fn from_parts(client: Arc<dyn InfluxClient>, config: &HookConfig) -> Self {
        Self {
            client,
            database: config::database_or_default(&config.database),
            retention_policy: config.retention_policy.clone(),
            tags: config.tags.clone(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn retention_policy(&self) -> &str {
        &self.retention_policy
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn client(&self) -> &Arc<dyn InfluxClient> {
        &self.client
    }

    /// Levels this hook wants to receive.
    pub fn levels(&self) -> &'static [Level] {
        &LEVELS
    }

    pub fn accepts(&self, level: Level) -> bool {
        self.levels().contains(&level)
    }

    /// Build the point written for `event`, without writing it.
    pub fn point_for(&self, event: &LogEvent) -> Point {
        let mut tags = self.tags.clone();
        tags.insert("level".to_string(), event.level.to_string());
        if let Some(logger) = event.fields.get("logger").and_then(FieldValue::as_str) {
            tags.insert("logger".to_string(), logger.to_string());
        }
        if let Some(server_name) = event.fields.get("server_name").and_then(FieldValue::as_str) {
            tags.insert("server_name".to_string(), server_name.to_string());
        }

        let mut fields = BTreeMap::new();
        fields.insert("message".to_string(), PointField::Str(event.message.clone()));
        if let Some(req) = event.fields.get("http_request").and_then(FieldValue::as_request) {
            fields.insert("http_request".to_string(), PointField::Request(req.clone()));
        }
        // Keys already promoted above stay in here too.
        fields.insert("extras".to_string(), PointField::Map(event.fields.clone()));

        Point {
            measurement: MEASUREMENT.to_string(),
            tags,
            fields,
            time: Utc::now(),
            precision: Precision::Seconds,
        }
    }

    /// Write `event` as one point. The write is attempted once; its error,
    /// if any, is returned to the caller.
    pub async fn fire(&self, event: &LogEvent) -> Result<(), HookError> {
        let batch = BatchPoints {
            points: vec![self.point_for(event)],
            database: self.database.clone(),
            retention_policy: self.retention_policy.clone(),
        };

        self.client.write(&batch).await.map_err(|e| {
            warn!(database = %self.database, error = %e, "failed to write log point");
            HookError::Write(e)
        })
    }

    async fn query(&self, command: &str) -> Result<Vec<QueryResult>, ClientError> {
        self.client
            .query(&Query::new(command, &self.database))
            .await?
            .into_results()
    }

    /// Look the database up in `SHOW DATABASES`.
    pub async fn check_database(&self) -> DatabaseStatus {
        let results = match self.query("SHOW DATABASES").await {
            Ok(results) => results,
            Err(e) => return DatabaseStatus::QueryFailed(e),
        };
        let Some(first) = results.first() else {
            return DatabaseStatus::NoResults;
        };
        let Some(series) = first.series.first() else {
            return DatabaseStatus::NoSeries;
        };

        let found = series
            .values
            .iter()
            .flatten()
            .any(|cell| cell.as_str() == Some(self.database.as_str()));
        if found {
            DatabaseStatus::Found
        } else {
            DatabaseStatus::NotFound
        }
    }

    /// `Ok(())` if the database exists, `Err(HookError::DatabaseNotFound)`
    /// otherwise.
    pub async fn database_exists(&self) -> Result<(), HookError> {
        match self.check_database().await {
            DatabaseStatus::Found => Ok(()),
            status => Err(HookError::DatabaseNotFound {
                database: self.database.clone(),
                status,
            }),
        }
    }

    /// Create the database unless `SHOW DATABASES` lists it.
    ///
    /// A failed lookup also leads to `CREATE DATABASE`; only the create
    /// statement's failure is an error.
    pub async fn autocreate_database(&self) -> Result<(), HookError> {
        let status = self.check_database().await;
        if status.is_found() {
            debug!(database = %self.database, "database exists");
            return Ok(());
        }
        debug!(database = %self.database, %status, "database lookup did not find it");

        self.query(&create_database_statement(&self.database))
            .await
            .map_err(|source| HookError::Provisioning {
                database: self.database.clone(),
                source,
            })?;
        info!(database = %self.database, "created InfluxDB database");
        Ok(())
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `CREATE DATABASE` statement for `name`, double-quoting names InfluxQL
/// would not accept bare.
pub fn create_database_statement(name: &str) -> String {
    if is_plain_identifier(name) {
        format!("CREATE DATABASE {}", name)
    } else {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("CREATE DATABASE \"{}\"", escaped)
    }
}
