use async_trait::async_trait;
use serde::Deserialize;

use crate::line_protocol::EncodeError;
use crate::point::BatchPoints;

/// Error returned by an [`InfluxClient`] call.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("invalid InfluxDB url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[cfg(feature = "http")]
    #[error("http request to InfluxDB failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("InfluxDB responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("InfluxDB returned an error: {0}")]
    Response(String),

    #[error("failed to decode InfluxDB response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("failed to encode points: {0}")]
    Encode(#[from] EncodeError),

    #[error("{0}")]
    Other(String),
}

/// A query statement run against a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub command: String,
    pub database: String,
}

impl Query {
    pub fn new(command: impl Into<String>, database: impl Into<String>) -> Self {
        Query {
            command: command.into(),
            database: database.into(),
        }
    }
}

/// Body of a `/query` response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<QueryResult>,
    #[serde(default)]
    pub error: Option<String>,
}

impl QueryResponse {
    /// The top-level error, or else the first statement error.
    pub fn error(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.results.iter().find_map(|r| r.error.as_deref()))
    }

    /// Convert into the statement results, failing if the server reported
    /// an error anywhere in the body.
    pub fn into_results(self) -> Result<Vec<QueryResult>, ClientError> {
        match self.error() {
            Some(err) => Err(ClientError::Response(err.to_string())),
            None => Ok(self.results),
        }
    }
}

/// Result of one statement in a query.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub statement_id: Option<u64>,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

/// Minimal capability the hook needs from an InfluxDB client.
///
/// Implementations own transport, authentication and serialization. The
/// hook issues each call once and never retries, so implementations should
/// surface every failure rather than hide it.
#[async_trait]
pub trait InfluxClient: Send + Sync {
    /// Liveness check against the server.
    async fn ping(&self) -> Result<(), ClientError>;

    /// Run a single statement. Server-side statement errors are part of the
    /// returned [`QueryResponse`]; transport failures are `Err`.
    async fn query(&self, query: &Query) -> Result<QueryResponse, ClientError>;

    /// Write all points of `batch` into its database and retention policy.
    async fn write(&self, batch: &BatchPoints) -> Result<(), ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_show_databases_response() {
        let body = r#"{"results":[{"statement_id":0,"series":[{"name":"databases","columns":["name"],"values":[["_internal"],["logrus"]]}]}]}"#;
        let resp: QueryResponse = serde_json::from_str(body).unwrap();
        assert!(resp.error().is_none());
        let results = resp.into_results().unwrap();
        assert_eq!(results[0].series[0].values[1][0], "logrus");
    }

    #[test]
    fn statement_error_is_surfaced() {
        let body = r#"{"results":[{"statement_id":0,"error":"database not found: nope"}]}"#;
        let resp: QueryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.error(), Some("database not found: nope"));
        assert!(matches!(resp.into_results(), Err(ClientError::Response(_))));
    }

    #[test]
    fn top_level_error_wins() {
        let body = r#"{"error":"missing required parameter \"q\""}"#;
        let resp: QueryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.error(), Some("missing required parameter \"q\""));
    }
}
