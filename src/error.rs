use std::fmt;

use crate::client::ClientError;

/// Error type returned by [`InfluxDbHook`](crate::hook::InfluxDbHook).
#[derive(thiserror::Error, Debug)]
pub enum HookError {
    /// URL parsing, client construction or the ping failed.
    #[error("cannot connect to InfluxDB: {0}")]
    Connection(#[source] ClientError),

    /// `CREATE DATABASE` failed.
    #[error("cannot create database `{database}`: {source}")]
    Provisioning {
        database: String,
        #[source]
        source: ClientError,
    },

    /// The existence check did not find the database.
    #[error("database `{database}` not found ({status})")]
    DatabaseNotFound { database: String, status: DatabaseStatus },

    /// The write call failed; the client error is passed through as-is.
    #[error("write to InfluxDB failed: {0}")]
    Write(#[source] ClientError),
}

/// Outcome of looking up the configured database in `SHOW DATABASES`.
///
/// Only [`DatabaseStatus::Found`] means the database exists; the other
/// variants record why the lookup did not find it.
#[derive(Debug)]
pub enum DatabaseStatus {
    Found,
    /// The first series was present but no row named the database.
    NotFound,
    /// The response carried no statement results.
    NoResults,
    /// The first result carried no series.
    NoSeries,
    QueryFailed(ClientError),
}

impl DatabaseStatus {
    pub fn is_found(&self) -> bool {
        matches!(self, DatabaseStatus::Found)
    }
}

impl fmt::Display for DatabaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseStatus::Found => f.write_str("found"),
            DatabaseStatus::NotFound => f.write_str("no database exists"),
            DatabaseStatus::NoResults => f.write_str("missing results from query response"),
            DatabaseStatus::NoSeries => f.write_str("missing series from query response"),
            DatabaseStatus::QueryFailed(e) => write!(f, "query failed: {}", e),
        }
    }
}
