use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

use crate::client::{ClientError, InfluxClient, Query, QueryResponse, QueryResult, Series};
use crate::point::BatchPoints;

/// A call observed by [`MemoryClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Ping,
    Query(Query),
    Write(BatchPoints),
}

/// How [`MemoryClient`] answers `SHOW DATABASES`.
#[derive(Debug, Clone)]
pub enum ShowDatabases {
    /// A single `databases` series listing the known databases.
    Listed,
    /// This exact response.
    Response(QueryResponse),
    /// A transport failure with this message.
    Fail(String),
}

#[derive(Debug)]
struct State {
    databases: Vec<String>,
    show_databases: ShowDatabases,
    ping_error: Option<String>,
    create_error: Option<String>,
    write_error: Option<String>,
    calls: Vec<Call>,
}

/// In-process [`InfluxClient`] for tests: keeps databases in memory and
/// records every call.
///
/// The call log is never trimmed, so this is meant for short-lived test
/// clients, not as a stand-in server for a running application.
#[derive(Debug)]
pub struct MemoryClient {
    state: Mutex<State>,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                databases: Vec::new(),
                show_databases: ShowDatabases::Listed,
                ping_error: None,
                create_error: None,
                write_error: None,
                calls: Vec::new(),
            }),
        }
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(self, name: impl Into<String>) -> Self {
        self.state().databases.push(name.into());
        self
    }

    pub fn show_databases(self, behavior: ShowDatabases) -> Self {
        self.state().show_databases = behavior;
        self
    }

    pub fn fail_ping(self, message: impl Into<String>) -> Self {
        self.state().ping_error = Some(message.into());
        self
    }

    pub fn fail_create(self, message: impl Into<String>) -> Self {
        self.state().create_error = Some(message.into());
        self
    }

    pub fn fail_writes(self, message: impl Into<String>) -> Self {
        self.state().write_error = Some(message.into());
        self
    }

    pub fn databases(&self) -> Vec<String> {
        self.state().databases.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn ping_count(&self) -> usize {
        self.state().calls.iter().filter(|c| matches!(c, Call::Ping)).count()
    }

    pub fn queries(&self) -> Vec<Query> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Query(q) => Some(q.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every `CREATE DATABASE` statement received, verbatim.
    pub fn create_statements(&self) -> Vec<String> {
        self.queries()
            .into_iter()
            .map(|q| q.command)
            .filter(|c| parse_create(c).is_some())
            .collect()
    }

    pub fn writes(&self) -> Vec<BatchPoints> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Write(b) => Some(b.clone()),
                _ => None,
            })
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn statement_error(message: &str) -> QueryResponse {
    QueryResponse {
        results: vec![QueryResult {
            statement_id: Some(0),
            series: Vec::new(),
            error: Some(message.to_string()),
        }],
        error: None,
    }
}

fn parse_create(command: &str) -> Option<String> {
    let trimmed = command.trim();
    let prefix = "CREATE DATABASE ";
    if !trimmed.get(..prefix.len())?.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let name = trimmed[prefix.len()..].trim();
    if name.is_empty() {
        return None;
    }
    let name = match name.strip_prefix('"').and_then(|n| n.strip_suffix('"')) {
        Some(quoted) => quoted.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => name.to_string(),
    };
    Some(name)
}

#[async_trait]
impl InfluxClient for MemoryClient {
    async fn ping(&self) -> Result<(), ClientError> {
        let mut state = self.state();
        state.calls.push(Call::Ping);
        match &state.ping_error {
            Some(msg) => Err(ClientError::Other(msg.clone())),
            None => Ok(()),
        }
    }

    async fn query(&self, query: &Query) -> Result<QueryResponse, ClientError> {
        let mut state = self.state();
        state.calls.push(Call::Query(query.clone()));

        if query.command.trim().eq_ignore_ascii_case("SHOW DATABASES") {
            return match &state.show_databases {
                ShowDatabases::Listed => Ok(QueryResponse {
                    results: vec![QueryResult {
                        statement_id: Some(0),
                        series: vec![Series {
                            name: "databases".to_string(),
                            columns: vec!["name".to_string()],
                            values: state
                                .databases
                                .iter()
                                .map(|db| vec![serde_json::Value::from(db.as_str())])
                                .collect(),
                        }],
                        error: None,
                    }],
                    error: None,
                }),
                ShowDatabases::Response(resp) => Ok(resp.clone()),
                ShowDatabases::Fail(msg) => Err(ClientError::Other(msg.clone())),
            };
        }

        if let Some(name) = parse_create(&query.command) {
            if let Some(msg) = &state.create_error {
                return Ok(statement_error(msg));
            }
            if !state.databases.contains(&name) {
                state.databases.push(name);
            }
        }

        Ok(QueryResponse {
            results: vec![QueryResult {
                statement_id: Some(0),
                ..QueryResult::default()
            }],
            error: None,
        })
    }

    async fn write(&self, batch: &BatchPoints) -> Result<(), ClientError> {
        let mut state = self.state();
        state.calls.push(Call::Write(batch.clone()));
        if let Some(msg) = &state.write_error {
            return Err(ClientError::Other(msg.clone()));
        }
        if !state.databases.contains(&batch.database) {
            return Err(ClientError::Status {
                status: 404,
                body: format!("{{\"error\":\"database not found: \\\"{}\\\"\"}}", batch.database),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_quoted_create() {
        assert_eq!(parse_create("CREATE DATABASE logrus"), Some("logrus".into()));
        assert_eq!(parse_create("create database \"my-db\""), Some("my-db".into()));
        assert_eq!(parse_create("SHOW DATABASES"), None);
        assert_eq!(parse_create("CREATE DATABASE "), None);
    }

    #[tokio::test]
    async fn create_then_show_lists_database() {
        let client = MemoryClient::new();
        client
            .query(&Query::new("CREATE DATABASE logs", "logs"))
            .await
            .unwrap();
        let resp = client
            .query(&Query::new("SHOW DATABASES", "logs"))
            .await
            .unwrap();
        assert_eq!(resp.results[0].series[0].values, vec![vec![serde_json::json!("logs")]]);
        assert_eq!(client.create_statements(), vec!["CREATE DATABASE logs".to_string()]);
    }
}
