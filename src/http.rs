use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;

use crate::client::{ClientError, InfluxClient, Query, QueryResponse};
use crate::config::HookConfig;
use crate::line_protocol;
use crate::point::BatchPoints;

/// [`InfluxClient`] talking to the InfluxDB 1.x HTTP API.
///
/// Uses `/ping`, `/query` and `/write` with line protocol bodies.
/// Credentials, when set, are passed as the `u`/`p` query parameters.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
}

impl HttpClient {
    /// Build a client for `base_url`, e.g. "http://127.0.0.1:8086".
    ///
    /// **Returns**
    /// - `Err(ClientError::InvalidUrl)` if `base_url` does not parse.
    /// - `Err(ClientError::Http)` if the underlying client cannot be built.
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            username: username.into(),
            password: password.into(),
        })
    }

    pub fn from_config(config: &HookConfig) -> Result<Self, ClientError> {
        Self::new(
            &config.base_url(),
            config.username.clone(),
            config.password.clone(),
            config.timeout,
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str, pairs: &[(&str, &str)]) -> String {
        let mut query = String::new();
        let creds = [("u", self.username.as_str()), ("p", self.password.as_str())];
        let creds: &[(&str, &str)] = if self.username.is_empty() { &[] } else { &creds };

        for (key, value) in pairs.iter().chain(creds) {
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str(key);
            query.push('=');
            query.push_str(&urlencoding::encode(value));
        }

        let base = self.base_url.as_str().trim_end_matches('/');
        if query.is_empty() {
            format!("{}/{}", base, path)
        } else {
            format!("{}/{}?{}", base, path, query)
        }
    }
}

/// `SELECT` and `SHOW` may use GET; every other statement has to be POSTed
/// to `/query`.
fn is_read_only(command: &str) -> bool {
    let verb = command.split_whitespace().next().unwrap_or("");
    verb.eq_ignore_ascii_case("SELECT") || verb.eq_ignore_ascii_case("SHOW")
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
        Err(ClientError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl InfluxClient for HttpClient {
    async fn ping(&self) -> Result<(), ClientError> {
        let resp = self.client.get(self.endpoint("ping", &[])).send().await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<QueryResponse, ClientError> {
        let url = self.endpoint("query", &[("q", query.command.as_str()), ("db", query.database.as_str())]);
        let request = if is_read_only(&query.command) {
            self.client.get(&url)
        } else {
            self.client.post(&url)
        };
        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        // Statement errors come back as 400 with a JSON body worth keeping.
        match serde_json::from_str::<QueryResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => Err(ClientError::Status {
                status: status.as_u16(),
                body,
            }),
            Err(e) => Err(ClientError::Decode(e)),
        }
    }

    async fn write(&self, batch: &BatchPoints) -> Result<(), ClientError> {
        let body = line_protocol::encode_batch(batch)?;
        let url = self.endpoint(
            "write",
            &[
                ("db", batch.database.as_str()),
                ("rp", batch.retention_policy.as_str()),
                ("precision", batch.precision().as_str()),
            ],
        );
        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{INFLUX_PWD_ENV, INFLUX_USER_ENV};
    use serial_test::serial;

    #[test]
    fn endpoint_encodes_query_and_credentials() {
        let client =
            HttpClient::new("http://localhost:8086", "admin", "p@ss word", Duration::from_millis(100)).unwrap();
        assert_eq!(
            client.endpoint("query", &[("q", "SHOW DATABASES"), ("db", "logrus")]),
            "http://localhost:8086/query?q=SHOW%20DATABASES&db=logrus&u=admin&p=p%40ss%20word"
        );
    }

    #[test]
    fn anonymous_endpoint_has_no_credentials() {
        let client = HttpClient::new("http://localhost:8086/", "", "", Duration::from_millis(100)).unwrap();
        assert_eq!(client.endpoint("ping", &[]), "http://localhost:8086/ping");
    }

    #[test]
    #[serial]
    fn credentials_from_env_reach_every_request() {
        std::env::set_var(INFLUX_USER_ENV, "writer");
        std::env::set_var(INFLUX_PWD_ENV, "s3cret");
        let cfg = HookConfig::new("localhost", "", None);
        std::env::remove_var(INFLUX_USER_ENV);
        std::env::remove_var(INFLUX_PWD_ENV);

        assert_eq!(cfg.username, "writer");
        assert_eq!(cfg.password, "s3cret");
        let client = HttpClient::from_config(&cfg).unwrap();
        assert_eq!(client.endpoint("ping", &[]), "http://localhost:8086/ping?u=writer&p=s3cret");
    }

    #[test]
    #[serial]
    fn unset_env_means_anonymous() {
        std::env::remove_var(INFLUX_USER_ENV);
        std::env::remove_var(INFLUX_PWD_ENV);
        let cfg = HookConfig::new("localhost", "", None);

        assert!(cfg.username.is_empty());
        assert!(cfg.password.is_empty());
        let client = HttpClient::from_config(&cfg).unwrap();
        assert_eq!(client.endpoint("ping", &[]), "http://localhost:8086/ping");
    }

    #[test]
    fn only_select_and_show_are_read_only() {
        assert!(is_read_only("SHOW DATABASES"));
        assert!(is_read_only("  select * from logrus"));
        assert!(!is_read_only("CREATE DATABASE logrus"));
        assert!(!is_read_only("DROP DATABASE logrus"));
        assert!(!is_read_only(""));
    }

    #[test]
    fn invalid_url_is_rejected() {
        let err = HttpClient::new("http://exa mple:8086", "", "", Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl(_)));
    }
}
