use std::sync::Arc;

use async_trait::async_trait;
use tracing_influxdb_hook::client::{ClientError, InfluxClient, Query, QueryResponse};
use tracing_influxdb_hook::line_protocol::encode_batch;
use tracing_influxdb_hook::point::BatchPoints;
use tracing_influxdb_hook::{HookConfig, InfluxDbHook, Level, LogEvent};

/// Example of plugging in your own transport by implementing
/// `InfluxClient`. This one prints the line protocol it would send and
/// pretends every database exists.
struct StdoutClient;

#[async_trait]
impl InfluxClient for StdoutClient {
    async fn ping(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<QueryResponse, ClientError> {
        println!("[query] {} (db={})", query.command, query.database);
        Ok(QueryResponse::default())
    }

    async fn write(&self, batch: &BatchPoints) -> Result<(), ClientError> {
        print!("[write db={} rp={}] {}", batch.database, batch.retention_policy, encode_batch(batch)?);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = HookConfig::default().tag("env", "dev");
    let hook = InfluxDbHook::connect_with_client(Arc::new(StdoutClient), config).await?;

    hook.fire(
        &LogEvent::new(Level::Warn, "disk low")
            .with_field("logger", "diskmon")
            .with_field("server_name", "db1"),
    )
    .await?;
    Ok(())
}
