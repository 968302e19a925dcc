use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use tracing_influxdb_hook::init::init_tracing;
use tracing_influxdb_hook::InfluxDbHook;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Credentials come from INFLUX_USER / INFLUX_PWD when set.
    let host = std::env::var("INFLUX_HOST").unwrap_or_else(|_| "localhost".to_string());

    let mut tags = BTreeMap::new();
    tags.insert("service".to_string(), "auth-service".to_string());

    let hook = InfluxDbHook::connect(&host, "", Some(tags)).await?;
    let stats = init_tracing(Arc::new(hook))?;

    info!("starting service");
    warn!(logger = "diskmon", server_name = "db1", "disk low");
    error!(user_id = 42, reason = "invalid password", "authentication failed");

    // Writes run on background tasks.
    sleep(Duration::from_secs(1)).await;
    println!("delivered {} events, {} failed", stats.delivered(), stats.failed());
    Ok(())
}
