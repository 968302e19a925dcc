use crate::event::{FieldValue, Level, LogEvent};
use crate::hook::InfluxDbHook;
use std::collections::BTreeMap;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use tokio::runtime::Handle;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Event targets never forwarded to InfluxDB.
///
/// Writing a point goes through these crates, and their own events would
/// otherwise come back through the layer as new points.
pub const DEFAULT_IGNORED_TARGETS: &[&str] = &[
    "tracing_influxdb_hook::hook",
    "tracing_influxdb_hook::http",
    "reqwest",
    "hyper",
    "h2",
    "rustls",
];

/// Error returned when building an [`InfluxDbLayer`].
#[derive(thiserror::Error, Debug)]
pub enum LayerError {
    #[error("InfluxDbLayer must be created inside a tokio runtime")]
    NoRuntime,
}

/// Counters shared between an [`InfluxDbLayer`] and its caller.
#[derive(Clone, Debug, Default)]
pub struct LayerStats {
    /// Total events seen by the layer (before filtering).
    pub total_events: Arc<AtomicU64>,
    /// Skipped because of their level or target.
    pub filtered_events: Arc<AtomicU64>,
    /// Written to InfluxDB.
    pub delivered_events: Arc<AtomicU64>,
    /// Write attempted and failed.
    pub failed_writes: Arc<AtomicU64>,
}

impl LayerStats {
    pub fn total(&self) -> u64 {
        self.total_events.load(Ordering::Relaxed)
    }

    pub fn filtered(&self) -> u64 {
        self.filtered_events.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered_events.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }
}

/// `tracing_subscriber` layer that turns every accepted event into a
/// [`LogEvent`] and fires it through an [`InfluxDbHook`].
///
/// Each event gets its own task on the tokio runtime the layer was built
/// in; there is no queue and no retry. Failed writes are printed to stderr
/// and counted in [`LayerStats::failed_writes`].
pub struct InfluxDbLayer {
    hook: Arc<InfluxDbHook>,
    runtime: Handle,
    ignored_targets: Vec<String>,
    stats: LayerStats,
}

impl InfluxDbLayer {
    /// Create a layer bound to the current tokio runtime.
    pub fn new(hook: Arc<InfluxDbHook>) -> Result<Self, LayerError> {
        let runtime = Handle::try_current().map_err(|_| LayerError::NoRuntime)?;
        Ok(Self::with_handle(hook, runtime))
    }

    /// Create a layer that spawns its writes on `runtime`.
    pub fn with_handle(hook: Arc<InfluxDbHook>, runtime: Handle) -> Self {
        Self {
            hook,
            runtime,
            ignored_targets: DEFAULT_IGNORED_TARGETS.iter().map(|t| t.to_string()).collect(),
            stats: LayerStats::default(),
        }
    }

    /// Also skip events whose target starts with `prefix`.
    pub fn ignore_target(mut self, prefix: impl Into<String>) -> Self {
        self.ignored_targets.push(prefix.into());
        self
    }

    pub fn stats(&self) -> LayerStats {
        self.stats.clone()
    }

    pub fn hook(&self) -> &Arc<InfluxDbHook> {
        &self.hook
    }

    fn is_ignored(&self, target: &str) -> bool {
        self.ignored_targets.iter().any(|prefix| target.starts_with(prefix.as_str()))
    }
}

impl<S> Layer<S> for InfluxDbLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.stats.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        let level = Level::from(*meta.level());
        if !self.hook.accepts(level) || self.is_ignored(meta.target()) {
            self.stats.filtered_events.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor { fields: &mut fields, message: &mut message };
        event.record(&mut visitor);

        let log_event = LogEvent {
            level,
            message: message.unwrap_or_default(),
            fields,
        };

        let hook = Arc::clone(&self.hook);
        let stats = self.stats.clone();
        self.runtime.spawn(async move {
            match hook.fire(&log_event).await {
                Ok(()) => {
                    stats.delivered_events.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    stats.failed_writes.fetch_add(1, Ordering::Relaxed);
                    eprintln!("failed to deliver log event to InfluxDB: {}", e);
                }
            }
        });
    }
}

use tracing::field::{Field, Visit};

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, FieldValue>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), FieldValue::Str(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), FieldValue::Int(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), FieldValue::UInt(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), FieldValue::Float(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), FieldValue::Bool(value));
    }

    // `tracing` hands the formatted message over as `fmt::Arguments` here.
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), FieldValue::Str(format!("{:?}", value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryClient;
    use crate::point::PointField;
    use std::time::Duration;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    async fn wait_for(stats: &LayerStats, n: u64) {
        for _ in 0..100 {
            if stats.delivered() + stats.failed() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {} fired events", n);
    }

    async fn setup(client: Arc<MemoryClient>) -> InfluxDbLayer {
        let hook = InfluxDbHook::with_client(Some(client), "logrus", None).await.unwrap();
        InfluxDbLayer::new(Arc::new(hook)).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn forwards_tracing_events_as_points() {
        let client = Arc::new(MemoryClient::new().with_database("logrus"));
        let layer = setup(client.clone()).await;
        let stats = layer.stats();

        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(logger = "diskmon", free_mb = 12u64, "disk low");
        });
        wait_for(&stats, 1).await;

        let writes = client.writes();
        assert_eq!(writes.len(), 1);
        let point = &writes[0].points[0];
        assert_eq!(point.tag("level"), Some("warn"));
        assert_eq!(point.tag("logger"), Some("diskmon"));
        assert_eq!(point.field("message"), Some(&PointField::Str("disk low".into())));

        let mut extras = BTreeMap::new();
        extras.insert("free_mb".to_string(), FieldValue::UInt(12));
        extras.insert("logger".to_string(), FieldValue::from("diskmon"));
        assert_eq!(point.field("extras"), Some(&PointField::Map(extras)));
        assert_eq!(stats.delivered(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn skips_trace_events_and_ignored_targets() {
        let client = Arc::new(MemoryClient::new().with_database("logrus"));
        let layer = setup(client.clone()).await.ignore_target("noisy");
        let stats = layer.stats();

        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::trace!("too chatty");
            tracing::error!(target: "noisy::module", "ignored");
            tracing::error!("kept");
        });
        wait_for(&stats, 1).await;

        assert_eq!(stats.total(), 3);
        assert_eq!(stats.filtered(), 2);
        assert_eq!(client.writes().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn counts_failed_writes() {
        let client = Arc::new(MemoryClient::new().with_database("logrus").fail_writes("down"));
        let layer = setup(client.clone()).await;
        let stats = layer.stats();

        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!("lost");
        });
        wait_for(&stats, 1).await;

        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.delivered(), 0);
    }

    #[test]
    fn new_outside_runtime_fails() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let hook = rt
            .block_on(InfluxDbHook::with_client(Some(Arc::new(MemoryClient::new())), "", None))
            .unwrap();
        assert!(matches!(
            InfluxDbLayer::new(Arc::new(hook)),
            Err(LayerError::NoRuntime)
        ));
    }
}
