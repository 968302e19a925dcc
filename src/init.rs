use crate::hook::InfluxDbHook;
use crate::layer::{InfluxDbLayer, LayerError, LayerStats};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Options for the global subscriber installed by [`init_tracing_with_config`].
///
/// **Fields**
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   added next to [`InfluxDbLayer`] so events are also printed to the
///   console.
/// - `ignored_targets`: extra target prefixes the layer never forwards.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub enable_stdout: bool,
    pub ignored_targets: Vec<String>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            enable_stdout: true,
            ignored_targets: Vec::new(),
        }
    }
}

/// Error returned by [`init_tracing`] / [`init_tracing_with_config`].
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Layer(#[from] LayerError),

    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Install a [`Registry`] with an [`InfluxDbLayer`] for `hook` as the global
/// default subscriber.
///
/// Must be called from inside a tokio runtime; every accepted event is
/// written from a task on that runtime.
///
/// **Returns**
/// - the layer's [`LayerStats`] on success.
/// - `Err(InitError::Layer)` outside a runtime.
/// - `Err(InitError::AlreadyInstalled)` if a global subscriber exists.
pub fn init_tracing_with_config(
    hook: Arc<InfluxDbHook>,
    config: LayerConfig,
) -> Result<LayerStats, InitError> {
    let layer = config
        .ignored_targets
        .into_iter()
        .fold(InfluxDbLayer::new(hook)?, |layer, target| layer.ignore_target(target));
    let stats = layer.stats();

    // Two subscriber types, so two branches.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(stats)
}

/// Equivalent to [`init_tracing_with_config`] with [`LayerConfig::default`].
pub fn init_tracing(hook: Arc<InfluxDbHook>) -> Result<LayerStats, InitError> {
    init_tracing_with_config(hook, LayerConfig::default())
}
