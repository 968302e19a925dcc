pub mod event;
pub mod point;
pub mod line_protocol;
pub mod client;
pub mod error;
pub mod config;
pub mod env;
pub mod hook;
pub mod layer;
pub mod memory;

#[cfg(feature = "http")]
pub mod http;

pub mod init;

pub use client::{ClientError, InfluxClient};
pub use config::HookConfig;
pub use error::{DatabaseStatus, HookError};
pub use event::{FieldValue, HttpRequestInfo, Level, LogEvent};
pub use hook::InfluxDbHook;
pub use layer::InfluxDbLayer;
