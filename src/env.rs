//! Environment variable names recognized by [`InfluxDbHook::connect`].
//!
//! Only the credentials are taken from the environment; everything else is
//! passed explicitly or through [`HookConfig`].
//!
//! [`InfluxDbHook::connect`]: crate::hook::InfluxDbHook::connect
//! [`HookConfig`]: crate::config::HookConfig

/// InfluxDB user name. Unset means anonymous.
pub const INFLUX_USER_ENV: &str = "INFLUX_USER";

/// InfluxDB password.
pub const INFLUX_PWD_ENV: &str = "INFLUX_PWD";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Credentials from [`INFLUX_USER_ENV`] / [`INFLUX_PWD_ENV`], empty strings
/// when unset.
pub fn credentials_from_env() -> (String, String) {
    (env_or(INFLUX_USER_ENV, ""), env_or(INFLUX_PWD_ENV, ""))
}
