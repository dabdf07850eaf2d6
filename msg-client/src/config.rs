//! Session configuration.
//!
//! [`SessionConfig`] is the validated value a session is built from. It is
//! `Deserialize` so the embedding layer can parse it from whatever text format
//! it receives; parsing itself does not happen here.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// How callbacks are run once a result is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Each callback runs on its own blocking-pool thread, so a slow callback
    /// never delays another resolution.
    #[default]
    Spawned,
    /// Callbacks run directly on the delivery path. They must not block.
    Inline,
}

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Server address, `host:port` for the TCP transport.
    #[serde(alias = "addr")]
    pub server_address: String,
    /// Service name announced in the connectivity probe.
    #[serde(default)]
    pub service_name: String,
    /// Shared key the server may check during the connectivity probe.
    #[serde(default)]
    pub verify_key: Option<String>,
    /// Bound on establishing the connection, in milliseconds (default: 5000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Bound on login, directory and connectivity replies, in milliseconds
    /// (default: 10000).
    #[serde(default = "default_request_timeout_ms", alias = "request_out_time")]
    pub request_timeout_ms: u64,
    /// Default ping timeout, in milliseconds (default: 5000).
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
    /// Bound on a single send, in milliseconds (default: 5000).
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// How often overdue requests are expired, in milliseconds (default: 50).
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Callback dispatch mode (default: spawned).
    #[serde(default)]
    pub dispatch: DispatchMode,
}

// Default value functions
fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_ping_timeout_ms() -> u64 {
    5_000
}

fn default_send_timeout_ms() -> u64 {
    5_000
}

fn default_sweep_interval_ms() -> u64 {
    50
}

impl SessionConfig {
    /// Create a configuration for `server_address` with default timeouts.
    pub fn new(server_address: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
            service_name: String::new(),
            verify_key: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            dispatch: DispatchMode::default(),
        }
    }

    /// Set the service name.
    pub fn with_service_name(mut self, name: &str) -> Self {
        self.service_name = name.to_string();
        self
    }

    /// Set the verification key.
    pub fn with_verify_key(mut self, key: &str) -> Self {
        self.verify_key = Some(key.to_string());
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = as_millis(timeout);
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = as_millis(timeout);
        self
    }

    /// Set the default ping timeout.
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout_ms = as_millis(timeout);
        self
    }

    /// Set the send timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout_ms = as_millis(timeout);
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = as_millis(interval);
        self
    }

    /// Set the callback dispatch mode.
    pub fn with_dispatch(mut self, mode: DispatchMode) -> Self {
        self.dispatch = mode;
        self
    }

    /// Connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Default ping timeout.
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    /// Send timeout.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Sweep interval.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Check that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty address or any zero duration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_address.trim().is_empty() {
            return Err(ConfigError::EmptyAddress);
        }

        let durations = [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("ping_timeout_ms", self.ping_timeout_ms),
            ("send_timeout_ms", self.send_timeout_ms),
            ("sweep_interval_ms", self.sweep_interval_ms),
        ];
        for (field, value) in durations {
            if value == 0 {
                return Err(ConfigError::ZeroDuration { field });
            }
        }

        Ok(())
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No server address.
    #[error("server address is empty")]
    EmptyAddress,

    /// A timeout or interval is zero.
    #[error("{field} must be greater than zero")]
    ZeroDuration {
        /// Name of the offending field.
        field: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SessionConfig::new("127.0.0.1:7000");
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.sweep_interval(), Duration::from_millis(50));
        assert_eq!(config.dispatch, DispatchMode::Spawned);
    }

    #[test]
    fn empty_address_is_rejected() {
        let config = SessionConfig::new("  ");
        assert_eq!(config.validate(), Err(ConfigError::EmptyAddress));
    }

    #[test]
    fn zero_duration_is_rejected() {
        let config = SessionConfig::new("host:1").with_ping_timeout(Duration::ZERO);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration {
                field: "ping_timeout_ms"
            })
        );
    }

    #[test]
    fn builders_set_fields() {
        let config = SessionConfig::new("host:1")
            .with_service_name("chat")
            .with_verify_key("k")
            .with_request_timeout(Duration::from_millis(250))
            .with_dispatch(DispatchMode::Inline);

        assert_eq!(config.service_name, "chat");
        assert_eq!(config.verify_key.as_deref(), Some("k"));
        assert_eq!(config.request_timeout_ms, 250);
        assert_eq!(config.dispatch, DispatchMode::Inline);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"server_address": "10.0.0.1:9000"}"#).unwrap();

        assert_eq!(config, SessionConfig::new("10.0.0.1:9000"));
    }

    #[test]
    fn accepts_server_option_names() {
        let json = r#"{
            "addr": "chat.local:6000",
            "service_name": "im",
            "verify_key": "secret",
            "request_out_time": 3000,
            "dispatch": "inline"
        }"#;

        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.server_address, "chat.local:6000");
        assert_eq!(config.service_name, "im");
        assert_eq!(config.verify_key.as_deref(), Some("secret"));
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.dispatch, DispatchMode::Inline);
    }

    #[test]
    fn missing_address_fails_to_parse() {
        let result: Result<SessionConfig, _> = serde_json::from_str(r#"{"service_name": "im"}"#);
        assert!(result.is_err());
    }
}
