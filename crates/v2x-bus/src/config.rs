// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bus configuration.
//!
//! Supports both programmatic (`BusConfig::new(..).with_*`) and file-based
//! (TOML) configuration. Every timing field defaults to the value the
//! transport layer has always used, so an empty file behaves like
//! `BusConfig::default()`.
//!
//! ```toml
//! endpoint = "broker.local:5672"
//! station_id = 101
//! inbound_address = "etsi"
//! outbound_address = "etsi"
//! filter = "NOT(station_id = 101) AND mid = 2049"
//!
//! [credentials]
//! mode = "plain"
//! username = "vehicle"
//! password = "secret"
//!
//! [reconnect]
//! max_backoff_ms = 2000
//!
//! [reassembly]
//! retention_ms = 60000
//! max_pending = 1024
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::message::StationId;

/// Default broker endpoint.
pub const DEFAULT_ENDPOINT: &str = "localhost:5672";
/// Default inbound/outbound address.
pub const DEFAULT_ADDRESS: &str = "etsi";

/// User name that selects anonymous authentication.
const ANONYMOUS_USER: &str = "anonymous";

/// Broker authentication mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Credentials {
    /// Authentication disabled.
    #[default]
    None,
    /// Anonymous authentication.
    Anonymous,
    /// User name and password.
    Plain { username: String, password: String },
}

impl Credentials {
    /// Map a user/password pair: `"anonymous"` selects anonymous
    /// authentication, an empty user disables authentication.
    pub fn from_user_password(username: &str, password: &str) -> Self {
        if username == ANONYMOUS_USER {
            Credentials::Anonymous
        } else if username.is_empty() {
            Credentials::None
        } else {
            Credentials::Plain {
                username: username.to_string(),
                password: password.to_string(),
            }
        }
    }
}

/// Network loop timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Cap of the exponential connect backoff (milliseconds).
    pub max_backoff_ms: u64,
    /// Idle timeout handed to the transport (milliseconds).
    pub idle_timeout_ms: u64,
    /// Pause before the loop restarts after a failure (milliseconds).
    pub restart_pause_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_backoff_ms: 2000,
            idle_timeout_ms: 5000,
            restart_pause_ms: 200,
        }
    }
}

impl ReconnectConfig {
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn restart_pause(&self) -> Duration {
        Duration::from_millis(self.restart_pause_ms)
    }
}

/// Segment reassembly settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblyConfig {
    /// Entries whose reference time is further than this from now, in
    /// either direction, are evicted (milliseconds).
    pub retention_ms: u64,
    /// Upper bound on incomplete segment sets; the oldest one is dropped
    /// to make room.
    pub max_pending: usize,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            retention_ms: 60_000,
            max_pending: crate::reassembly::DEFAULT_MAX_PENDING,
        }
    }
}

impl ReassemblyConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }
}

/// Connect-time configuration of a station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Broker endpoint (`host:port`).
    pub endpoint: String,

    /// Local ITS station id, stamped on every outbound envelope.
    pub station_id: StationId,

    /// Address to receive from; empty disables receiving.
    pub inbound_address: String,

    /// Address to send to; empty disables sending.
    pub outbound_address: String,

    pub credentials: Credentials,

    /// Broker-side selector applied to inbound traffic.
    pub filter: Option<String>,

    pub reconnect: ReconnectConfig,

    pub reassembly: ReassemblyConfig,

    /// Receive thread pause while the connection is being re-established (milliseconds).
    pub receive_retry_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            station_id: 0,
            inbound_address: DEFAULT_ADDRESS.to_string(),
            outbound_address: DEFAULT_ADDRESS.to_string(),
            credentials: Credentials::None,
            filter: None,
            reconnect: ReconnectConfig::default(),
            reassembly: ReassemblyConfig::default(),
            receive_retry_ms: 200,
        }
    }
}

impl BusConfig {
    /// Default configuration for `station_id`.
    pub fn new(station_id: StationId) -> Self {
        Self {
            station_id,
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file and validate it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string and validate it.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: BusConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_inbound_address(mut self, address: impl Into<String>) -> Self {
        self.inbound_address = address.into();
        self
    }

    pub fn with_outbound_address(mut self, address: impl Into<String>) -> Self {
        self.outbound_address = address.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the broker-side selector; an empty string clears it.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        let filter = filter.into();
        self.filter = if filter.trim().is_empty() {
            None
        } else {
            Some(filter)
        };
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.reassembly.retention_ms = u64::try_from(retention.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_receive_retry(mut self, pause: Duration) -> Self {
        self.receive_retry_ms = u64::try_from(pause.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn receive_retry(&self) -> Duration {
        Duration::from_millis(self.receive_retry_ms)
    }

    /// Selector to pass to the broker, `None` when absent or blank.
    pub fn effective_filter(&self) -> Option<&str> {
        self.filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint is empty".into()));
        }
        match self.endpoint.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "endpoint '{}' is not host:port",
                    self.endpoint
                )))
            }
        }
        if self.inbound_address.is_empty() && self.outbound_address.is_empty() {
            return Err(ConfigError::Invalid(
                "inbound and outbound addresses are both empty".into(),
            ));
        }
        if let Credentials::Plain { username, .. } = &self.credentials {
            if username.is_empty() {
                return Err(ConfigError::Invalid("plain credentials need a username".into()));
            }
        }
        let timings = [
            ("reconnect.max_backoff_ms", self.reconnect.max_backoff_ms),
            ("reconnect.idle_timeout_ms", self.reconnect.idle_timeout_ms),
            ("reconnect.restart_pause_ms", self.reconnect.restart_pause_ms),
            ("reassembly.retention_ms", self.reassembly.retention_ms),
            ("receive_retry_ms", self.receive_retry_ms),
        ];
        for (name, value) in timings {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
            }
        }
        if self.reassembly.max_pending == 0 {
            return Err(ConfigError::Invalid("reassembly.max_pending must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = BusConfig::default();
        assert_eq!(config.endpoint, "localhost:5672");
        assert_eq!(config.reconnect.restart_pause(), Duration::from_millis(200));
        assert_eq!(config.reconnect.max_backoff(), Duration::from_secs(2));
        assert_eq!(config.reconnect.idle_timeout(), Duration::from_secs(5));
        assert_eq!(config.reassembly.retention(), Duration::from_secs(60));
        assert_eq!(config.receive_retry(), Duration::from_millis(200));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_credentials_mapping() {
        assert_eq!(
            Credentials::from_user_password("anonymous", ""),
            Credentials::Anonymous
        );
        assert_eq!(Credentials::from_user_password("", "x"), Credentials::None);
        assert_eq!(
            Credentials::from_user_password("obu", "pw"),
            Credentials::Plain {
                username: "obu".into(),
                password: "pw".into()
            }
        );
    }

    #[test]
    fn test_blank_filter_is_absent() {
        let config = BusConfig::new(1).with_filter("   ");
        assert_eq!(config.effective_filter(), None);
        let config = BusConfig::new(1).with_filter("mid = 2049");
        assert_eq!(config.effective_filter(), Some("mid = 2049"));
    }

    #[test]
    fn test_validate_rejects() {
        assert!(BusConfig::new(1).with_endpoint("").validate().is_err());
        assert!(BusConfig::new(1).with_endpoint("broker").validate().is_err());
        assert!(BusConfig::new(1).with_endpoint(":5672").validate().is_err());
        assert!(BusConfig::new(1)
            .with_inbound_address("")
            .with_outbound_address("")
            .validate()
            .is_err());
        assert!(BusConfig::new(1)
            .with_retention(Duration::ZERO)
            .validate()
            .is_err());
        assert!(BusConfig::new(1)
            .with_credentials(Credentials::Plain {
                username: String::new(),
                password: "x".into()
            })
            .validate()
            .is_err());

        let mut config = BusConfig::new(1);
        config.reassembly.max_pending = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
endpoint = "10.0.0.5:5672"
station_id = 101
outbound_address = ""
filter = "NOT(station_id = 101)"

[credentials]
mode = "plain"
username = "vehicle"
password = "secret"

[reassembly]
retention_ms = 30000
max_pending = 16
"#
        )
        .unwrap();

        let config = BusConfig::from_file(file.path()).unwrap();
        assert_eq!(config.endpoint, "10.0.0.5:5672");
        assert_eq!(config.station_id, 101);
        assert_eq!(config.inbound_address, "etsi");
        assert!(config.outbound_address.is_empty());
        assert_eq!(config.effective_filter(), Some("NOT(station_id = 101)"));
        assert!(matches!(config.credentials, Credentials::Plain { .. }));
        assert_eq!(config.reassembly.retention(), Duration::from_secs(30));
        assert_eq!(config.reassembly.max_pending, 16);
        // Untouched sections keep defaults
        assert_eq!(config.reconnect, ReconnectConfig::default());
    }

    #[test]
    fn test_from_toml_invalid() {
        assert!(matches!(
            BusConfig::from_toml("endpoint = 5"),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            BusConfig::from_toml("receive_retry_ms = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BusConfig::from_file("/nonexistent/v2x-bus.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
