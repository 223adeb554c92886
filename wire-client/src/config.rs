//! Connection options.
//!
//! Options can be built in code or loaded from a TOML file:
//!
//! ```toml
//! host = "db.internal"
//! port = 5432
//! timeout_ms = 5000
//! idle_timeout_ms = 60000
//!
//! [tls]
//! reject_unauthorized = true
//! ca = "-----BEGIN CERTIFICATE-----\n..."
//! ```

use std::path::Path;
use std::time::Duration;

use dbwire_core::{DatabaseKind, SslSpec};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, TransportError};
use crate::socket::SocketOptions;

/// Default connect timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Parameters for one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Host name or IP address of the database server.
    pub host: String,
    /// TCP port of the database server.
    pub port: u16,
    /// TLS settings (default: plain TCP).
    #[serde(default)]
    pub tls: SslSpec,
    /// Connect timeout in milliseconds (default: 10000).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Close the connection after this many milliseconds without inbound
    /// bytes (default: never).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_ms: Option<u64>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

impl ConnectOptions {
    /// Plain TCP options with the default timeout.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tls: SslSpec::default(),
            timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            idle_timeout_ms: None,
        }
    }

    /// Options for `kind` on its default port.
    ///
    /// Returns `None` for engines that are not reached over TCP.
    pub fn for_database(kind: DatabaseKind, host: impl Into<String>) -> Option<Self> {
        kind.default_port().map(|port| Self::new(host, port))
    }

    /// Set the TLS specification.
    pub fn with_tls(mut self, tls: impl Into<SslSpec>) -> Self {
        self.tls = tls.into();
        self
    }

    /// Set the connect timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Close the connection when no bytes arrive for `idle`.
    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle_timeout_ms = Some(u64::try_from(idle.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Connect timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Check host, port and timeout constraints.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.host.trim().is_empty() {
            return Err(TransportError::InvalidOptions("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(TransportError::InvalidOptions(
                "port must be between 1 and 65535".into(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(TransportError::InvalidOptions(
                "timeout_ms must be positive".into(),
            ));
        }
        if self.idle_timeout_ms == Some(0) {
            return Err(TransportError::InvalidOptions(
                "idle_timeout_ms must be positive when set".into(),
            ));
        }
        Ok(())
    }

    /// Address and timeout in the form the socket primitive consumes.
    pub fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            host: self.host.trim().to_string(),
            port: self.port,
            timeout: self.timeout(),
            idle_timeout: self.idle_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Parse options from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load options from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbwire_core::SslConfig;
    use std::io::Write;

    #[test]
    fn defaults_to_plain_tcp_and_ten_seconds() {
        let options = ConnectOptions::new("localhost", 5432);

        assert_eq!(options.tls, SslSpec::Flag(false));
        assert_eq!(options.timeout(), Duration::from_secs(10));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn rejects_empty_host() {
        let err = ConnectOptions::new("  ", 5432).validate().unwrap_err();
        assert!(matches!(err, TransportError::InvalidOptions(_)));
    }

    #[test]
    fn rejects_port_zero() {
        let err = ConnectOptions::new("db", 0).validate().unwrap_err();
        assert!(matches!(err, TransportError::InvalidOptions(_)));
    }

    #[test]
    fn rejects_zero_timeout() {
        let options = ConnectOptions::new("db", 5432).with_timeout(Duration::ZERO);
        assert!(matches!(
            options.validate(),
            Err(TransportError::InvalidOptions(_))
        ));
    }

    #[test]
    fn idle_timeout_is_optional() {
        let plain = ConnectOptions::new("db", 5432);
        assert_eq!(plain.socket_options().idle_timeout, None);

        let idle = plain.with_idle_timeout(Duration::from_secs(30));
        assert_eq!(idle.socket_options().idle_timeout, Some(Duration::from_secs(30)));

        let zero = ConnectOptions::new("db", 5432).with_idle_timeout(Duration::ZERO);
        assert!(matches!(
            zero.validate(),
            Err(TransportError::InvalidOptions(_))
        ));
    }

    #[test]
    fn database_default_ports() {
        let pg = ConnectOptions::for_database(DatabaseKind::Postgres, "pg").unwrap();
        assert_eq!(pg.port, 5432);
        assert!(ConnectOptions::for_database(DatabaseKind::Sqlite, "local").is_none());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
host = "db.internal"
port = 3306
timeout_ms = 2500
idle_timeout_ms = 60000
tls = true
"#;

        let options = ConnectOptions::from_toml_str(toml).unwrap();
        assert_eq!(options.host, "db.internal");
        assert_eq!(options.port, 3306);
        assert_eq!(options.timeout(), Duration::from_millis(2500));
        assert_eq!(options.idle_timeout_ms, Some(60_000));
        assert!(options.tls.is_enabled());
    }

    #[test]
    fn config_tls_table() {
        let toml = r#"
host = "db.internal"
port = 26257

[tls]
reject_unauthorized = false
"#;

        let options = ConnectOptions::from_toml_str(toml).unwrap();
        assert_eq!(
            options.tls,
            SslSpec::Config(SslConfig {
                enabled: true,
                reject_unauthorized: Some(false),
                ..SslConfig::default()
            })
        );
        assert_eq!(options.timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
    }

    #[test]
    fn config_missing_fields_use_defaults() {
        let options = ConnectOptions::from_toml_str("host = \"h\"\nport = 1").unwrap();
        assert_eq!(options, ConnectOptions::new("h", 1));
    }

    #[test]
    fn config_rejects_out_of_range_port() {
        assert!(ConnectOptions::from_toml_str("host = \"h\"\nport = 70000").is_err());
    }

    #[test]
    fn config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host = \"10.0.0.5\"\nport = 27017").unwrap();

        let options = ConnectOptions::from_file(file.path()).unwrap();
        assert_eq!(options.host, "10.0.0.5");
        assert_eq!(options.port, 27017);
    }

    #[test]
    fn config_missing_file_reports_path() {
        let err = ConnectOptions::from_file(Path::new("/nonexistent/dbwire.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
        assert!(err.to_string().contains("/nonexistent/dbwire.toml"));
    }
}
