//! TLS negotiation policy.
//!
//! Callers describe TLS either as a plain flag or as a structured table;
//! [`SslSpec::to_tls_options`] turns that into the concrete [`TlsOptions`]
//! the socket primitive consumes. Structured fields are only forwarded when
//! TLS is enabled, and empty PEM strings count as absent.

use serde::{Deserialize, Serialize};

/// TLS settings as supplied by the caller.
///
/// Deserializes from either `tls = true` or a `[tls]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SslSpec {
    /// `true` for TLS with default trust, `false` for plain TCP.
    Flag(bool),
    /// Structured TLS configuration.
    Config(SslConfig),
}

impl Default for SslSpec {
    fn default() -> Self {
        Self::Flag(false)
    }
}

/// Structured TLS configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslConfig {
    /// Whether to negotiate TLS at all (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Verify the server certificate chain (default when unset: true).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_unauthorized: Option<bool>,
    /// PEM-encoded CA certificates to trust instead of the default roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
    /// PEM-encoded client certificate chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    /// PEM-encoded client private key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for SslConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            reject_unauthorized: None,
            ca: None,
            cert: None,
            key: None,
        }
    }
}

impl std::fmt::Debug for SslConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SslConfig")
            .field("enabled", &self.enabled)
            .field("reject_unauthorized", &self.reject_unauthorized)
            .field("ca", &self.ca.as_ref().map(|ca| format!("[{} bytes]", ca.len())))
            .field("cert", &self.cert.as_ref().map(|c| format!("[{} bytes]", c.len())))
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl SslSpec {
    /// Interpret a `sslmode` / `ssl` connection-string value.
    ///
    /// `disable`, `false`, `0`, `no` and `off` mean plain TCP; any other
    /// non-empty value requests TLS. An empty value yields `None`.
    pub fn from_ssl_mode(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return None;
        }
        let plain = matches!(normalized.as_str(), "disable" | "false" | "0" | "no" | "off");
        Some(Self::Flag(!plain))
    }

    /// Check if this spec asks for TLS.
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Flag(enabled) => *enabled,
            Self::Config(config) => config.enabled,
        }
    }

    /// Resolve the concrete options for one connection attempt.
    pub fn to_tls_options(&self) -> TlsOptions {
        match self {
            Self::Flag(enabled) => TlsOptions {
                enabled: *enabled,
                ..TlsOptions::default()
            },
            Self::Config(config) if config.enabled => TlsOptions {
                enabled: true,
                reject_unauthorized: config.reject_unauthorized,
                ca: non_empty(&config.ca),
                cert: non_empty(&config.cert),
                key: non_empty(&config.key),
            },
            Self::Config(_) => TlsOptions::default(),
        }
    }
}

impl From<bool> for SslSpec {
    fn from(enabled: bool) -> Self {
        Self::Flag(enabled)
    }
}

impl From<SslConfig> for SslSpec {
    fn from(config: SslConfig) -> Self {
        Self::Config(config)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

/// Concrete TLS options handed to the socket primitive.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct TlsOptions {
    /// Negotiate TLS (`false` means plain TCP).
    pub enabled: bool,
    /// Verify the server certificate; `None` means the default (verify).
    pub reject_unauthorized: Option<bool>,
    /// PEM-encoded CA certificates.
    pub ca: Option<String>,
    /// PEM-encoded client certificate chain.
    pub cert: Option<String>,
    /// PEM-encoded client private key.
    pub key: Option<String>,
}

impl TlsOptions {
    /// Whether the server certificate must be verified.
    pub fn verifies_peer(&self) -> bool {
        self.reject_unauthorized.unwrap_or(true)
    }

    /// Client certificate and key, when both are present.
    pub fn client_auth(&self) -> Option<(&str, &str)> {
        match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => Some((cert.as_str(), key.as_str())),
            _ => None,
        }
    }
}

impl std::fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsOptions")
            .field("enabled", &self.enabled)
            .field("reject_unauthorized", &self.reject_unauthorized)
            .field("ca", &self.ca.is_some())
            .field("cert", &self.cert.is_some())
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_config(enabled: bool) -> SslConfig {
        SslConfig {
            enabled,
            reject_unauthorized: Some(false),
            ca: Some("-----BEGIN CERTIFICATE-----".into()),
            cert: Some("client-cert".into()),
            key: Some("client-key".into()),
        }
    }

    #[test]
    fn flag_maps_directly() {
        assert!(SslSpec::Flag(true).to_tls_options().enabled);
        assert_eq!(SslSpec::Flag(false).to_tls_options(), TlsOptions::default());
    }

    #[test]
    fn enabled_config_forwards_material() {
        let options = SslSpec::Config(full_config(true)).to_tls_options();

        assert!(options.enabled);
        assert!(!options.verifies_peer());
        assert_eq!(options.ca.as_deref(), Some("-----BEGIN CERTIFICATE-----"));
        assert_eq!(options.client_auth(), Some(("client-cert", "client-key")));
    }

    #[test]
    fn disabled_config_forwards_nothing() {
        let options = SslSpec::Config(full_config(false)).to_tls_options();
        assert_eq!(options, TlsOptions::default());
    }

    #[test]
    fn empty_strings_are_dropped() {
        let config = SslConfig {
            enabled: true,
            ca: Some(String::new()),
            cert: Some("cert".into()),
            key: Some(String::new()),
            ..SslConfig::default()
        };
        let options = SslSpec::Config(config).to_tls_options();

        assert!(options.ca.is_none());
        assert!(options.client_auth().is_none());
        assert!(options.verifies_peer());
    }

    #[test]
    fn default_config_enables_tls() {
        assert!(SslSpec::from(SslConfig::default()).is_enabled());
    }

    #[test]
    fn ssl_mode_values() {
        assert_eq!(SslSpec::from_ssl_mode("disable"), Some(SslSpec::Flag(false)));
        assert_eq!(SslSpec::from_ssl_mode("OFF"), Some(SslSpec::Flag(false)));
        assert_eq!(SslSpec::from_ssl_mode("require"), Some(SslSpec::Flag(true)));
        assert_eq!(SslSpec::from_ssl_mode("verify-full"), Some(SslSpec::Flag(true)));
        assert_eq!(SslSpec::from_ssl_mode("  "), None);
    }

    #[test]
    fn deserializes_flag_or_table() {
        #[derive(Deserialize)]
        struct Wrapper {
            tls: SslSpec,
        }

        let flag: Wrapper = toml::from_str("tls = true").unwrap();
        assert_eq!(flag.tls, SslSpec::Flag(true));

        let table: Wrapper = toml::from_str(
            r#"
[tls]
reject_unauthorized = false
ca = "pem"
"#,
        )
        .unwrap();
        assert!(table.tls.is_enabled());
        let options = table.tls.to_tls_options();
        assert_eq!(options.ca.as_deref(), Some("pem"));
        assert!(!options.verifies_peer());
    }

    #[test]
    fn debug_redacts_key() {
        let options = SslSpec::Config(full_config(true)).to_tls_options();
        let rendered = format!("{options:?}");

        assert!(!rendered.contains("client-key"));
        assert!(rendered.contains("REDACTED"));
    }
}
