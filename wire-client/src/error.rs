//! Error types for dbwire-client.

use std::path::PathBuf;

use dbwire_core::Rejection;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket primitive cannot be used in this runtime environment.
    #[error("transport unavailable in this environment: {0}")]
    Unavailable(String),

    /// TLS was requested but the socket primitive cannot negotiate it.
    #[error("TLS connections are not supported on this build")]
    TlsUnsupported,

    /// Connect options failed validation.
    #[error("invalid connect options: {0}")]
    InvalidOptions(String),

    /// `connect` was already called on this client.
    #[error("transport already used; create a new client to reconnect")]
    AlreadyStarted,

    /// Connection could not be established.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// Connection was not established before the deadline.
    #[error("connection timeout")]
    ConnectTimeout,

    /// TLS material could not be loaded or the handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Writing to the socket failed.
    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// Socket reported an error after the connection was established.
    #[error("socket error: {0}")]
    Socket(String),

    /// Connection was closed by the caller or the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation requires an established connection.
    #[error("not connected")]
    NotConnected,

    /// A bounded read did not complete in time.
    #[error("receive timeout")]
    ReceiveTimeout,
}

impl TransportError {
    /// Check if this error reports a planned or remote close rather than a failure.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

impl From<&Rejection> for TransportError {
    fn from(rejection: &Rejection) -> Self {
        match rejection {
            Rejection::Closed => Self::ConnectionClosed,
            Rejection::Failed(error) => Self::Socket(error.clone()),
        }
    }
}

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
