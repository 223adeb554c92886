//! Socket primitive abstraction for dbwire.
//!
//! The transport client does not open sockets itself. It is handed a
//! [`SocketPrimitive`] at construction time, which lets tests substitute a
//! scripted [`MockSocket`] and lets embedders report that no socket
//! capability exists at all ([`UnavailableSocket`]).
//!
//! # Design
//!
//! A primitive is connection-oriented:
//! - `create_connection()` opens plain TCP
//! - `connect_tls()` opens TCP and negotiates TLS
//!
//! Both resolve once the connection is established and return an
//! [`OpenedSocket`]: a [`SocketHandle`] for writing and teardown, plus a
//! channel of [`SocketEvent`]s reporting inbound data, errors, close and
//! inactivity timeouts in the order they happened.

mod mock;
mod tcp;
#[cfg(feature = "tls")]
mod tls;

pub use mock::MockSocket;
pub use tcp::TcpSocket;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dbwire_core::TlsOptions;
use tokio::sync::{mpsc, watch};

use crate::error::TransportError;

/// Address and timing for one socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOptions {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Connect timeout.
    pub timeout: Duration,
    /// Report [`SocketEvent::Timeout`] when no bytes arrive for this long.
    pub idle_timeout: Option<Duration>,
}

/// Something that happened on an open socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Bytes arrived from the peer.
    Data(Bytes),
    /// The socket failed.
    Error(String),
    /// The peer closed the connection.
    Close,
    /// The socket was idle for too long.
    Timeout,
}

/// Write half and teardown of an open socket.
#[async_trait]
pub trait SocketHandle: Send + Sync {
    /// Write all of `data`, resolving once the primitive reports completion.
    async fn write(&self, data: &[u8]) -> std::io::Result<()>;

    /// Tear down the socket. Must be safe to call more than once.
    fn destroy(&self);
}

/// An established connection as reported by a [`SocketPrimitive`].
pub struct OpenedSocket {
    /// Handle for writes and teardown.
    pub handle: Arc<dyn SocketHandle>,
    /// Inbound events, in the order they occurred.
    pub events: mpsc::UnboundedReceiver<SocketEvent>,
}

impl std::fmt::Debug for OpenedSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedSocket").finish_non_exhaustive()
    }
}

/// Resolve once `flag` is (or becomes) `true`.
///
/// Also resolves if the sender is gone, since nothing can clear the flag then.
pub(crate) async fn signalled(mut flag: watch::Receiver<bool>) {
    let _ = flag.wait_for(|set| *set).await;
}

/// Capability to open TCP and TLS sockets.
///
/// Implementations handle the underlying connection mechanism
/// (tokio, mock, platform bridges, etc).
#[async_trait]
pub trait SocketPrimitive: Send + Sync {
    /// Open a plain TCP connection.
    async fn create_connection(&self, options: &SocketOptions)
        -> Result<OpenedSocket, TransportError>;

    /// Open a TCP connection and negotiate TLS on it.
    async fn connect_tls(
        &self,
        options: &SocketOptions,
        tls: &TlsOptions,
    ) -> Result<OpenedSocket, TransportError>;

    /// Whether `connect_tls` can succeed at all on this primitive.
    fn supports_tls(&self) -> bool {
        true
    }
}

/// Primitive for environments without socket support.
///
/// Every connect attempt fails with [`TransportError::Unavailable`].
#[derive(Debug, Clone)]
pub struct UnavailableSocket {
    reason: String,
}

impl UnavailableSocket {
    /// Create a primitive that reports `reason` on every connect.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SocketPrimitive for UnavailableSocket {
    async fn create_connection(
        &self,
        _options: &SocketOptions,
    ) -> Result<OpenedSocket, TransportError> {
        Err(TransportError::Unavailable(self.reason.clone()))
    }

    async fn connect_tls(
        &self,
        _options: &SocketOptions,
        _tls: &TlsOptions,
    ) -> Result<OpenedSocket, TransportError> {
        Err(TransportError::Unavailable(self.reason.clone()))
    }

    fn supports_tls(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> SocketOptions {
        SocketOptions {
            host: "localhost".into(),
            port: 5432,
            timeout: Duration::from_secs(1),
            idle_timeout: None,
        }
    }

    #[tokio::test]
    async fn signalled_sees_flag_set_before_waiting() {
        let (flag, _) = watch::channel(false);
        let early = flag.subscribe();
        flag.send_replace(true);

        tokio::time::timeout(Duration::from_secs(1), signalled(early))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unavailable_socket_reports_reason() {
        let primitive = UnavailableSocket::new("sockets disabled in sandbox");

        let plain = primitive.create_connection(&options()).await;
        assert!(matches!(
            plain,
            Err(TransportError::Unavailable(reason)) if reason == "sockets disabled in sandbox"
        ));

        let tls = primitive
            .connect_tls(&options(), &TlsOptions::default())
            .await;
        assert!(matches!(tls, Err(TransportError::Unavailable(_))));
        assert!(!primitive.supports_tls());
    }
}
