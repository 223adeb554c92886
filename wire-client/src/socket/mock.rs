//! Mock socket primitive for testing.
//!
//! Allows scripting inbound events and capturing written bytes for verification.

use super::{OpenedSocket, SocketEvent, SocketHandle, SocketOptions, SocketPrimitive};
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use dbwire_core::TlsOptions;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Mock socket primitive for testing.
///
/// Clones share state, so a test can keep one clone for scripting while the
/// client owns another.
#[derive(Debug, Default, Clone)]
pub struct MockSocket {
    inner: Arc<Mutex<MockSocketInner>>,
}

#[derive(Debug, Default)]
struct MockSocketInner {
    connect_count: usize,
    last_options: Option<SocketOptions>,
    last_tls: Option<TlsOptions>,
    written: Vec<Vec<u8>>,
    events: Option<mpsc::UnboundedSender<SocketEvent>>,
    destroyed: bool,
    tls_unsupported: bool,
    hang_connect: bool,
    fail_next_connect: Option<String>,
    fail_next_write: Option<String>,
}

impl MockSocket {
    /// Create a new mock primitive.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockSocketInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Report that this primitive cannot negotiate TLS.
    pub fn without_tls(self) -> Self {
        self.lock().tls_unsupported = true;
        self
    }

    /// Cause the next connect to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        self.lock().fail_next_connect = Some(error.to_string());
    }

    /// Make connects never complete (for timeout tests).
    pub fn hang_connect(&self) {
        self.lock().hang_connect = true;
    }

    /// Cause the next write to fail with the given error.
    pub fn fail_next_write(&self, error: &str) {
        self.lock().fail_next_write = Some(error.to_string());
    }

    /// Deliver inbound bytes. Returns false if no socket is open.
    pub fn push_data(&self, data: impl AsRef<[u8]>) -> bool {
        self.emit(SocketEvent::Data(Bytes::copy_from_slice(data.as_ref())))
    }

    /// Report a socket error.
    pub fn emit_error(&self, error: &str) -> bool {
        self.emit(SocketEvent::Error(error.to_string()))
    }

    /// Report a remote close.
    pub fn emit_close(&self) -> bool {
        self.emit(SocketEvent::Close)
    }

    /// Report an inactivity timeout.
    pub fn emit_timeout(&self) -> bool {
        self.emit(SocketEvent::Timeout)
    }

    fn emit(&self, event: SocketEvent) -> bool {
        let inner = self.lock();
        match &inner.events {
            Some(events) if !inner.destroyed => events.send(event).is_ok(),
            _ => false,
        }
    }

    /// All writes, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.lock().written.clone()
    }

    /// All written bytes concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.lock().written.concat()
    }

    /// Number of connect attempts made.
    pub fn connect_count(&self) -> usize {
        self.lock().connect_count
    }

    /// Options of the last connect attempt.
    pub fn last_options(&self) -> Option<SocketOptions> {
        self.lock().last_options.clone()
    }

    /// TLS options of the last connect attempt, if it used TLS.
    pub fn last_tls(&self) -> Option<TlsOptions> {
        self.lock().last_tls.clone()
    }

    /// Check if the open socket was destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    async fn open(
        &self,
        options: &SocketOptions,
        tls: Option<&TlsOptions>,
    ) -> Result<OpenedSocket, TransportError> {
        let hang = {
            let mut inner = self.lock();
            inner.connect_count += 1;
            inner.last_options = Some(options.clone());
            inner.last_tls = tls.cloned();

            // Check for forced failure
            if let Some(error) = inner.fail_next_connect.take() {
                return Err(TransportError::ConnectFailed(error));
            }
            inner.hang_connect
        };

        if hang {
            std::future::pending::<()>().await;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut inner = self.lock();
            inner.events = Some(tx);
            inner.destroyed = false;
        }

        Ok(OpenedSocket {
            handle: Arc::new(MockHandle {
                inner: Arc::clone(&self.inner),
            }),
            events: rx,
        })
    }
}

#[async_trait]
impl SocketPrimitive for MockSocket {
    async fn create_connection(
        &self,
        options: &SocketOptions,
    ) -> Result<OpenedSocket, TransportError> {
        self.open(options, None).await
    }

    async fn connect_tls(
        &self,
        options: &SocketOptions,
        tls: &TlsOptions,
    ) -> Result<OpenedSocket, TransportError> {
        if self.lock().tls_unsupported {
            return Err(TransportError::TlsUnsupported);
        }
        self.open(options, Some(tls)).await
    }

    fn supports_tls(&self) -> bool {
        !self.lock().tls_unsupported
    }
}

struct MockHandle {
    inner: Arc<Mutex<MockSocketInner>>,
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, MockSocketInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SocketHandle for MockHandle {
    async fn write(&self, data: &[u8]) -> std::io::Result<()> {
        let mut inner = self.lock();

        if inner.destroyed {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "socket destroyed",
            ));
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_write.take() {
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, error));
        }

        inner.written.push(data.to_vec());
        Ok(())
    }

    fn destroy(&self) {
        let mut inner = self.lock();
        inner.destroyed = true;
        inner.events = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn options() -> SocketOptions {
        SocketOptions {
            host: "db".into(),
            port: 5432,
            timeout: Duration::from_secs(1),
            idle_timeout: None,
        }
    }

    #[tokio::test]
    async fn records_connect_attempts() {
        let mock = MockSocket::new();
        let tls = TlsOptions {
            enabled: true,
            ..TlsOptions::default()
        };

        mock.create_connection(&options()).await.unwrap();
        assert!(mock.last_tls().is_none());

        mock.connect_tls(&options(), &tls).await.unwrap();
        assert_eq!(mock.connect_count(), 2);
        assert_eq!(mock.last_tls(), Some(tls));
        assert_eq!(mock.last_options(), Some(options()));
    }

    #[tokio::test]
    async fn scripted_events_arrive_in_order() {
        let mock = MockSocket::new();
        let mut opened = mock.create_connection(&options()).await.unwrap();

        assert!(mock.push_data(b"one"));
        assert!(mock.emit_close());

        assert_eq!(
            opened.events.recv().await,
            Some(SocketEvent::Data(Bytes::from_static(b"one")))
        );
        assert_eq!(opened.events.recv().await, Some(SocketEvent::Close));
    }

    #[tokio::test]
    async fn events_before_connect_are_dropped() {
        let mock = MockSocket::new();
        assert!(!mock.push_data(b"early"));
    }

    #[tokio::test]
    async fn writes_are_captured() {
        let mock = MockSocket::new();
        let opened = mock.create_connection(&options()).await.unwrap();

        opened.handle.write(b"abc").await.unwrap();
        opened.handle.write(b"de").await.unwrap();

        assert_eq!(mock.written(), vec![b"abc".to_vec(), b"de".to_vec()]);
        assert_eq!(mock.written_bytes(), b"abcde".to_vec());
    }

    #[tokio::test]
    async fn forced_write_failure_is_one_shot() {
        let mock = MockSocket::new();
        let opened = mock.create_connection(&options()).await.unwrap();
        mock.fail_next_write("broken pipe");

        assert!(opened.handle.write(b"x").await.is_err());
        assert!(opened.handle.write(b"y").await.is_ok());
    }

    #[tokio::test]
    async fn destroy_closes_event_channel() {
        let mock = MockSocket::new();
        let mut opened = mock.create_connection(&options()).await.unwrap();

        opened.handle.destroy();
        opened.handle.destroy();

        assert!(mock.is_destroyed());
        assert!(opened.events.recv().await.is_none());
        assert!(opened.handle.write(b"late").await.is_err());
    }

    #[tokio::test]
    async fn forced_connect_failure() {
        let mock = MockSocket::new();
        mock.fail_next_connect("connection refused");

        let result = mock.create_connection(&options()).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
        assert!(mock.create_connection(&options()).await.is_ok());
    }

    #[tokio::test]
    async fn without_tls_rejects_tls_connects() {
        let mock = MockSocket::new().without_tls();

        assert!(!mock.supports_tls());
        let result = mock.connect_tls(&options(), &TlsOptions::default()).await;
        assert!(matches!(result, Err(TransportError::TlsUnsupported)));
    }
}
