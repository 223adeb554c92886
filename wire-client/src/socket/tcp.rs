//! TcpSocket - socket primitive backed by tokio.
//!
//! Plain connections use a tokio `TcpStream`; TLS connections wrap it with
//! rustls when the `tls` feature is enabled. Each opened socket gets a
//! reader task that forwards inbound chunks as [`SocketEvent`]s.

use super::{signalled, OpenedSocket, SocketEvent, SocketHandle, SocketOptions, SocketPrimitive};
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::BytesMut;
use dbwire_core::TlsOptions;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Bytes reserved per socket read.
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Socket primitive using tokio networking.
///
/// # Example
///
/// ```ignore
/// let client = TransportClient::new(Arc::new(TcpSocket::new()));
/// client.connect(&ConnectOptions::new("localhost", 5432)).await?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpSocket;

impl TcpSocket {
    /// Create a new tokio socket primitive.
    pub fn new() -> Self {
        Self
    }
}

async fn open_stream(options: &SocketOptions) -> Result<TcpStream, TransportError> {
    let stream = TcpStream::connect((options.host.as_str(), options.port))
        .await
        .map_err(|e| {
            TransportError::ConnectFailed(format!("{}:{}: {e}", options.host, options.port))
        })?;

    // Wire protocols are request/response; don't let Nagle hold small writes.
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Failed to set TCP_NODELAY: {}", e);
    }

    Ok(stream)
}

#[async_trait]
impl SocketPrimitive for TcpSocket {
    async fn create_connection(
        &self,
        options: &SocketOptions,
    ) -> Result<OpenedSocket, TransportError> {
        let stream = open_stream(options).await?;
        Ok(spawn_stream(stream, options.idle_timeout))
    }

    #[cfg(feature = "tls")]
    async fn connect_tls(
        &self,
        options: &SocketOptions,
        tls: &TlsOptions,
    ) -> Result<OpenedSocket, TransportError> {
        // Build the rustls config first so bad PEM material fails before any I/O.
        let connector = super::tls::connector(tls)?;
        let server_name = super::tls::server_name(&options.host)?;
        let stream = open_stream(options).await?;

        let tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| TransportError::Tls(format!("TLS handshake failed: {e}")))?;

        Ok(spawn_stream(tls_stream, options.idle_timeout))
    }

    #[cfg(not(feature = "tls"))]
    async fn connect_tls(
        &self,
        _options: &SocketOptions,
        _tls: &TlsOptions,
    ) -> Result<OpenedSocket, TransportError> {
        Err(TransportError::TlsUnsupported)
    }

    fn supports_tls(&self) -> bool {
        cfg!(feature = "tls")
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Split `stream`, spawn its reader task and wrap the write half.
fn spawn_stream<S>(stream: S, idle_timeout: Option<Duration>) -> OpenedSocket
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (tx, rx) = mpsc::unbounded_channel();
    let reader_task = tokio::spawn(read_loop(reader, tx, idle_timeout));
    let (shutdown, _) = watch::channel(false);

    OpenedSocket {
        handle: Arc::new(StreamHandle {
            writer: tokio::sync::Mutex::new(Some(Box::new(writer))),
            reader_task: Mutex::new(Some(reader_task)),
            shutdown,
        }),
        events: rx,
    }
}

/// Forward inbound chunks until the peer closes, the read fails, or no
/// bytes arrive for `idle_timeout`.
async fn read_loop<R>(
    mut reader: R,
    events: mpsc::UnboundedSender<SocketEvent>,
    idle_timeout: Option<Duration>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
    loop {
        buf.reserve(READ_CHUNK_SIZE);
        let read = reader.read_buf(&mut buf);
        let outcome = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let _ = events.send(SocketEvent::Timeout);
                    break;
                }
            },
            None => read.await,
        };

        match outcome {
            Ok(0) => {
                let _ = events.send(SocketEvent::Close);
                break;
            }
            Ok(_) => {
                let chunk = buf.split().freeze();
                if events.send(SocketEvent::Data(chunk)).is_err() {
                    break;
                }
            }
            // Peers often drop TLS without close_notify; that is still a close.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                let _ = events.send(SocketEvent::Close);
                break;
            }
            Err(e) => {
                let _ = events.send(SocketEvent::Error(e.to_string()));
                break;
            }
        }
    }
}

/// Write half plus reader task of a tokio stream.
struct StreamHandle {
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    /// Flips to `true` once on destroy; in-flight writes watch it.
    shutdown: watch::Sender<bool>,
}

impl StreamHandle {
    fn is_destroyed(&self) -> bool {
        *self.shutdown.borrow()
    }
}

fn destroyed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket destroyed")
}

async fn write_and_flush(writer: &mut BoxedWriter, data: &[u8]) -> io::Result<()> {
    writer.write_all(data).await?;
    writer.flush().await
}

#[async_trait]
impl SocketHandle for StreamHandle {
    async fn write(&self, data: &[u8]) -> io::Result<()> {
        if self.is_destroyed() {
            return Err(destroyed_error());
        }

        let mut guard = tokio::select! {
            guard = self.writer.lock() => guard,
            () = signalled(self.shutdown.subscribe()) => return Err(destroyed_error()),
        };
        let writer = guard.as_mut().ok_or_else(destroyed_error)?;

        // A peer that stops reading must not keep destroy() from closing the socket.
        let result = tokio::select! {
            result = write_and_flush(writer, data) => result,
            () = signalled(self.shutdown.subscribe()) => Err(destroyed_error()),
        };

        // destroy() could not take the writer while we held it.
        if self.is_destroyed() {
            guard.take();
        }
        result
    }

    fn destroy(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }

        let task = self
            .reader_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }

        // Dropping both halves closes the socket.
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    #[tokio::test]
    async fn read_loop_forwards_chunks_then_close() {
        let (client, mut server) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(read_loop(client, tx, None));

        server.write_all(b"hello").await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(SocketEvent::Data(Bytes::from_static(b"hello")))
        );

        drop(server);
        assert_eq!(rx.recv().await, Some(SocketEvent::Close));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stream_handle_writes_and_destroys() {
        let (client, mut server) = tokio::io::duplex(64);
        let opened = spawn_stream(client, None);

        opened.handle.write(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        opened.handle.destroy();
        opened.handle.destroy();
        assert!(opened.handle.write(b"late").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn read_loop_reports_idle_timeout() {
        let (client, mut server) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(read_loop(client, tx, Some(Duration::from_millis(100))));

        server.write_all(b"a").await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(SocketEvent::Data(Bytes::from_static(b"a")))
        );

        assert_eq!(rx.recv().await, Some(SocketEvent::Timeout));
        task.await.unwrap();
        drop(server);
    }

    #[tokio::test]
    async fn destroy_interrupts_blocked_write() {
        // Nobody reads the server side, so the write fills the pipe and parks.
        let (client, _server) = tokio::io::duplex(16);
        let opened = spawn_stream(client, None);
        let handle = Arc::clone(&opened.handle);

        let writer = tokio::spawn(async move { handle.write(&[0u8; 1024]).await });
        tokio::task::yield_now().await;
        assert!(!writer.is_finished());

        opened.handle.destroy();

        let result = tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn connect_refused_is_connect_failure() {
        // Bind then drop to find a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let options = SocketOptions {
            host: "127.0.0.1".into(),
            port,
            timeout: Duration::from_secs(1),
            idle_timeout: None,
        };
        let result = TcpSocket::new().create_connection(&options).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }

    #[cfg(not(feature = "tls"))]
    #[tokio::test]
    async fn tls_unsupported_without_feature() {
        let options = SocketOptions {
            host: "localhost".into(),
            port: 1,
            timeout: Duration::from_secs(1),
            idle_timeout: None,
        };
        assert!(!TcpSocket::new().supports_tls());
        let result = TcpSocket::new()
            .connect_tls(&options, &TlsOptions::default())
            .await;
        assert!(matches!(result, Err(TransportError::TlsUnsupported)));
    }
}
