//! TransportClient - the main interface for dbwire.
//!
//! This module provides [`TransportClient`], a raw byte pipe to a database
//! server. Protocol decoders sit on top of it and ask for bytes with
//! [`TransportClient::receive`].
//!
//! # Architecture
//!
//! TransportClient uses the pure state machine and buffers from dbwire-core
//! and interprets the resulting actions to perform I/O via a
//! [`SocketPrimitive`].
//!
//! ```text
//! Decoder → TransportClient → SocketPrimitive → Network
//!                 ↓
//!            dbwire-core (state machine, accumulator, read queue)
//! ```
//!
//! Inbound socket events are processed by one pump task per connection.
//! All buffer, queue and state mutation happens under a single mutex that
//! is never held across an `.await`.
//!
//! # Example
//!
//! ```ignore
//! use dbwire_client::{ConnectOptions, TransportClient};
//!
//! let client = TransportClient::tcp();
//! client.connect(&ConnectOptions::new("localhost", 5432)).await?;
//! client.send(&startup_message).await?;
//! let header = client.receive(Some(5)).await?;
//! client.disconnect();
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use dbwire_core::pending::satisfiable;
use dbwire_core::{
    Action, ByteAccumulator, ConnectionState, Event, PendingReadQueue, Rejection,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::ConnectOptions;
use crate::error::TransportError;
use crate::socket::{
    signalled, OpenedSocket, SocketEvent, SocketHandle, SocketPrimitive, TcpSocket,
};

type ReadResult = Result<Bytes, TransportError>;
type ReadSender = oneshot::Sender<ReadResult>;

/// Raw TCP/TLS byte transport for one connection.
///
/// A client connects at most once. After a close or failure a new client
/// is required.
pub struct TransportClient {
    primitive: Arc<dyn SocketPrimitive>,
    shared: Arc<Mutex<Shared>>,
    /// Set by `disconnect`; an in-flight connect gives up when it flips.
    closing: watch::Sender<bool>,
}

/// Mutable connection state, guarded by one mutex.
#[derive(Default)]
struct Shared {
    state: ConnectionState,
    buffer: ByteAccumulator,
    reads: PendingReadQueue<ReadSender>,
    socket: Option<Arc<dyn SocketHandle>>,
    pump: Option<JoinHandle<()>>,
}

impl Shared {
    /// Feed an event to the state machine and execute its actions.
    fn apply(&mut self, event: Event) {
        let current = std::mem::take(&mut self.state);
        let before = current.clone();
        let (next, actions) = current.on_event(event);

        if next != before {
            tracing::debug!(from = ?before, to = ?next, "Connection state changed");
        }
        self.state = next;

        for action in actions {
            self.execute(action);
        }
    }

    fn execute(&mut self, action: Action) {
        match action {
            // Opened by connect() itself; nothing to do here.
            Action::OpenSocket => {}
            Action::Append(chunk) => self.buffer.push(chunk),
            Action::Drain => self.drain(),
            Action::RejectPending(rejection) => self.reject_pending(&rejection),
            Action::ClearBuffer => self.buffer.clear(),
            Action::DestroySocket => self.destroy_socket(),
        }
    }

    fn drain(&mut self) {
        self.reads.prune(ReadSender::is_closed);
        let delivered = self.reads.drain(&mut self.buffer, |tx, bytes| {
            tx.send(Ok(bytes))
                .map_err(|returned| returned.unwrap_or_default())
        });

        if delivered > 0 {
            tracing::trace!(
                delivered,
                buffered = self.buffer.len(),
                waiting = self.reads.len(),
                "Drained pending reads"
            );
        }
    }

    fn reject_pending(&mut self, rejection: &Rejection) {
        let waiting = self.reads.reject_all();
        if !waiting.is_empty() {
            tracing::debug!(count = waiting.len(), ?rejection, "Rejecting pending reads");
        }
        for tx in waiting {
            let _ = tx.send(Err(TransportError::from(rejection)));
        }
    }

    fn destroy_socket(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.destroy();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fails the connection if a `connect` future is dropped mid-attempt.
struct ConnectGuard<'a> {
    shared: &'a Mutex<Shared>,
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        let mut shared = lock(self.shared);
        if shared.state == ConnectionState::Connecting {
            tracing::debug!("Connect future dropped before completion");
            shared.apply(Event::ConnectFailed {
                error: "connect cancelled".into(),
            });
        }
    }
}

impl TransportClient {
    /// Create a client that opens sockets through `primitive`.
    pub fn new(primitive: Arc<dyn SocketPrimitive>) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            primitive,
            shared: Arc::new(Mutex::new(Shared::default())),
            closing,
        }
    }

    /// Create a client backed by tokio TCP (and rustls with the `tls` feature).
    pub fn tcp() -> Self {
        Self::new(Arc::new(TcpSocket::new()))
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        lock(&self.shared)
    }

    /// Open the connection.
    ///
    /// Resolves once the socket primitive reports the connection (and TLS
    /// handshake, if requested) established.
    ///
    /// # Errors
    ///
    /// - [`TransportError::InvalidOptions`] if `options` fail validation
    /// - [`TransportError::AlreadyStarted`] if this client was used before
    /// - [`TransportError::ConnectTimeout`] if `timeout_ms` elapses first
    /// - [`TransportError::ConnectionClosed`] if [`disconnect`](Self::disconnect)
    ///   was called while connecting
    /// - the primitive's error otherwise
    ///
    /// Dropping the returned future before it completes leaves the client
    /// failed with reason `"connect cancelled"`.
    pub async fn connect(&self, options: &ConnectOptions) -> Result<(), TransportError> {
        options.validate()?;
        let socket_options = options.socket_options();
        let tls = options.tls.to_tls_options();

        {
            let mut shared = self.lock();
            if shared.state != ConnectionState::Idle {
                return Err(TransportError::AlreadyStarted);
            }
            shared.apply(Event::ConnectRequested);
        }
        let _cancel_on_drop = ConnectGuard {
            shared: &self.shared,
        };

        tracing::debug!(
            host = %socket_options.host,
            port = socket_options.port,
            tls = tls.enabled,
            "Connecting"
        );

        let attempt = async {
            if tls.enabled {
                if !self.primitive.supports_tls() {
                    return Err(TransportError::TlsUnsupported);
                }
                self.primitive.connect_tls(&socket_options, &tls).await
            } else {
                self.primitive.create_connection(&socket_options).await
            }
        };

        let outcome = tokio::select! {
            outcome = tokio::time::timeout(socket_options.timeout, attempt) => outcome,
            () = signalled(self.closing.subscribe()) => {
                tracing::debug!("Disconnected while connecting; abandoning attempt");
                return Err(TransportError::ConnectionClosed);
            }
        };

        let opened = match outcome {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => {
                tracing::warn!(host = %socket_options.host, port = socket_options.port, "Connect failed: {}", e);
                self.lock().apply(Event::ConnectFailed {
                    error: e.to_string(),
                });
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(
                    host = %socket_options.host,
                    port = socket_options.port,
                    timeout_ms = options.timeout_ms,
                    "Connect timed out"
                );
                self.lock().apply(Event::ConnectTimedOut);
                return Err(TransportError::ConnectTimeout);
            }
        };

        let OpenedSocket { handle, events } = opened;
        let mut shared = self.lock();
        shared.apply(Event::ConnectSucceeded);

        if !shared.state.is_connected() {
            drop(shared);
            tracing::debug!("Disconnected while connecting; dropping new socket");
            handle.destroy();
            return Err(TransportError::ConnectionClosed);
        }

        shared.socket = Some(handle);
        shared.pump = Some(tokio::spawn(pump(Arc::downgrade(&self.shared), events)));
        drop(shared);

        tracing::info!(
            host = %socket_options.host,
            port = socket_options.port,
            tls = tls.enabled,
            "Connected"
        );
        Ok(())
    }

    /// Write `data` to the peer.
    ///
    /// Overlapping sends are not ordered against each other; callers that
    /// need one-at-a-time delivery must await each send before the next.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotConnected`] outside the connected state, or
    /// [`TransportError::WriteFailed`] if the primitive reports an I/O error.
    /// A failed write does not change the connection state.
    pub async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let socket = {
            let shared = self.lock();
            match (&shared.state, &shared.socket) {
                (ConnectionState::Connected, Some(socket)) => Arc::clone(socket),
                _ => return Err(TransportError::NotConnected),
            }
        };

        socket.write(data).await.map_err(|e| {
            tracing::debug!("Write of {} bytes failed: {}", data.len(), e);
            TransportError::WriteFailed(e)
        })
    }

    /// Ask for bytes from the peer.
    ///
    /// `Some(n)` resolves with exactly `n` bytes; `None` resolves with
    /// everything buffered once at least one byte is available. Requests are
    /// registered when this is called and fulfilled in call order.
    ///
    /// There is no timeout: a request that is never satisfied waits until
    /// the connection closes or fails. See [`receive_within`](Self::receive_within).
    pub fn receive(&self, expected: Option<usize>) -> Receive {
        let mut shared = self.lock();
        if !shared.state.is_connected() {
            return Receive::ready(Err(TransportError::NotConnected));
        }

        shared.reads.prune(ReadSender::is_closed);
        if shared.reads.is_empty() && satisfiable(expected, &shared.buffer) {
            return Receive::ready(Ok(shared.buffer.read(expected)));
        }

        let (tx, rx) = oneshot::channel();
        shared.reads.push(expected, tx);
        Receive::waiting(rx)
    }

    /// [`receive`](Self::receive) with an upper bound on the wait.
    ///
    /// On timeout the request is withdrawn before any bytes are assigned to
    /// it, so no data is lost.
    ///
    /// # Errors
    ///
    /// [`TransportError::ReceiveTimeout`] if `limit` elapses first, otherwise
    /// whatever `receive` reports.
    pub async fn receive_within(
        &self,
        expected: Option<usize>,
        limit: Duration,
    ) -> Result<Bytes, TransportError> {
        let mut pending = self.receive(expected);
        match tokio::time::timeout(limit, &mut pending).await {
            Ok(result) => result,
            Err(_) => match pending.abandon() {
                // Fulfilled between the deadline and the withdrawal.
                Some(result) => result,
                None => {
                    self.lock().reads.prune(ReadSender::is_closed);
                    Err(TransportError::ReceiveTimeout)
                }
            },
        }
    }

    /// Close the connection.
    ///
    /// Destroys the socket, discards buffered bytes and rejects every
    /// pending read with [`TransportError::ConnectionClosed`]. Safe to call
    /// from any state, any number of times.
    pub fn disconnect(&self) {
        self.closing.send_replace(true);
        let mut shared = self.lock();
        let was_connected = shared.state.is_connected();

        shared.apply(Event::DisconnectRequested);
        shared.reject_pending(&Rejection::Closed);
        shared.buffer.clear();
        shared.destroy_socket();

        if was_connected {
            tracing::info!("Disconnected");
        }
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.lock().state.is_connected()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.lock().state.clone()
    }

    /// Number of reads waiting for bytes.
    pub fn pending_reads(&self) -> usize {
        let mut shared = self.lock();
        shared.reads.prune(ReadSender::is_closed);
        shared.reads.len()
    }

    /// Number of bytes received but not yet handed to a reader.
    pub fn buffered_len(&self) -> usize {
        self.lock().buffer.len()
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.lock();
        f.debug_struct("TransportClient")
            .field("state", &shared.state)
            .field("buffered", &shared.buffer.len())
            .field("pending_reads", &shared.reads.len())
            .finish_non_exhaustive()
    }
}

/// Feed socket events into the state machine until the connection ends.
async fn pump(shared: Weak<Mutex<Shared>>, mut events: mpsc::UnboundedReceiver<SocketEvent>) {
    while let Some(event) = events.recv().await {
        if !deliver(&shared, socket_event(event)) {
            return;
        }
    }

    // Primitive dropped its sender without reporting why.
    deliver(&shared, Event::SocketClosed);
}

/// Apply one event. Returns false once the pump should stop.
fn deliver(shared: &Weak<Mutex<Shared>>, event: Event) -> bool {
    let Some(shared) = shared.upgrade() else {
        return false;
    };
    let mut guard = lock(&shared);

    match &event {
        Event::SocketError { error } => tracing::warn!("Socket error: {}", error),
        Event::SocketClosed => tracing::debug!("Socket closed by peer"),
        Event::SocketTimeout => tracing::debug!("Socket idle timeout"),
        _ => {}
    }

    guard.apply(event);
    !guard.state.is_terminal()
}

fn socket_event(event: SocketEvent) -> Event {
    match event {
        SocketEvent::Data(chunk) => Event::DataReceived { chunk },
        SocketEvent::Error(error) => Event::SocketError { error },
        SocketEvent::Close => Event::SocketClosed,
        SocketEvent::Timeout => Event::SocketTimeout,
    }
}

/// Future returned by [`TransportClient::receive`].
///
/// Dropping it withdraws the request; bytes are never assigned to a
/// dropped reader.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Receive {
    inner: ReceiveInner,
}

#[derive(Debug)]
enum ReceiveInner {
    Ready(Option<ReadResult>),
    Waiting(oneshot::Receiver<ReadResult>),
}

impl Receive {
    fn ready(result: ReadResult) -> Self {
        Self {
            inner: ReceiveInner::Ready(Some(result)),
        }
    }

    fn waiting(rx: oneshot::Receiver<ReadResult>) -> Self {
        Self {
            inner: ReceiveInner::Waiting(rx),
        }
    }

    /// Withdraw the request, returning its result if it already completed.
    fn abandon(&mut self) -> Option<ReadResult> {
        match &mut self.inner {
            ReceiveInner::Ready(result) => result.take(),
            ReceiveInner::Waiting(rx) => {
                rx.close();
                rx.try_recv().ok()
            }
        }
    }
}

impl Future for Receive {
    type Output = ReadResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            ReceiveInner::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(TransportError::ConnectionClosed)))
            }
            // Sender dropped without a result: the client itself went away.
            ReceiveInner::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|result| result.unwrap_or(Err(TransportError::ConnectionClosed))),
        }
    }
}
