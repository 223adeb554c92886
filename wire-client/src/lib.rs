//! # dbwire-client
//!
//! Raw TCP/TLS byte transport for database wire-protocol clients.
//!
//! This crate moves bytes; it knows nothing about any database protocol.
//! A decoder on top asks for bytes with [`TransportClient::receive`] and
//! writes requests with [`TransportClient::send`].
//!
//! ## Features
//!
//! - **Exact-length reads**: ask for `n` bytes or for whatever is buffered
//! - **FIFO fulfilment**: reads complete in the order they were issued
//! - **Pluggable sockets**: tokio TCP, rustls TLS, mock, or unavailable
//! - **Pure State Machine**: uses dbwire-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use dbwire_client::{ConnectOptions, TransportClient};
//!
//! let client = TransportClient::tcp();
//! client.connect(&ConnectOptions::new("localhost", 5432).with_tls(true)).await?;
//!
//! client.send(&request).await?;
//! let reply = client.receive(None).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod socket;

pub use client::{Receive, TransportClient};
pub use config::{ConnectOptions, DEFAULT_CONNECT_TIMEOUT_MS};
pub use error::{ConfigError, TransportError};
pub use socket::{
    MockSocket, OpenedSocket, SocketEvent, SocketHandle, SocketOptions, SocketPrimitive,
    TcpSocket, UnavailableSocket,
};
