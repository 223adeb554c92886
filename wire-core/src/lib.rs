//! # dbwire-core
//!
//! Pure logic for the dbwire byte transport (no I/O, instant tests).
//!
//! This crate implements the buffering, read queueing and connection state
//! machine of a raw TCP/TLS client without touching a socket:
//!
//! - [`ByteAccumulator`] - append-only chunk list with near zero-copy reads
//! - [`PendingReadQueue`] - FIFO of outstanding reads and the drain algorithm
//! - [`ConnectionState`] - lifecycle state machine driven by [`Event`]s
//! - [`SslSpec`] / [`TlsOptions`] - TLS negotiation policy
//! - [`DatabaseKind`] - default ports for common database servers
//!
//! ## Design Philosophy
//!
//! Every module here takes input and produces output without side effects.
//! The actual I/O is performed by `dbwire-client`, which interprets the
//! [`Action`]s produced by the state machine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accumulator;
pub mod pending;
pub mod state;
pub mod target;
pub mod tls;

pub use accumulator::ByteAccumulator;
pub use pending::{PendingRead, PendingReadQueue};
pub use state::{Action, ConnectionState, Event, Rejection};
pub use target::{DatabaseKind, UnknownDatabaseKind};
pub use tls::{SslConfig, SslSpec, TlsOptions};
