//! Connection state machine for dbwire.
//!
//! This module provides a pure, side-effect-free state machine for a single
//! connection attempt. The state machine takes events as input and produces
//! a new state plus a list of actions to execute.
//!
//! The actual I/O (opening sockets, buffering, waking readers) is performed
//! by dbwire-client, not by this module.
//!
//! ```text
//! Idle --connect--> Connecting --success--> Connected --disconnect/close--> Closed
//!                        |                      |
//!                        +--error/timeout--> Failed <--error--+
//! ```
//!
//! `Closed` and `Failed` are terminal: a new client is needed to reconnect.

use bytes::Bytes;

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection attempted yet.
    #[default]
    Idle,
    /// Waiting for the socket primitive to report success.
    Connecting,
    /// Socket open; reads and writes allowed.
    Connected,
    /// Closed by the caller or by the peer.
    Closed,
    /// Connect failed or the socket reported an error.
    Failed {
        /// Description of what went wrong.
        reason: String,
    },
}

impl ConnectionState {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller is responsible
    /// for executing the returned actions in order.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Idle
            (Self::Idle, Event::ConnectRequested) => (Self::Connecting, vec![Action::OpenSocket]),
            (Self::Idle, Event::DisconnectRequested) => (Self::Closed, vec![]),

            // From Connecting
            (Self::Connecting, Event::ConnectSucceeded) => (Self::Connected, vec![]),
            (Self::Connecting, Event::ConnectFailed { error }) => (
                Self::Failed { reason: error },
                vec![Action::DestroySocket],
            ),
            (Self::Connecting, Event::ConnectTimedOut | Event::SocketTimeout) => (
                Self::Failed {
                    reason: "connection timeout".into(),
                },
                vec![Action::DestroySocket],
            ),
            (Self::Connecting, Event::DisconnectRequested) => {
                (Self::Closed, vec![Action::DestroySocket])
            }

            // From Connected
            (Self::Connected, Event::DataReceived { chunk }) => {
                (Self::Connected, vec![Action::Append(chunk), Action::Drain])
            }
            (Self::Connected, Event::SocketError { error }) => (
                Self::Failed {
                    reason: error.clone(),
                },
                vec![
                    Action::RejectPending(Rejection::Failed(error)),
                    Action::ClearBuffer,
                    Action::DestroySocket,
                ],
            ),
            (
                Self::Connected,
                Event::SocketClosed | Event::SocketTimeout | Event::DisconnectRequested,
            ) => (
                Self::Closed,
                vec![
                    Action::RejectPending(Rejection::Closed),
                    Action::ClearBuffer,
                    Action::DestroySocket,
                ],
            ),

            // Terminal states ignore everything
            (state, _) => (state, vec![]),
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if this state can never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed { .. })
    }
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Caller asked to connect.
    ConnectRequested,
    /// Socket primitive reported the connection is established.
    ConnectSucceeded,
    /// Socket primitive failed before the connection was established.
    ConnectFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// The connect deadline elapsed first.
    ConnectTimedOut,
    /// Bytes arrived from the peer.
    DataReceived {
        /// The inbound chunk, exactly as delivered.
        chunk: Bytes,
    },
    /// Socket reported an I/O error.
    SocketError {
        /// Error message describing the failure.
        error: String,
    },
    /// Socket was closed by the peer.
    SocketClosed,
    /// Socket primitive reported an inactivity timeout.
    SocketTimeout,
    /// Caller asked to disconnect.
    DisconnectRequested,
}

/// Actions to be executed by the client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open the underlying socket.
    OpenSocket,
    /// Append a chunk to the accumulator.
    Append(Bytes),
    /// Serve pending reads from the accumulator.
    Drain,
    /// Fail every pending read.
    RejectPending(Rejection),
    /// Discard buffered bytes.
    ClearBuffer,
    /// Tear down the socket if one is open.
    DestroySocket,
}

/// How queued reads are failed when the connection ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Planned or remote close.
    Closed,
    /// Socket error with its message.
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(reason: &str) -> ConnectionState {
        ConnectionState::Failed {
            reason: reason.into(),
        }
    }

    #[test]
    fn starts_idle() {
        let state = ConnectionState::new();
        assert!(matches!(state, ConnectionState::Idle));
        assert!(!state.is_connected());
        assert!(!state.is_terminal());
    }

    #[test]
    fn connect_request_transitions_to_connecting() {
        let (state, actions) = ConnectionState::Idle.on_event(Event::ConnectRequested);

        assert_eq!(state, ConnectionState::Connecting);
        assert_eq!(actions, vec![Action::OpenSocket]);
    }

    #[test]
    fn connect_success_transitions_to_connected() {
        let (state, actions) = ConnectionState::Connecting.on_event(Event::ConnectSucceeded);

        assert!(state.is_connected());
        assert!(actions.is_empty());
    }

    #[test]
    fn connect_failure_is_terminal() {
        let (state, actions) = ConnectionState::Connecting.on_event(Event::ConnectFailed {
            error: "connection refused".into(),
        });

        assert_eq!(state, failed("connection refused"));
        assert!(state.is_terminal());
        assert!(actions.contains(&Action::DestroySocket));
    }

    #[test]
    fn connect_timeout_fails() {
        let (state, _) = ConnectionState::Connecting.on_event(Event::ConnectTimedOut);
        assert_eq!(state, failed("connection timeout"));

        let (state, _) = ConnectionState::Connecting.on_event(Event::SocketTimeout);
        assert_eq!(state, failed("connection timeout"));
    }

    #[test]
    fn data_is_appended_then_drained() {
        let chunk = Bytes::from_static(b"\x52\0\0\0\x08");
        let (state, actions) = ConnectionState::Connected.on_event(Event::DataReceived {
            chunk: chunk.clone(),
        });

        assert!(state.is_connected());
        assert_eq!(actions, vec![Action::Append(chunk), Action::Drain]);
    }

    #[test]
    fn socket_error_while_connected_fails_pending_reads() {
        let (state, actions) = ConnectionState::Connected.on_event(Event::SocketError {
            error: "connection reset by peer".into(),
        });

        assert_eq!(state, failed("connection reset by peer"));
        assert_eq!(
            actions[0],
            Action::RejectPending(Rejection::Failed("connection reset by peer".into()))
        );
        assert!(actions.contains(&Action::ClearBuffer));
    }

    #[test]
    fn remote_close_rejects_with_closed() {
        let (state, actions) = ConnectionState::Connected.on_event(Event::SocketClosed);

        assert_eq!(state, ConnectionState::Closed);
        assert!(actions.contains(&Action::RejectPending(Rejection::Closed)));
    }

    #[test]
    fn disconnect_from_connected_cleans_up() {
        let (state, actions) = ConnectionState::Connected.on_event(Event::DisconnectRequested);

        assert_eq!(state, ConnectionState::Closed);
        assert_eq!(
            actions,
            vec![
                Action::RejectPending(Rejection::Closed),
                Action::ClearBuffer,
                Action::DestroySocket,
            ]
        );
    }

    #[test]
    fn disconnect_before_connect_closes() {
        let (state, actions) = ConnectionState::Idle.on_event(Event::DisconnectRequested);

        assert_eq!(state, ConnectionState::Closed);
        assert!(actions.is_empty());
    }

    #[test]
    fn disconnect_while_connecting_destroys_socket() {
        let (state, actions) = ConnectionState::Connecting.on_event(Event::DisconnectRequested);

        assert_eq!(state, ConnectionState::Closed);
        assert_eq!(actions, vec![Action::DestroySocket]);
    }

    #[test]
    fn terminal_states_ignore_events() {
        let events = [
            Event::ConnectRequested,
            Event::ConnectSucceeded,
            Event::DataReceived {
                chunk: Bytes::from_static(b"late"),
            },
            Event::SocketError {
                error: "late".into(),
            },
            Event::SocketClosed,
            Event::DisconnectRequested,
        ];

        for terminal in [ConnectionState::Closed, failed("boom")] {
            for event in events.clone() {
                let (state, actions) = terminal.clone().on_event(event);
                assert_eq!(state, terminal);
                assert!(actions.is_empty());
            }
        }
    }

    #[test]
    fn success_after_close_is_ignored() {
        // A socket that finishes opening after disconnect must not revive the client.
        let (state, _) = ConnectionState::Connecting.on_event(Event::DisconnectRequested);
        let (state, actions) = state.on_event(Event::ConnectSucceeded);

        assert_eq!(state, ConnectionState::Closed);
        assert!(actions.is_empty());
    }

    #[test]
    fn idle_rejects_socket_events() {
        let (state, actions) = ConnectionState::Idle.on_event(Event::SocketClosed);

        assert_eq!(state, ConnectionState::Idle);
        assert!(actions.is_empty());
    }
}
