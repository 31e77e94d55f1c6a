//! The facade the host process drives, plus its lifecycle vocabulary.

use crate::codec::WireError;
use crate::dispatcher::MessageDispatcher;
use crate::messages::{Action, Message, Point};
use crate::translator::SnapshotTranslator;
use crate::world::EntityWorld;
use thiserror::Error;

/// Errors surfaced by handler lifecycle operations.
///
/// Nothing here ever crosses out of an I/O task; transport hiccups during
/// normal operation are logged and dropped. These errors only appear where
/// the host is in the call stack, i.e. `start`.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// The handler is wired incorrectly (for example no snapshot translator
    /// was set before `start`).
    #[error("{0}")]
    Config(String),
}

/// Client-side connection progress.
///
/// `Disconnected → Connecting → Acknowledged → DatagramRegistered`, then back
/// to `Disconnected` on stream close or shutdown. The last transition is
/// implicit: the first snapshot from the server proves the datagram
/// registration arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Acknowledged,
    DatagramRegistered,
}

impl ConnectionState {
    /// Decodes the compact representation used in atomic state cells.
    /// Unknown values map to `Disconnected`.
    pub fn from_u8(value: u8) -> ConnectionState {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Acknowledged,
            3 => ConnectionState::DatagramRegistered,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Compact representation for atomic state cells.
    pub fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Acknowledged => 2,
            ConnectionState::DatagramRegistered => 3,
        }
    }
}

/// Lifecycle notification queued from I/O tasks and delivered to connection
/// listeners by the game thread's poll step.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Connected,
    Disconnected(Option<String>),
}

/// Observer of connection lifecycle events.
///
/// Callbacks run on the game thread during `poll_and_dispatch`, never on I/O
/// tasks, and must be lightweight.
pub trait ConnectionListener: Send {
    /// The handler became connected (client: stream-active; server: started).
    fn on_connected(&mut self) {}

    /// The handler disconnected. `cause` is `None` for an orderly close.
    fn on_disconnected(&mut self, cause: Option<&str>) {
        let _ = cause;
    }
}

/// The surface the game loop drives, independent of which side it is on.
///
/// One implementation exists per role: the server handler owns the
/// authoritative simulation, the client handler forwards intent and mirrors
/// snapshots. Both deliver every game-facing callback through
/// [`poll_and_dispatch`](NetworkHandler::poll_and_dispatch), which the host
/// must call once per frame on its game thread.
pub trait NetworkHandler: Send {
    /// Starts sockets and background tasks. Starting an already started
    /// handler is a warning no-op.
    fn start(&mut self) -> Result<(), NetError>;

    /// Stops the handler. Idempotent; pending inbound messages are discarded
    /// and in-flight sends may be dropped.
    fn shutdown(&mut self, reason: &str);

    /// Drains lifecycle events first, then inbound messages, invoking
    /// listeners, the snapshot translator, and dispatcher handlers on the
    /// calling thread. Server handlers ignore `world`: the authoritative
    /// world lives on the tick loop, not with the caller.
    fn poll_and_dispatch(&mut self, world: &mut dyn EntityWorld);

    /// Sends a control message. On the client this uses the reliable
    /// channel; on the server it broadcasts to every registered datagram
    /// peer. Failures are logged, never raised.
    fn send(&mut self, message: Message);

    /// Sends one unit of player intent on the datagram channel, stamped with
    /// the assigned client id. Dropped with a log message before the
    /// handshake completes or when the payload exceeds the datagram cap.
    fn send_input(&mut self, action: Action, point: Point);

    /// Registers a lifecycle observer.
    fn add_connection_listener(&mut self, listener: Box<dyn ConnectionListener>);

    /// Sets the translator used to build or apply snapshots. Required before
    /// `start`; starting without one fails with a configuration error.
    fn set_snapshot_translator(&mut self, translator: Box<dyn SnapshotTranslator>);

    /// The dispatcher game code registers its message handlers on.
    fn dispatcher_mut(&mut self) -> &mut MessageDispatcher;

    fn is_connected(&self) -> bool;

    fn is_server(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_u8_roundtrip() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Acknowledged,
            ConnectionState::DatagramRegistered,
        ] {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
        }
        assert_eq!(
            ConnectionState::from_u8(250),
            ConnectionState::Disconnected
        );
    }
}
