//! # Game Client Library
//!
//! Client side of the dungeon game's networking, plus the single entry point
//! host processes use to obtain a network handler for either role.
//!
//! ## What the client does
//!
//! - Opens the reliable stream and sends the connect request as soon as the
//!   stream is active.
//! - On acknowledgement, stores the assigned client id and announces its
//!   datagram address to the server, retransmitting on a fixed schedule until
//!   the first snapshot proves the registration landed.
//! - Queues every received message; the game thread drains the queue once
//!   per frame through `poll_and_dispatch`, which applies snapshots to the
//!   local entity mirror via the snapshot translator and hands everything to
//!   the dispatcher.
//! - Stamps outgoing inputs with the assigned client id and refuses to send
//!   them before the handshake completes.
//!
//! ## Startup surface
//!
//! [`create_handler`] builds a ready-to-wire handler for either role. Hosts
//! embedding a real engine construct [`ClientHandler`] or
//! `server::ServerHandler` directly instead and pass their own collaborators.

pub mod network;

pub use network::{ClientConfig, ClientHandler};

use server::{memory_world_runner, ServerConfig, ServerHandler, StaticLevels};
use shared::messages::Point;
use shared::translator::DefaultSnapshotTranslator;
use shared::world::MemoryWorld;
use shared::NetworkHandler;

/// Builds a network handler for the requested role.
///
/// Server mode hosts the authoritative loop on `host:port` with the built-in
/// in-memory world and single-level catalog; client mode connects to that
/// address as `player_name`. Both come pre-wired with the stock snapshot
/// translator, which callers may replace before `start`.
pub fn create_handler(
    is_server: bool,
    host: &str,
    port: u16,
    player_name: &str,
) -> Box<dyn NetworkHandler> {
    if is_server {
        let config = ServerConfig {
            host: host.to_string(),
            port,
            ..ServerConfig::default()
        };
        let mut handler = ServerHandler::new(
            config,
            MemoryWorld::new(),
            Box::new(StaticLevels::new("maze", Point::new(1.0, 1.0))),
            memory_world_runner(),
        );
        handler.set_snapshot_translator(Box::new(DefaultSnapshotTranslator::new()));
        Box::new(handler)
    } else {
        let config = ClientConfig {
            host: host.to_string(),
            port,
            player_name: player_name.to_string(),
        };
        let mut handler = ClientHandler::new(config);
        handler.set_snapshot_translator(Box::new(DefaultSnapshotTranslator::new()));
        Box::new(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_handler_roles() {
        let server = create_handler(true, "127.0.0.1", 0, "");
        assert!(server.is_server());
        assert!(!server.is_connected());

        let client = create_handler(false, "127.0.0.1", shared::DEFAULT_PORT, "Alice");
        assert!(!client.is_server());
        assert!(!client.is_connected());
    }
}
