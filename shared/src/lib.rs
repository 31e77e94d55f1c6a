//! # Shared Netcode Library
//!
//! This crate contains everything the dungeon game's server and client have in
//! common: the wire protocol, the codec for both transport channels, the
//! message dispatcher, the snapshot translator, and the narrow collaborator
//! interfaces the networking core uses to talk to the game engine.
//!
//! ## Transport model
//!
//! The game uses two channels that share a single port:
//!
//! - A **reliable channel** (TCP) carries control traffic: the connect
//!   handshake, level changes, and entity spawn events. Every message is
//!   framed with a 4-byte big-endian length prefix.
//! - A **datagram channel** (UDP) carries the high-frequency traffic: player
//!   inputs going up and world snapshots coming down. One message per
//!   datagram, capped conservatively to avoid IP fragmentation.
//!
//! ## Authority model
//!
//! The server owns the simulation. Clients forward player intent as compact
//! input messages and render the entity state they receive in snapshots. A
//! monotonic server tick attached to every snapshot lets receivers discard
//! stale or reordered datagrams.
//!
//! ## Threading contract
//!
//! I/O tasks only decode messages and push them onto queues. All game-facing
//! callbacks (dispatcher handlers, connection listeners, snapshot
//! application) run on the thread that calls `poll_and_dispatch` on the
//! handler, once per frame.

pub mod codec;
pub mod dispatcher;
pub mod handler;
pub mod messages;
pub mod translator;
pub mod world;

pub use codec::{WireError, MAX_DATAGRAM_RECV, MAX_DATAGRAM_SEND, MAX_FRAME_PAYLOAD};
pub use dispatcher::MessageDispatcher;
pub use handler::{ConnectionListener, ConnectionState, LifecycleEvent, NetError, NetworkHandler};
pub use messages::{Action, ClientId, Direction, EntityState, Message, MessageKind, Point};
pub use translator::{DefaultSnapshotTranslator, SnapshotTranslator};
pub use world::{EntityFacts, EntityWorld, MemoryWorld};

/// Port shared by the reliable listener and the datagram socket.
pub const DEFAULT_PORT: u16 = 7777;

/// Simulation rate of the authoritative tick loop.
pub const TICK_HZ: u32 = 20;

/// Rate at which world snapshots are broadcast to registered datagram peers.
pub const SNAPSHOT_HZ: u32 = 20;
