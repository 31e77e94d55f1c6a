//! # Authoritative Server Library
//!
//! This crate implements the server side of the dungeon game's networking:
//! it owns the canonical simulation, accepts clients over the reliable
//! channel, learns their datagram addresses, consumes their inputs, and
//! broadcasts world snapshots.
//!
//! ## Architecture
//!
//! ### Transport endpoint (`network`)
//! Binds the reliable listener and the datagram socket to the same port.
//! Each accepted connection gets a reader task that decodes frames and a
//! writer task fed through an unbounded channel; that channel's sender is the
//! session's reliable handle. Datagram reception routes registrations to the
//! session registry and inputs to the tick loop's queue. I/O tasks never
//! execute gameplay logic.
//!
//! ### Session registry (`session`)
//! Allocates monotonically increasing client ids, validates player names,
//! remembers datagram return addresses, and purges everything atomically when
//! a reliable connection closes. Readers always get snapshot copies.
//!
//! ### Authoritative loop (`game`)
//! A single dedicated task running simulation and snapshot emission at fixed
//! rates. Each tick reconciles sessions with entities, drains the input
//! queue, answers spawn-description requests, and advances the world through
//! the tick runner. The loop owns the world; nothing else reads it.
//!
//! ### Simulation seams (`sim`, `level`)
//! The tick runner reproduces the engine's frame semantics (registration
//! order, per-system cadence, running flags) and the level catalog exposes
//! the little the loop needs from the level pipeline: the current level, the
//! start tile, and the end-of-campaign signal.
//!
//! ### Facade (`handler`)
//! `ServerHandler` wires all of the above onto a private tokio runtime and
//! exposes the start/stop/poll surface the host process drives.

pub mod game;
pub mod handler;
pub mod level;
pub mod network;
pub mod session;
pub mod sim;

pub use handler::{ServerConfig, ServerHandler};
pub use level::{LevelCatalog, StaticLevels};
pub use sim::{memory_world_runner, MovementSystem, System, TickRunner};
