//! Conversion between authoritative entity state and snapshot messages.
//!
//! The translator is the only component that turns world state into wire
//! state and back. Both directions share a monotonic server-tick guard so a
//! process never emits, and a client never applies, a snapshot that is not
//! strictly newer than the last one it saw. Because the tick counter could in
//! principle wrap, ticks within [`TICK_WRAP_ALLOWANCE`] of `u64::MAX` reset
//! the guard instead of comparing against it.

use crate::messages::{ClientId, Direction, EntityState, Message};
use crate::world::EntityWorld;
use log::{debug, warn};
use std::collections::HashMap;

/// Ticks below `u64::MAX` inside which the monotonic guard resets.
pub const TICK_WRAP_ALLOWANCE: u64 = 1_000;

/// Builds snapshots from the authoritative world and applies received
/// snapshots to a local mirror.
///
/// Implementations must only be invoked from the owning thread: the tick loop
/// on the server, the game thread's poll step on the client. They never touch
/// world state from I/O tasks.
pub trait SnapshotTranslator: Send {
    /// Builds a snapshot for `server_tick` from the session entities, or
    /// `None` when the tick is not strictly newer than the last emitted one.
    fn translate_to_snapshot(
        &mut self,
        server_tick: u64,
        entities: &HashMap<ClientId, String>,
        world: &dyn EntityWorld,
    ) -> Option<Message>;

    /// Applies a received snapshot to the local mirror. Stale or duplicate
    /// ticks are dropped; entities the mirror cannot resolve are skipped.
    fn apply_snapshot(&mut self, server_tick: u64, entities: &[EntityState], world: &mut dyn EntityWorld);
}

/// Stock translator carrying the field mapping used by the dungeon game.
#[derive(Debug, Default)]
pub struct DefaultSnapshotTranslator {
    latest_server_tick: Option<u64>,
}

impl DefaultSnapshotTranslator {
    pub fn new() -> Self {
        DefaultSnapshotTranslator {
            latest_server_tick: None,
        }
    }

    /// The last tick that passed the monotonic guard.
    pub fn latest_server_tick(&self) -> Option<u64> {
        self.latest_server_tick
    }

    /// Advances the guard if `server_tick` is strictly newer, with the wrap
    /// allowance near the numeric maximum.
    fn accept_tick(&mut self, server_tick: u64) -> bool {
        if server_tick > u64::MAX - TICK_WRAP_ALLOWANCE {
            // About to wrap: reset so post-wrap ticks start a fresh sequence.
            self.latest_server_tick = None;
            return true;
        }
        match self.latest_server_tick {
            Some(latest) if server_tick <= latest => false,
            _ => {
                self.latest_server_tick = Some(server_tick);
                true
            }
        }
    }
}

impl SnapshotTranslator for DefaultSnapshotTranslator {
    fn translate_to_snapshot(
        &mut self,
        server_tick: u64,
        entities: &HashMap<ClientId, String>,
        world: &dyn EntityWorld,
    ) -> Option<Message> {
        if !self.accept_tick(server_tick) {
            debug!(
                "Skipping snapshot for tick {server_tick}; latest emitted is {:?}",
                self.latest_server_tick
            );
            return None;
        }

        let mut list = Vec::with_capacity(entities.len());
        for entity_name in entities.values() {
            let Some(facts) = world.facts(entity_name) else {
                debug!("Entity '{entity_name}' vanished before snapshot; skipping");
                continue;
            };
            let Some(position) = facts.position else {
                debug!("Entity '{entity_name}' has no position; skipping");
                continue;
            };

            list.push(EntityState {
                entity_name: entity_name.clone(),
                position,
                view_direction: facts.view_direction.map(|d| d.as_wire().to_string()),
                current_health: facts.current_health,
                max_health: facts.max_health,
                animation: facts.animation,
                tint_color: facts.tint_color,
            });
        }

        Some(Message::Snapshot {
            server_tick,
            entities: list,
        })
    }

    fn apply_snapshot(
        &mut self,
        server_tick: u64,
        entities: &[EntityState],
        world: &mut dyn EntityWorld,
    ) {
        if !self.accept_tick(server_tick) {
            warn!(
                "Dropping stale snapshot tick {server_tick}; latest applied is {:?}",
                self.latest_server_tick
            );
            return;
        }

        for state in entities {
            if !world.contains(&state.entity_name) {
                // A later version may answer this with a spawn request.
                warn!(
                    "No local entity named '{}' for snapshot; skipping",
                    state.entity_name
                );
                continue;
            }

            world.set_position(&state.entity_name, state.position);

            if let Some(wire) = &state.view_direction {
                match Direction::from_wire(wire) {
                    Some(direction) => world.set_view_direction(&state.entity_name, direction),
                    None => debug!("Ignoring unknown view direction '{wire}'"),
                }
            }
            if let Some(animation) = &state.animation {
                world.set_animation(&state.entity_name, animation);
            }
            if let Some(tint) = state.tint_color {
                world.set_tint(&state.entity_name, tint);
            }
            if let Some(health) = state.current_health {
                world.set_current_health(&state.entity_name, health);
            }
            if let Some(health) = state.max_health {
                world.set_max_health(&state.entity_name, health);
            }
        }
    }
}
