//! Authoritative tick loop: consumes inputs, advances the world, broadcasts
//! snapshots.

use crate::level::LevelCatalog;
use crate::network::{InputEvent, LevelInfo, SpawnRequest, UdpOut};
use crate::session::SessionRegistry;
use crate::sim::TickRunner;
use log::{debug, info, warn};
use shared::messages::{Action, ClientId, Direction, Message};
use shared::translator::SnapshotTranslator;
use shared::world::EntityWorld;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, Duration};

/// Fixed-rate authoritative simulation.
///
/// Runs as one dedicated task. Simulation and snapshot emission share that
/// task; when their deadlines coincide the simulation step always runs first.
/// The loop owns the world outright: nothing outside it may read or mutate
/// simulation state.
pub struct AuthoritativeLoop<W: EntityWorld> {
    registry: Arc<RwLock<SessionRegistry>>,
    udp_out: UnboundedSender<UdpOut>,
    input_rx: UnboundedReceiver<InputEvent>,
    spawn_rx: UnboundedReceiver<SpawnRequest>,
    level_info: Arc<RwLock<Option<LevelInfo>>>,
    world: W,
    levels: Box<dyn LevelCatalog>,
    runner: TickRunner<W>,
    translator: Box<dyn SnapshotTranslator>,
    tick_hz: u32,
    snapshot_hz: u32,

    /// Entities currently bound to sessions, keyed by client id.
    entities: HashMap<ClientId, String>,
    server_tick: u64,
    game_over_sent: bool,
}

impl<W: EntityWorld + 'static> AuthoritativeLoop<W> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<RwLock<SessionRegistry>>,
        udp_out: UnboundedSender<UdpOut>,
        input_rx: UnboundedReceiver<InputEvent>,
        spawn_rx: UnboundedReceiver<SpawnRequest>,
        level_info: Arc<RwLock<Option<LevelInfo>>>,
        world: W,
        levels: Box<dyn LevelCatalog>,
        runner: TickRunner<W>,
        translator: Box<dyn SnapshotTranslator>,
        tick_hz: u32,
        snapshot_hz: u32,
    ) -> Self {
        AuthoritativeLoop {
            registry,
            udp_out,
            input_rx,
            spawn_rx,
            level_info,
            world,
            levels,
            runner,
            translator,
            tick_hz: tick_hz.max(1),
            snapshot_hz: snapshot_hz.max(1),
            entities: HashMap::new(),
            server_tick: 0,
            game_over_sent: false,
        }
    }

    /// Runs until the shutdown signal flips.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        self.announce_level().await;

        let mut tick_interval =
            interval(Duration::from_millis((1_000 / self.tick_hz as u64).max(1)));
        let mut snapshot_interval =
            interval(Duration::from_millis((1_000 / self.snapshot_hz as u64).max(1)));

        info!(
            "Authoritative loop started: simulation {}Hz, snapshots {}Hz",
            self.tick_hz, self.snapshot_hz
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                _ = tick_interval.tick() => self.tick().await,
                _ = snapshot_interval.tick() => self.emit_snapshot(),
            }
        }

        info!("Authoritative loop stopped at tick {}", self.server_tick);
    }

    /// Publishes the current level for the accept path and broadcasts it.
    async fn announce_level(&mut self) {
        let Some(level_name) = self.levels.current_level() else {
            warn!("No current level to announce");
            return;
        };

        *self.level_info.write().await = Some(LevelInfo {
            level_name: level_name.clone(),
            spawn_point: None,
        });
        info!("Broadcasting level change: {level_name}");
        let _ = self.udp_out.send(UdpOut::Broadcast(Message::LevelChange {
            level_name,
            spawn_point: None,
        }));
    }

    async fn tick(&mut self) {
        self.server_tick = self.server_tick.wrapping_add(1);
        self.reconcile_sessions().await;
        self.drain_inputs();
        self.serve_spawn_requests().await;
        self.runner.run_one_frame(&mut self.world);

        if !self.game_over_sent && self.levels.campaign_over() {
            info!("Campaign exhausted; broadcasting game over");
            let _ = self.udp_out.send(UdpOut::Broadcast(Message::GameOver));
            self.game_over_sent = true;
        }
    }

    /// Aligns the entity set with the session set: every session gets an
    /// entity on its first tick, departed sessions lose theirs.
    async fn reconcile_sessions(&mut self) {
        let (ids, names) = {
            let registry = self.registry.read().await;
            let ids = registry.client_ids();
            let names: HashMap<ClientId, String> = ids
                .iter()
                .filter_map(|id| registry.name_of(*id).map(|name| (*id, name)))
                .collect();
            (ids, names)
        };

        for client_id in &ids {
            if self.entities.contains_key(client_id) {
                continue;
            }
            let player_name = names
                .get(client_id)
                .cloned()
                .unwrap_or_else(|| format!("player-{client_id}"));
            let entity_name = self
                .world
                .spawn_player(&player_name, self.levels.start_position());
            info!("Spawned entity '{entity_name}' for client {client_id}");
            self.entities.insert(*client_id, entity_name);
        }

        let departed: Vec<ClientId> = self
            .entities
            .keys()
            .filter(|client_id| !ids.contains(client_id))
            .copied()
            .collect();
        for client_id in departed {
            if let Some(entity_name) = self.entities.remove(&client_id) {
                self.world.remove_entity(&entity_name);
                info!("Removed entity '{entity_name}' for departed client {client_id}");
            }
        }
    }

    /// Applies every queued input to the entity of its sender.
    ///
    /// Inputs for client ids without an entity are discarded; best-effort
    /// ordering and duplicates are tolerated because each action is applied
    /// independently.
    fn drain_inputs(&mut self) {
        while let Ok(event) = self.input_rx.try_recv() {
            let Some(entity_name) = self.entities.get(&event.client_id) else {
                debug!("Dropping input for unknown client {}", event.client_id);
                continue;
            };

            match event.action {
                Action::Move => match Direction::from_vector(event.point) {
                    Some(direction) => self.world.apply_move(entity_name, direction),
                    None => debug!("Move input with zero vector; ignoring"),
                },
                Action::MovePath => self.world.apply_move_path(entity_name, event.point),
                Action::CastSkill => self.world.apply_skill(entity_name, event.point),
                Action::Interact => self.world.apply_interact(entity_name, event.point),
            }
        }
    }

    /// Answers queued spawn-description requests over the requester's
    /// reliable channel. Runs here so entity reads stay on the tick task.
    async fn serve_spawn_requests(&mut self) {
        while let Ok(request) = self.spawn_rx.try_recv() {
            let Some(facts) = self.world.facts(&request.entity_name) else {
                warn!(
                    "Client {} requested spawn of unknown entity '{}'",
                    request.client_id, request.entity_name
                );
                continue;
            };
            let Some(position) = facts.position else {
                warn!(
                    "Entity '{}' has no position; cannot describe it",
                    request.entity_name
                );
                continue;
            };

            let reply = self.registry.read().await.reliable_sender(request.client_id);
            let Some(reply) = reply else {
                debug!(
                    "Client {} vanished before spawn reply could be sent",
                    request.client_id
                );
                continue;
            };

            let _ = reply.send(Message::EntitySpawnEvent {
                entity_name: request.entity_name,
                position,
                view_direction: facts.view_direction.map(|d| d.as_wire().to_string()),
                texture_path: facts.texture_path.unwrap_or_default(),
                animation: facts.animation.unwrap_or_default(),
                tint_color: facts.tint_color.unwrap_or(-1),
            });
        }
    }

    /// Builds and broadcasts one snapshot, unless the translator decides the
    /// tick is not newer than the last emitted one.
    fn emit_snapshot(&mut self) {
        let snapshot =
            self.translator
                .translate_to_snapshot(self.server_tick, &self.entities, &self.world);
        if let Some(message) = snapshot {
            let _ = self.udp_out.send(UdpOut::Broadcast(message));
        }
    }
}
