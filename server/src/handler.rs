//! Game-facing facade for running the authoritative server.

use crate::game::AuthoritativeLoop;
use crate::level::LevelCatalog;
use crate::network::{ServerEndpoint, UdpOut};
use crate::sim::TickRunner;
use log::{info, warn};
use shared::dispatcher::MessageDispatcher;
use shared::handler::{
    ConnectionListener, LifecycleEvent, NetError, NetworkHandler,
};
use shared::messages::{Action, Message, Point};
use shared::translator::SnapshotTranslator;
use shared::world::EntityWorld;
use shared::{DEFAULT_PORT, SNAPSHOT_HZ, TICK_HZ};
use std::net::SocketAddr;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub tick_hz: u32,
    pub snapshot_hz: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tick_hz: TICK_HZ,
            snapshot_hz: SNAPSHOT_HZ,
        }
    }
}

/// Hosts the transport endpoint and the authoritative loop.
///
/// The handler owns a private tokio runtime whose tasks do all socket work,
/// so the host process needs no async machinery of its own. Start order is
/// reliable listener, datagram socket, tick loop; shutdown reverses it. The
/// world, level catalog, and tick runner move into the loop at `start` and
/// never come back: a stopped server handler cannot be restarted.
pub struct ServerHandler<W: EntityWorld + 'static> {
    config: ServerConfig,
    world: Option<W>,
    levels: Option<Box<dyn LevelCatalog>>,
    runner: Option<TickRunner<W>>,
    translator: Option<Box<dyn SnapshotTranslator>>,
    dispatcher: MessageDispatcher,
    listeners: Vec<Box<dyn ConnectionListener>>,
    lifecycle_tx: UnboundedSender<LifecycleEvent>,
    lifecycle_rx: UnboundedReceiver<LifecycleEvent>,
    runtime: Option<Runtime>,
    endpoint: Option<ServerEndpoint>,
    udp_out: Option<UnboundedSender<UdpOut>>,
    loop_handle: Option<JoinHandle<()>>,
    running: bool,
}

impl<W: EntityWorld + 'static> ServerHandler<W> {
    pub fn new(
        config: ServerConfig,
        world: W,
        levels: Box<dyn LevelCatalog>,
        runner: TickRunner<W>,
    ) -> Self {
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        ServerHandler {
            config,
            world: Some(world),
            levels: Some(levels),
            runner: Some(runner),
            translator: None,
            dispatcher: MessageDispatcher::new(),
            listeners: Vec::new(),
            lifecycle_tx,
            lifecycle_rx,
            runtime: None,
            endpoint: None,
            udp_out: None,
            loop_handle: None,
            running: false,
        }
    }

    /// The bound address, once started. Useful when the configured port is 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.as_ref().map(|e| e.local_addr())
    }
}

impl<W: EntityWorld + 'static> NetworkHandler for ServerHandler<W> {
    fn start(&mut self) -> Result<(), NetError> {
        if self.running {
            warn!("Server handler already started; ignoring");
            return Ok(());
        }
        let translator = match self.translator.take() {
            Some(t) => t,
            None => {
                return Err(NetError::Config(
                    "snapshot translator not set; call set_snapshot_translator() before start()"
                        .to_string(),
                ))
            }
        };
        let (world, levels, runner) = match (
            self.world.take(),
            self.levels.take(),
            self.runner.take(),
        ) {
            (Some(w), Some(l), Some(r)) => (w, l, r),
            _ => {
                return Err(NetError::Config(
                    "server handler cannot be restarted after shutdown".to_string(),
                ))
            }
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        let (endpoint, input_rx, spawn_rx) =
            runtime.block_on(ServerEndpoint::bind(&self.config.host, self.config.port))?;

        let game_loop = AuthoritativeLoop::new(
            endpoint.registry(),
            endpoint.udp_out(),
            input_rx,
            spawn_rx,
            endpoint.level_info(),
            world,
            levels,
            runner,
            translator,
            self.config.tick_hz,
            self.config.snapshot_hz,
        );
        let loop_handle = runtime.spawn(game_loop.run(endpoint.shutdown_watch()));

        self.udp_out = Some(endpoint.udp_out());
        self.endpoint = Some(endpoint);
        self.loop_handle = Some(loop_handle);
        self.runtime = Some(runtime);
        self.running = true;
        let _ = self.lifecycle_tx.send(LifecycleEvent::Connected);
        Ok(())
    }

    fn shutdown(&mut self, reason: &str) {
        if !self.running {
            warn!("Server handler already stopped; ignoring shutdown ({reason})");
            return;
        }
        self.running = false;
        info!("Server handler shutting down: {reason}");

        // Tick loop drains first, sockets close after, runtime last.
        if let Some(endpoint) = &self.endpoint {
            endpoint.signal_shutdown();
        }
        if let (Some(runtime), Some(handle)) = (self.runtime.as_ref(), self.loop_handle.take()) {
            runtime.block_on(async {
                let _ = timeout(Duration::from_secs(1), handle).await;
            });
        }
        self.endpoint.take();
        self.udp_out.take();
        if let Some(runtime) = self.runtime.take() {
            drop(runtime);
        }

        let _ = self
            .lifecycle_tx
            .send(LifecycleEvent::Disconnected(Some(reason.to_string())));
    }

    fn poll_and_dispatch(&mut self, _world: &mut dyn EntityWorld) {
        while let Ok(event) = self.lifecycle_rx.try_recv() {
            match event {
                LifecycleEvent::Connected => {
                    for listener in &mut self.listeners {
                        listener.on_connected();
                    }
                }
                LifecycleEvent::Disconnected(cause) => {
                    for listener in &mut self.listeners {
                        listener.on_disconnected(cause.as_deref());
                    }
                }
            }
        }
    }

    /// Broadcasts a message to every registered datagram peer.
    fn send(&mut self, message: Message) {
        match &self.udp_out {
            Some(udp_out) => {
                let _ = udp_out.send(UdpOut::Broadcast(message));
            }
            None => warn!("Server handler not started; dropping broadcast"),
        }
    }

    fn send_input(&mut self, _action: Action, _point: Point) {
        warn!("Server handler does not send inputs; dropping");
    }

    fn add_connection_listener(&mut self, listener: Box<dyn ConnectionListener>) {
        self.listeners.push(listener);
    }

    fn set_snapshot_translator(&mut self, translator: Box<dyn SnapshotTranslator>) {
        if self.running {
            warn!("Cannot replace snapshot translator while running; ignoring");
            return;
        }
        self.translator = Some(translator);
    }

    fn dispatcher_mut(&mut self) -> &mut MessageDispatcher {
        &mut self.dispatcher
    }

    fn is_connected(&self) -> bool {
        self.running
    }

    fn is_server(&self) -> bool {
        true
    }
}
