//! Client-side network handler.
//!
//! Owns the reliable stream and the datagram socket, runs the two-phase
//! handshake (connect request on stream-active, datagram registration with
//! retransmit after the acknowledgement), and queues everything it receives
//! for the game thread to drain via `poll_and_dispatch`.

use log::{debug, error, info, warn};
use shared::codec::{self, WireError};
use shared::dispatcher::MessageDispatcher;
use shared::handler::{
    ConnectionListener, ConnectionState, LifecycleEvent, NetError, NetworkHandler,
};
use shared::messages::{Action, ClientId, Message, Point};
use shared::translator::SnapshotTranslator;
use shared::world::EntityWorld;
use shared::MAX_DATAGRAM_RECV;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, UdpSocket};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::time::{interval, Duration};

/// Interval between datagram registration attempts.
const REGISTER_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Registration attempts before giving up; the first server snapshot cancels
/// the schedule early.
const REGISTER_MAX_ATTEMPTS: u32 = 5;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub player_name: String,
}

/// Connection flags shared between I/O tasks and the game thread.
#[derive(Debug, Default)]
struct ClientShared {
    client_id: AtomicU32,
    connected: AtomicBool,
    snapshot_seen: AtomicBool,
    state: AtomicU8,
}

impl ClientShared {
    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

/// The game-facing client handler.
///
/// `start` opens the reliable stream and an ephemeral datagram socket that is
/// logically connected to the server so the kernel filters foreign senders.
/// All reception lands in queues; the host must call
/// [`poll_and_dispatch`](NetworkHandler::poll_and_dispatch) once per frame.
pub struct ClientHandler {
    config: ClientConfig,
    dispatcher: MessageDispatcher,
    translator: Option<Box<dyn SnapshotTranslator>>,
    listeners: Vec<Box<dyn ConnectionListener>>,
    shared: Arc<ClientShared>,

    runtime: Option<Runtime>,
    inbound_rx: Option<UnboundedReceiver<Message>>,
    lifecycle_tx: UnboundedSender<LifecycleEvent>,
    lifecycle_rx: UnboundedReceiver<LifecycleEvent>,
    tcp_out_tx: Option<UnboundedSender<Message>>,
    udp_out_tx: Option<UnboundedSender<Message>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    running: bool,
}

impl ClientHandler {
    pub fn new(config: ClientConfig) -> Self {
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        ClientHandler {
            config,
            dispatcher: MessageDispatcher::new(),
            translator: None,
            listeners: Vec::new(),
            shared: Arc::new(ClientShared::default()),
            runtime: None,
            inbound_rx: None,
            lifecycle_tx,
            lifecycle_rx,
            tcp_out_tx: None,
            udp_out_tx: None,
            shutdown_tx: None,
            running: false,
        }
    }

    /// The id the server assigned, once the acknowledgement arrived.
    pub fn client_id(&self) -> Option<ClientId> {
        match self.shared.client_id.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state()
    }
}

impl NetworkHandler for ClientHandler {
    fn start(&mut self) -> Result<(), NetError> {
        if self.running {
            warn!("Client handler already started; ignoring");
            return Ok(());
        }
        if self.translator.is_none() {
            return Err(NetError::Config(
                "snapshot translator not set; call set_snapshot_translator() before start()"
                    .to_string(),
            ));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        let host = self.config.host.clone();
        let port = self.config.port;
        let (stream, udp) = runtime.block_on(async {
            let stream = TcpStream::connect((host.as_str(), port)).await?;
            let udp = UdpSocket::bind("0.0.0.0:0").await?;
            udp.connect((host.as_str(), port)).await?;
            Ok::<_, std::io::Error>((stream, Arc::new(udp)))
        })?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (tcp_out_tx, tcp_out_rx) = mpsc::unbounded_channel();
        let (udp_out_tx, udp_out_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.shared.connected.store(true, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Connecting);
        let _ = self.lifecycle_tx.send(LifecycleEvent::Connected);

        // Stream-active: the handshake goes out before anything else.
        let _ = tcp_out_tx.send(Message::ConnectRequest {
            player_name: self.config.player_name.clone(),
        });

        let (read_half, write_half) = stream.into_split();
        runtime.spawn(write_stream_frames(write_half, tcp_out_rx));
        runtime.spawn(read_stream_frames(
            read_half,
            Arc::clone(&self.shared),
            inbound_tx.clone(),
            self.lifecycle_tx.clone(),
            udp_out_tx.clone(),
            shutdown_rx.clone(),
        ));
        runtime.spawn(read_datagrams(
            Arc::clone(&udp),
            Arc::clone(&self.shared),
            inbound_tx,
            shutdown_rx.clone(),
        ));
        runtime.spawn(write_datagrams(udp, udp_out_rx, shutdown_rx));

        self.inbound_rx = Some(inbound_rx);
        self.tcp_out_tx = Some(tcp_out_tx);
        self.udp_out_tx = Some(udp_out_tx);
        self.shutdown_tx = Some(shutdown_tx);
        self.runtime = Some(runtime);
        self.running = true;

        info!(
            "Client connected to {}:{} as '{}'",
            self.config.host, self.config.port, self.config.player_name
        );
        Ok(())
    }

    fn shutdown(&mut self, reason: &str) {
        if !self.running {
            warn!("Client handler already stopped; ignoring shutdown ({reason})");
            return;
        }
        self.running = false;
        info!("Client handler shutting down: {reason}");

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        self.tcp_out_tx.take();
        self.udp_out_tx.take();
        if let Some(runtime) = self.runtime.take() {
            drop(runtime);
        }

        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Disconnected);
        let _ = self
            .lifecycle_tx
            .send(LifecycleEvent::Disconnected(Some(reason.to_string())));
    }

    fn poll_and_dispatch(&mut self, world: &mut dyn EntityWorld) {
        // Lifecycle first, so listeners observe connects and disconnects
        // before any message that followed them.
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

        let Some(inbound_rx) = self.inbound_rx.as_mut() else {
            return;
        };
        while let Ok(message) = inbound_rx.try_recv() {
            if let Message::Snapshot {
                server_tick,
                entities,
            } = &message
            {
                match self.translator.as_mut() {
                    Some(translator) => {
                        translator.apply_snapshot(*server_tick, entities, world);
                    }
                    None => error!("Snapshot received but no translator is set"),
                }
            }
            self.dispatcher.dispatch(message);
        }
    }

    /// Sends a control message on the reliable channel.
    fn send(&mut self, message: Message) {
        if !self.shared.connected.load(Ordering::SeqCst) {
            warn!("Reliable channel not active; dropping message");
            return;
        }
        match &self.tcp_out_tx {
            Some(tcp_out_tx) => {
                let _ = tcp_out_tx.send(message);
            }
            None => warn!("Client handler not started; dropping message"),
        }
    }

    /// Stamps and sends one unit of player intent on the datagram channel.
    fn send_input(&mut self, action: Action, point: Point) {
        let client_id = self.shared.client_id.load(Ordering::SeqCst);
        if client_id == 0 {
            info!("Dropping input: no assigned client id yet");
            return;
        }
        if !self.shared.connected.load(Ordering::SeqCst) {
            warn!("Dropping input: not connected");
            return;
        }
        match &self.udp_out_tx {
            Some(udp_out_tx) => {
                let _ = udp_out_tx.send(Message::Input {
                    client_id,
                    action,
                    point,
                });
            }
            None => warn!("Client handler not started; dropping input"),
        }
    }

    fn add_connection_listener(&mut self, listener: Box<dyn ConnectionListener>) {
        self.listeners.push(listener);
    }

    fn set_snapshot_translator(&mut self, translator: Box<dyn SnapshotTranslator>) {
        self.translator = Some(translator);
    }

    fn dispatcher_mut(&mut self) -> &mut MessageDispatcher {
        &mut self.dispatcher
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn is_server(&self) -> bool {
        false
    }
}

impl Drop for ClientHandler {
    fn drop(&mut self) {
        if self.running {
            self.shutdown("handler dropped");
        }
    }
}

/// Drains the reliable outbound queue onto the stream.
async fn write_stream_frames(mut write_half: OwnedWriteHalf, mut out_rx: UnboundedReceiver<Message>) {
    while let Some(message) = out_rx.recv().await {
        match codec::write_frame(&mut write_half, &message).await {
            Ok(()) => {}
            Err(e @ WireError::Oversized { .. }) => {
                warn!("Dropping oversized reliable message: {e}");
            }
            Err(e) => {
                warn!("Reliable send failed: {e}");
                break;
            }
        }
    }
}

/// Reads reliable frames, intercepting the acknowledgement to kick off the
/// datagram registration; everything else is queued for the game thread.
async fn read_stream_frames(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    shared: Arc<ClientShared>,
    inbound_tx: UnboundedSender<Message>,
    lifecycle_tx: UnboundedSender<LifecycleEvent>,
    udp_out_tx: UnboundedSender<Message>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => return,
            frame = codec::read_frame(&mut read_half) => match frame {
                Ok(Some(Message::ConnectAck { client_id })) => {
                    info!("Connection acknowledged; client id {client_id}");
                    shared.client_id.store(client_id, Ordering::SeqCst);
                    shared.set_state(ConnectionState::Acknowledged);
                    tokio::spawn(register_datagram_channel(
                        client_id,
                        Arc::clone(&shared),
                        udp_out_tx.clone(),
                        shutdown_rx.clone(),
                    ));
                }
                Ok(Some(message)) => {
                    let _ = inbound_tx.send(message);
                }
                Ok(None) => {
                    info!("Server closed the reliable channel");
                    shared.connected.store(false, Ordering::SeqCst);
                    shared.set_state(ConnectionState::Disconnected);
                    let _ = lifecycle_tx.send(LifecycleEvent::Disconnected(None));
                    return;
                }
                Err(e) => {
                    warn!("Reliable channel error: {e}");
                    shared.connected.store(false, Ordering::SeqCst);
                    shared.set_state(ConnectionState::Disconnected);
                    let _ = lifecycle_tx.send(LifecycleEvent::Disconnected(Some(e.to_string())));
                    return;
                }
            },
        }
    }
}

/// Announces the datagram return address, retrying on a fixed schedule.
///
/// Cancels itself as soon as the first snapshot proves the server learned the
/// address, after the attempt budget, or on shutdown, so no timer outlives
/// the handler.
async fn register_datagram_channel(
    client_id: ClientId,
    shared: Arc<ClientShared>,
    udp_out_tx: UnboundedSender<Message>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut attempts = 0u32;
    let mut timer = interval(REGISTER_RETRY_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => return,
            _ = timer.tick() => {
                if shared.snapshot_seen.load(Ordering::SeqCst) {
                    debug!("Datagram channel confirmed after {attempts} attempt(s)");
                    return;
                }
                attempts += 1;
                if attempts > REGISTER_MAX_ATTEMPTS {
                    warn!("Datagram registration attempts exhausted");
                    return;
                }
                debug!("Sending datagram registration attempt {attempts}");
                if udp_out_tx.send(Message::RegisterUdp { client_id }).is_err() {
                    return;
                }
            },
        }
    }
}

/// Receives datagrams on the connected socket and queues them.
async fn read_datagrams(
    udp: Arc<UdpSocket>,
    shared: Arc<ClientShared>,
    inbound_tx: UnboundedSender<Message>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_RECV];
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => return,
            received = udp.recv(&mut buf) => match received {
                Ok(len) => match codec::decode_datagram(&buf[..len]) {
                    Ok(message) => {
                        if matches!(message, Message::Snapshot { .. })
                            && !shared.snapshot_seen.swap(true, Ordering::SeqCst)
                        {
                            shared.set_state(ConnectionState::DatagramRegistered);
                            debug!("First snapshot received; datagram channel is live");
                        }
                        let _ = inbound_tx.send(message);
                    }
                    Err(e) => warn!("Undecodable datagram: {e}"),
                },
                Err(e) => {
                    error!("Datagram receive error: {e}");
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            },
        }
    }
}

/// Drains the datagram outbound queue onto the socket, enforcing the cap.
async fn write_datagrams(
    udp: Arc<UdpSocket>,
    mut out_rx: UnboundedReceiver<Message>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => return,
            message = out_rx.recv() => match message {
                Some(message) => match codec::encode_datagram(&message) {
                    Ok(payload) => {
                        if let Err(e) = udp.send(&payload).await {
                            warn!("Datagram send failed: {e}");
                        }
                    }
                    Err(e) => warn!("Dropping outbound datagram: {e}"),
                },
                None => return,
            },
        }
    }
}
