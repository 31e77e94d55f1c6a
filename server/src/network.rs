//! Server transport endpoint: reliable listener and datagram socket on one port.

use crate::session::{ConnId, SessionRegistry};
use log::{debug, error, info, warn};
use shared::codec::{self, WireError, MAX_DATAGRAM_RECV};
use shared::messages::{Action, ClientId, Message, Point};
use shared::NetError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{watch, RwLock};
use tokio::time::{sleep, Duration};

/// One decoded unit of player intent, queued for the tick loop.
#[derive(Debug, Clone, PartialEq)]
pub struct InputEvent {
    pub client_id: ClientId,
    pub action: Action,
    pub point: Point,
}

/// A spawn-description request, answered by the tick loop over the
/// requester's reliable channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub client_id: ClientId,
    pub entity_name: String,
}

/// Outbound datagram commands consumed by the sender task.
#[derive(Debug, Clone)]
pub enum UdpOut {
    /// Send to one address.
    To(SocketAddr, Message),
    /// Fan out to every registered datagram peer.
    Broadcast(Message),
}

/// What the accept path tells freshly connected clients about the level.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelInfo {
    pub level_name: String,
    pub spawn_point: Option<Point>,
}

/// The server's transport endpoint.
///
/// Owns the listener and the datagram socket plus the tasks that pump them.
/// I/O tasks decode and enqueue; nothing here touches simulation state.
pub struct ServerEndpoint {
    registry: Arc<RwLock<SessionRegistry>>,
    udp_out_tx: UnboundedSender<UdpOut>,
    level_info: Arc<RwLock<Option<LevelInfo>>>,
    shutdown_tx: watch::Sender<bool>,
    local_addr: SocketAddr,
}

impl ServerEndpoint {
    /// Binds the reliable listener first, then the datagram socket on the
    /// same port, and starts the receive/send tasks. Must run inside a tokio
    /// runtime. Returns the endpoint together with the receivers for the
    /// input and spawn-request queues, which belong to the tick loop.
    pub async fn bind(
        host: &str,
        port: u16,
    ) -> Result<
        (
            ServerEndpoint,
            UnboundedReceiver<InputEvent>,
            UnboundedReceiver<SpawnRequest>,
        ),
        NetError,
    > {
        let listener = TcpListener::bind((host, port)).await?;
        let local_addr = listener.local_addr()?;
        let udp = Arc::new(UdpSocket::bind((host, local_addr.port())).await?);

        let registry = Arc::new(RwLock::new(SessionRegistry::new()));
        let level_info: Arc<RwLock<Option<LevelInfo>>> = Arc::new(RwLock::new(None));
        let (udp_out_tx, udp_out_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (spawn_tx, spawn_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        spawn_accept_task(
            listener,
            Arc::clone(&registry),
            Arc::clone(&level_info),
            spawn_tx,
            shutdown_rx.clone(),
        );
        spawn_datagram_receiver(
            Arc::clone(&udp),
            Arc::clone(&registry),
            input_tx,
            shutdown_rx.clone(),
        );
        spawn_datagram_sender(udp, Arc::clone(&registry), udp_out_rx, shutdown_rx);

        info!("Server endpoint listening on {local_addr} (reliable + datagram)");

        Ok((
            ServerEndpoint {
                registry,
                udp_out_tx,
                level_info,
                shutdown_tx,
                local_addr,
            },
            input_rx,
            spawn_rx,
        ))
    }

    pub fn registry(&self) -> Arc<RwLock<SessionRegistry>> {
        Arc::clone(&self.registry)
    }

    pub fn level_info(&self) -> Arc<RwLock<Option<LevelInfo>>> {
        Arc::clone(&self.level_info)
    }

    /// Handle for queueing outbound datagrams from any thread.
    pub fn udp_out(&self) -> UnboundedSender<UdpOut> {
        self.udp_out_tx.clone()
    }

    pub fn shutdown_watch(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Tells every endpoint task to wind down.
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

fn spawn_accept_task(
    listener: TcpListener,
    registry: Arc<RwLock<SessionRegistry>>,
    level_info: Arc<RwLock<Option<LevelInfo>>>,
    spawn_tx: UnboundedSender<SpawnRequest>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut next_conn_id: ConnId = 1;
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let conn_id = next_conn_id;
                        next_conn_id += 1;
                        debug!("Accepted reliable connection {conn_id} from {peer}");
                        tokio::spawn(serve_connection(
                            stream,
                            conn_id,
                            peer,
                            Arc::clone(&registry),
                            Arc::clone(&level_info),
                            spawn_tx.clone(),
                            shutdown_rx.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Accept error: {e}");
                        sleep(Duration::from_millis(10)).await;
                    }
                },
            }
        }
    });
}

/// Reads frames from one reliable connection and routes them.
///
/// The writer half is serviced by its own task fed through an unbounded
/// channel; that channel's sender doubles as the session's reliable handle.
async fn serve_connection(
    stream: TcpStream,
    conn_id: ConnId,
    peer: SocketAddr,
    registry: Arc<RwLock<SessionRegistry>>,
    level_info: Arc<RwLock<Option<LevelInfo>>>,
    spawn_tx: UnboundedSender<SpawnRequest>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let (mut read_half, write_half) = stream.into_split();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    tokio::spawn(write_frames(write_half, out_rx, peer));

    let mut accepted: Option<ClientId> = None;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            frame = codec::read_frame(&mut read_half) => match frame {
                Ok(Some(Message::ConnectRequest { player_name })) => {
                    if accepted.is_some() {
                        warn!("Duplicate connect request from {peer}; ignoring");
                        continue;
                    }
                    let result = registry
                        .write()
                        .await
                        .accept_connect(conn_id, out_tx.clone(), &player_name);
                    match result {
                        Ok(client_id) => {
                            accepted = Some(client_id);
                            let _ = out_tx.send(Message::ConnectAck { client_id });
                            if let Some(info) = level_info.read().await.clone() {
                                let _ = out_tx.send(Message::LevelChange {
                                    level_name: info.level_name,
                                    spawn_point: info.spawn_point,
                                });
                            } else {
                                debug!("No level loaded yet; skipping initial level change");
                            }
                        }
                        Err(reason) => {
                            let _ = out_tx.send(Message::ConnectReject { reason });
                            break;
                        }
                    }
                }
                Ok(Some(Message::RequestEntitySpawn { entity_name })) => match accepted {
                    Some(client_id) => {
                        let _ = spawn_tx.send(SpawnRequest { client_id, entity_name });
                    }
                    None => warn!("Spawn request from {peer} before handshake; dropping"),
                },
                Ok(Some(other)) => {
                    debug!("Unexpected {:?} on reliable channel from {peer}", other.kind());
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Reliable channel error from {peer}: {e}");
                    break;
                }
            },
        }
    }

    if registry.write().await.drop_conn(conn_id).is_none() {
        debug!("Connection {conn_id} from {peer} closed before handshake");
    }
}

/// Drains a connection's outbound queue onto its socket.
async fn write_frames(
    mut write_half: OwnedWriteHalf,
    mut out_rx: UnboundedReceiver<Message>,
    peer: SocketAddr,
) {
    while let Some(message) = out_rx.recv().await {
        match codec::write_frame(&mut write_half, &message).await {
            Ok(()) => {}
            Err(e @ WireError::Oversized { .. }) => {
                warn!("Dropping oversized reliable message to {peer}: {e}");
            }
            Err(e) => {
                warn!("Reliable send to {peer} failed: {e}");
                break;
            }
        }
    }
}

fn spawn_datagram_receiver(
    udp: Arc<UdpSocket>,
    registry: Arc<RwLock<SessionRegistry>>,
    input_tx: UnboundedSender<InputEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM_RECV];
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                received = udp.recv_from(&mut buf) => match received {
                    Ok((len, sender)) => match codec::decode_datagram(&buf[..len]) {
                        Ok(Message::RegisterUdp { client_id }) => {
                            registry.write().await.register_datagram(client_id, sender);
                        }
                        Ok(Message::Input { client_id, action, point }) => {
                            let _ = input_tx.send(InputEvent { client_id, action, point });
                        }
                        Ok(other) => {
                            debug!("Dropping unexpected {:?} datagram from {sender}", other.kind());
                        }
                        Err(e) => warn!("Undecodable datagram from {sender}: {e}"),
                    },
                    Err(e) => {
                        error!("Datagram receive error: {e}");
                        sleep(Duration::from_millis(10)).await;
                    }
                },
            }
        }
    });
}

fn spawn_datagram_sender(
    udp: Arc<UdpSocket>,
    registry: Arc<RwLock<SessionRegistry>>,
    mut udp_out_rx: UnboundedReceiver<UdpOut>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                command = udp_out_rx.recv() => match command {
                    Some(UdpOut::To(addr, message)) => {
                        send_datagram(&udp, addr, &message).await;
                    }
                    Some(UdpOut::Broadcast(message)) => {
                        let peers = registry.read().await.datagram_peers();
                        for (_, addr) in peers {
                            send_datagram(&udp, addr, &message).await;
                        }
                    }
                    None => break,
                },
            }
        }
    });
}

async fn send_datagram(udp: &UdpSocket, addr: SocketAddr, message: &Message) {
    match codec::encode_datagram(message) {
        Ok(payload) => {
            if let Err(e) = udp.send_to(&payload, addr).await {
                warn!("Datagram send to {addr} failed: {e}");
            }
        }
        Err(e) => warn!("Dropping outbound datagram to {addr}: {e}"),
    }
}
