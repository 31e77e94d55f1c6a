//! Session bookkeeping for connected clients.
//!
//! A session binds a client id to a player name, the reliable-channel sender
//! of its connection, and, once registered, a datagram return address. All
//! mutation happens on I/O reception; every read hands out snapshot copies so
//! the tick loop never observes a half-updated registry.

use log::{debug, info, warn};
use shared::messages::{ClientId, Message};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc::UnboundedSender;

/// Identifier of one accepted reliable connection, independent of the client
/// id that may later be bound to it.
pub type ConnId = u64;

/// Reject reason sent for every name validation failure.
pub const INVALID_NAME_REASON: &str =
    "Invalid player name. Must be non-empty, without underscores, and unique.";

/// Registry of all live sessions.
///
/// Owned behind a lock by the endpoint; the tick loop and broadcast paths
/// only ever call the snapshot-copy readers.
#[derive(Default)]
pub struct SessionRegistry {
    next_client_id: ClientId,
    names: HashMap<ClientId, String>,
    datagram: HashMap<ClientId, SocketAddr>,
    conns: HashMap<ConnId, ClientId>,
    reliable: HashMap<ClientId, UnboundedSender<Message>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry {
            next_client_id: 1,
            names: HashMap::new(),
            datagram: HashMap::new(),
            conns: HashMap::new(),
            reliable: HashMap::new(),
        }
    }

    /// Validates the handshake and creates a session.
    ///
    /// On success the next client id is allocated and bound to the
    /// connection, the name, and the reliable sender. On failure nothing is
    /// allocated and the canonical reject reason is returned.
    pub fn accept_connect(
        &mut self,
        conn: ConnId,
        reliable: UnboundedSender<Message>,
        player_name: &str,
    ) -> Result<ClientId, String> {
        if !self.is_valid_player_name(player_name) {
            warn!("Rejecting connect with invalid player name '{player_name}'");
            return Err(INVALID_NAME_REASON.to_string());
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        self.names.insert(client_id, player_name.to_string());
        self.conns.insert(conn, client_id);
        self.reliable.insert(client_id, reliable);

        info!("Accepted player '{player_name}' as client {client_id}");
        Ok(client_id)
    }

    /// Learns or updates a client's datagram return address.
    ///
    /// Accepted only while the client id is bound to an active reliable
    /// connection; anything else is dropped without side effect.
    pub fn register_datagram(&mut self, client_id: ClientId, addr: SocketAddr) -> bool {
        if !self.reliable.contains_key(&client_id) {
            warn!("Ignoring datagram registration for unknown client {client_id} from {addr}");
            return false;
        }

        match self.datagram.insert(client_id, addr) {
            Some(previous) if previous == addr => {
                debug!("Redundant datagram registration for client {client_id} at {addr}");
            }
            _ => info!("Registered datagram address {addr} for client {client_id}"),
        }
        true
    }

    /// Tears down the session bound to a closed connection.
    ///
    /// Removes the connection binding, the datagram address, the name, and
    /// the reliable sender in one step; returns the freed client id, if the
    /// connection ever completed a handshake.
    pub fn drop_conn(&mut self, conn: ConnId) -> Option<ClientId> {
        let client_id = self.conns.remove(&conn)?;
        self.names.remove(&client_id);
        self.datagram.remove(&client_id);
        self.reliable.remove(&client_id);
        info!("Session for client {client_id} closed");
        Some(client_id)
    }

    /// Snapshot of every registered datagram peer, for broadcast fan-out.
    pub fn datagram_peers(&self) -> Vec<(ClientId, SocketAddr)> {
        self.datagram.iter().map(|(id, addr)| (*id, *addr)).collect()
    }

    /// Snapshot of every client id with an active reliable connection.
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.conns.values().copied().collect()
    }

    pub fn name_of(&self, client_id: ClientId) -> Option<String> {
        self.names.get(&client_id).cloned()
    }

    /// The reliable-channel sender for a client, if its session is live.
    pub fn reliable_sender(&self, client_id: ClientId) -> Option<UnboundedSender<Message>> {
        self.reliable.get(&client_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Non-empty, no underscore, and not currently held by another session.
    /// The underscore is reserved for server-generated fallback names.
    fn is_valid_player_name(&self, player_name: &str) -> bool {
        !player_name.trim().is_empty()
            && !player_name.contains('_')
            && !self.names.values().any(|name| name == player_name)
    }
}
