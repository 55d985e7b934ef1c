use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::reliable::ReliableChannel;
use super::stats::PacketLossSimulation;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Server-side view of one client. Keyed by the id of the player entity the
/// connection owns, which doubles as the connection identity.
#[derive(Debug)]
pub struct ClientConnection {
    pub addr: SocketAddr,
    pub entity_id: u32,
    pub state: ConnectionState,
    pub connected_at: Instant,
    pub last_receive_time: Instant,
    pub reliable: ReliableChannel,
    pub packet_loss_sim: PacketLossSimulation,
}

impl ClientConnection {
    pub fn new(addr: SocketAddr, entity_id: u32) -> Self {
        let now = Instant::now();
        Self {
            addr,
            entity_id,
            state: ConnectionState::Connected,
            connected_at: now,
            last_receive_time: now,
            reliable: ReliableChannel::default(),
            packet_loss_sim: PacketLossSimulation::default(),
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_receive_time.elapsed() > timeout
    }

    pub fn touch(&mut self) {
        self.last_receive_time = Instant::now();
    }
}

#[derive(Debug)]
pub struct ConnectionManager {
    clients_by_addr: HashMap<SocketAddr, u32>,
    clients: HashMap<u32, ClientConnection>,
    max_clients: usize,
    timeout: Duration,
}

impl ConnectionManager {
    pub fn new(max_clients: usize) -> Self {
        Self::with_timeout(max_clients, DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(max_clients: usize, timeout_secs: u64) -> Self {
        Self {
            clients_by_addr: HashMap::new(),
            clients: HashMap::new(),
            max_clients,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.clients.len() < self.max_clients
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn insert(&mut self, addr: SocketAddr, entity_id: u32) -> &mut ClientConnection {
        self.clients_by_addr.insert(addr, entity_id);
        self.clients
            .entry(entity_id)
            .or_insert_with(|| ClientConnection::new(addr, entity_id))
    }

    pub fn get_by_addr(&self, addr: &SocketAddr) -> Option<&ClientConnection> {
        self.clients_by_addr
            .get(addr)
            .and_then(|id| self.clients.get(id))
    }

    pub fn get_by_addr_mut(&mut self, addr: &SocketAddr) -> Option<&mut ClientConnection> {
        let id = *self.clients_by_addr.get(addr)?;
        self.clients.get_mut(&id)
    }

    pub fn get(&self, entity_id: u32) -> Option<&ClientConnection> {
        self.clients.get(&entity_id)
    }

    pub fn get_mut(&mut self, entity_id: u32) -> Option<&mut ClientConnection> {
        self.clients.get_mut(&entity_id)
    }

    pub fn remove(&mut self, entity_id: u32) -> Option<ClientConnection> {
        let conn = self.clients.remove(&entity_id)?;
        self.clients_by_addr.remove(&conn.addr);
        Some(conn)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientConnection> {
        self.clients.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClientConnection> {
        self.clients.values_mut()
    }

    /// Ids of connections silent for longer than the timeout. The caller
    /// owns teardown so the entity and its buffers go with the connection.
    pub fn timed_out(&self) -> Vec<u32> {
        self.clients
            .values()
            .filter(|c| c.is_timed_out(self.timeout))
            .map(|c| c.entity_id)
            .collect()
    }

    pub fn connected_count(&self) -> usize {
        self.clients
            .values()
            .filter(|c| c.state == ConnectionState::Connected)
            .count()
    }
}
