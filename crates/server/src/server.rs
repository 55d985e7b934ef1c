use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use glam::Vec2;
use rand::Rng;

use skirmish::{
    ConnectionManager, ConnectionState, InputCommand, NetworkEndpoint, NetworkSimulator,
    NetworkStats, Packet, PacketLossSimulation, PacketType, ReliableMessage, SimulationLoop,
    TickOutput,
};

use crate::config::ServerConfig;
use crate::events::{DisconnectReason, ServerEvent};
use crate::tui::ClientInfo;

const DRONE_RING_RADIUS: f32 = 8.0;

/// Authoritative UDP server. Owns the simulation loop and publishes one
/// snapshot plus per-client acks for every tick it runs.
pub struct GameServer {
    endpoint: NetworkEndpoint,
    connections: ConnectionManager,
    config: ServerConfig,
    simulation: SimulationLoop,
    simulator: NetworkSimulator,
    last_tick_time: Instant,
    running: Arc<AtomicBool>,
    start_time: Instant,
    pending_events: VecDeque<ServerEvent>,
}

impl GameServer {
    pub fn new(bind_addr: &str, config: ServerConfig) -> io::Result<Self> {
        let endpoint = NetworkEndpoint::bind(bind_addr)?;
        let mut simulation = SimulationLoop::new(config.tick_rate);

        let mut rng = rand::thread_rng();
        for i in 0..config.drone_count {
            let angle = i as f32 * TAU / config.drone_count as f32;
            let position = Vec2::from_angle(angle) * DRONE_RING_RADIUS;
            let spawn = simulation.spawn_drone(position, rng.gen_range(0.4..1.2));
            log::debug!("Spawned drone {}", spawn.entity.entity_id);
        }

        Ok(Self {
            endpoint,
            connections: ConnectionManager::with_timeout(
                config.max_clients,
                config.connection_timeout_secs,
            ),
            simulator: NetworkSimulator::new(config.global_packet_loss.clone().unwrap_or_default()),
            simulation,
            last_tick_time: Instant::now(),
            running: Arc::new(AtomicBool::new(true)),
            start_time: Instant::now(),
            pending_events: VecDeque::new(),
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.tick_once();
            for event in self.pending_events.drain(..) {
                log_event(&event);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.shutdown_connections();
    }

    pub fn shutdown_connections(&mut self) {
        let ids: Vec<u32> = self.connections.iter().map(|c| c.entity_id).collect();
        for entity_id in ids {
            self.kick_client(entity_id);
        }
    }

    pub fn kick_client(&mut self, entity_id: u32) {
        let Some(addr) = self.connections.get(entity_id).map(|c| c.addr) else {
            return;
        };
        // Bypass the simulated link so the client learns about it promptly.
        let packet = self.endpoint.create_packet(PacketType::Disconnect);
        if let Err(e) = self.endpoint.send_to(&packet, addr) {
            self.report_error(format!("Failed to send kick notice to {}: {}", addr, e));
        }
        self.remove_client(entity_id, DisconnectReason::Kicked);
    }

    /// Ingests everything on the socket, runs any ticks that are due, then
    /// flushes reliable resends and the simulated link.
    pub fn tick_once(&mut self) {
        let now = Instant::now();
        let delta = now.duration_since(self.last_tick_time).as_secs_f32();
        self.last_tick_time = now;

        if let Err(e) = self.process_network() {
            self.report_error(format!("Network error: {}", e));
        }

        for output in self.simulation.update(delta) {
            self.publish(&output);
        }

        self.resend_reliable(now);
        self.flush_simulator(now);

        for entity_id in self.connections.timed_out() {
            self.remove_client(entity_id, DisconnectReason::Timeout);
        }
    }

    fn publish(&mut self, output: &TickOutput) {
        let wire = output.snapshot.to_message();
        let targets: Vec<(SocketAddr, u32)> = self
            .connections
            .iter()
            .filter(|c| c.state == ConnectionState::Connected)
            .map(|c| (c.addr, c.entity_id))
            .collect();

        for (addr, entity_id) in targets {
            self.send(PacketType::Snapshot(wire.clone()), addr);
            if let Some(ack) = output.ack_for(entity_id) {
                self.send(PacketType::Ack(ack), addr);
            }
        }
    }

    fn resend_reliable(&mut self, now: Instant) {
        let mut due = Vec::new();
        for conn in self.connections.iter_mut() {
            for (sequence, message) in conn.reliable.due(now) {
                due.push((conn.addr, PacketType::Reliable { sequence, message }));
            }
        }
        for (addr, payload) in due {
            self.send(payload, addr);
        }
    }

    fn flush_simulator(&mut self, now: Instant) {
        for (packet, addr) in self.simulator.take_due(now) {
            if let Err(e) = self.endpoint.send_to(&packet, addr) {
                self.report_error(format!("Failed to send to {}: {}", addr, e));
            }
        }
    }

    fn send(&mut self, payload: PacketType, addr: SocketAddr) {
        let packet = self.endpoint.create_packet(payload);
        if self.simulator.is_active() {
            self.simulator.enqueue(packet, addr, Instant::now());
            return;
        }
        if let Err(e) = self.endpoint.send_to(&packet, addr) {
            self.report_error(format!("Failed to send to {}: {}", addr, e));
        }
    }

    fn report_error(&mut self, message: String) {
        log::error!("{}", message);
        self.pending_events.push_back(ServerEvent::Error { message });
    }

    fn process_network(&mut self) -> io::Result<()> {
        let packets = self.endpoint.receive()?;

        for (packet, addr) in packets {
            self.handle_packet(packet, addr);
        }

        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet.payload {
            PacketType::ConnectionRequest => self.handle_connection_request(addr),
            PacketType::Input(message) => {
                if let Some(entity_id) = self.connections.get_by_addr(&addr).map(|c| c.entity_id)
                {
                    self.simulation
                        .receive_input(entity_id, InputCommand::from_message(&message));
                }
            }
            PacketType::ReliableAck { sequence } => {
                if let Some(conn) = self.connections.get_by_addr_mut(&addr) {
                    conn.reliable.ack(sequence);
                }
            }
            PacketType::Ping { timestamp } => {
                if self.connections.get_by_addr(&addr).is_some() {
                    self.send(PacketType::Pong { timestamp }, addr);
                }
            }
            PacketType::Disconnect => {
                if let Some(entity_id) = self.connections.get_by_addr(&addr).map(|c| c.entity_id)
                {
                    self.remove_client(entity_id, DisconnectReason::Graceful);
                }
            }
            other => log::debug!("Ignoring unexpected {:?} from {}", other, addr),
        }

        if let Some(conn) = self.connections.get_by_addr_mut(&addr) {
            conn.touch();
        }
    }

    fn handle_connection_request(&mut self, addr: SocketAddr) {
        if let Some(entity_id) = self.connections.get_by_addr(&addr).map(|c| c.entity_id) {
            // The accept was lost; the client is retrying.
            self.send_accepted(entity_id, addr);
            return;
        }

        self.pending_events
            .push_back(ServerEvent::ClientConnecting { addr });

        if !self.connections.has_capacity() {
            let reason = "Server full".to_string();
            let packet = self.endpoint.create_packet(PacketType::ConnectionDenied {
                reason: reason.clone(),
            });
            if let Err(e) = self.endpoint.send_to(&packet, addr) {
                self.report_error(format!("Failed to deny {}: {}", addr, e));
            }
            log::warn!("Denied connection from {}: {}", addr, reason);
            self.pending_events
                .push_back(ServerEvent::ConnectionDenied { addr, reason });
            return;
        }

        let spawn = self.simulation.connect();
        let entity_id = spawn.entity.entity_id;

        let existing = self.simulation.spawn_messages();
        let conn = self.connections.insert(addr, entity_id);
        for message in existing {
            conn.reliable.push(ReliableMessage::Spawn(message));
        }
        if let Some(sim) = self.config.global_packet_loss.clone() {
            conn.packet_loss_sim = sim;
        }

        for other in self.connections.iter_mut() {
            if other.entity_id != entity_id {
                other.reliable.push(ReliableMessage::Spawn(spawn));
            }
        }

        self.send_accepted(entity_id, addr);
        log::info!("Client {} connected as entity {}", addr, entity_id);
        self.pending_events
            .push_back(ServerEvent::ClientConnected { entity_id, addr });
    }

    fn send_accepted(&mut self, entity_id: u32, addr: SocketAddr) {
        let payload = PacketType::ConnectionAccepted {
            entity_id,
            tick: self.simulation.tick(),
            tick_rate: self.simulation.tick_rate(),
        };
        self.send(payload, addr);
    }

    /// Tears down a connection and its entity. Everyone else is told through
    /// the reliable channel.
    fn remove_client(&mut self, entity_id: u32, reason: DisconnectReason) {
        let Some(conn) = self.connections.remove(entity_id) else {
            return;
        };
        self.simulation.despawn(entity_id);
        self.simulator.remove(&conn.addr);

        for other in self.connections.iter_mut() {
            other.reliable.discard_spawn_of(entity_id);
            other.reliable.push(ReliableMessage::Despawn { entity_id });
        }

        log::info!("Entity {} {}", entity_id, reason.as_str());
        self.pending_events
            .push_back(ServerEvent::ClientDisconnected { entity_id, reason });
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            tick: self.simulation.tick(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            client_count: self.connections.connected_count(),
            max_clients: self.connections.max_clients(),
            entity_count: self.simulation.world().entity_count(),
            network_stats: self.endpoint.stats().clone(),
            simulated_drops: self.simulator.dropped(),
        }
    }

    pub fn client_infos(&self) -> Vec<ClientInfo> {
        let mut infos: Vec<ClientInfo> = self
            .connections
            .iter()
            .filter(|c| c.state == ConnectionState::Connected)
            .map(|c| ClientInfo {
                entity_id: c.entity_id,
                addr: c.addr.to_string(),
                connected_secs: c.connected_at.elapsed().as_secs(),
                last_acked: self.simulation.last_acked(c.entity_id).unwrap_or(0),
                pending_reliable: c.reliable.len(),
                packet_loss_sim: c.packet_loss_sim.clone(),
            })
            .collect();
        infos.sort_by_key(|info| info.entity_id);
        infos
    }

    pub fn set_packet_loss_sim(&mut self, entity_id: u32, sim: PacketLossSimulation) {
        if let Some(conn) = self.connections.get_mut(entity_id) {
            conn.packet_loss_sim = sim.clone();
            self.simulator.set_config(conn.addr, sim);
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

fn log_event(event: &ServerEvent) {
    match event {
        ServerEvent::ClientConnecting { addr } => log::debug!("Connection request from {}", addr),
        ServerEvent::Error { message } => log::debug!("Error event: {}", message),
        // Already logged where they happen.
        _ => {}
    }
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub tick: u32,
    pub uptime_secs: u64,
    pub client_count: usize,
    pub max_clients: usize,
    pub entity_count: usize,
    pub network_stats: NetworkStats,
    pub simulated_drops: u64,
}
