use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use skirmish::{
    ConnectionState, EntityState, FixedTimestep, NetworkEndpoint, NetworkStats, PacketType,
};

use super::config::ClientConfig;
use super::input::InputState;
use super::reconciliation::ReconcileStats;
use super::session::ClientSession;

/// UDP client: performs the handshake, then drives a [`ClientSession`] at the
/// server's tick rate.
pub struct NetworkClient {
    endpoint: NetworkEndpoint,
    config: ClientConfig,
    state: ConnectionState,
    session: Option<ClientSession>,
    timestep: FixedTimestep,
    epoch: Instant,
    connection_start_time: Option<Instant>,
    last_request_time: Instant,
    last_receive_time: Instant,
    last_ping_time: Instant,
    denied_reason: Option<String>,
    running: Arc<AtomicBool>,
}

impl NetworkClient {
    pub fn new(config: ClientConfig) -> io::Result<Self> {
        let endpoint = NetworkEndpoint::bind("0.0.0.0:0")?;
        let now = Instant::now();

        Ok(Self {
            endpoint,
            timestep: FixedTimestep::new(config.tick_rate),
            state: ConnectionState::Disconnected,
            session: None,
            epoch: now,
            connection_start_time: None,
            last_request_time: now,
            last_receive_time: now,
            last_ping_time: now,
            denied_reason: None,
            running: Arc::new(AtomicBool::new(true)),
            config,
        })
    }

    pub fn connect(&mut self, server_addr: SocketAddr) -> io::Result<()> {
        log::info!("Connecting to {}", server_addr);

        self.reset();
        self.endpoint.set_remote(server_addr);
        self.state = ConnectionState::Connecting;
        self.connection_start_time = Some(Instant::now());

        self.send_connection_request()
    }

    pub fn disconnect(&mut self) -> io::Result<()> {
        if self.state == ConnectionState::Connected {
            let packet = self.endpoint.create_packet(PacketType::Disconnect);
            let _ = self.endpoint.send(&packet);
        }

        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.session = None;
        self.connection_start_time = None;
        self.timestep.reset();
    }

    fn send_connection_request(&mut self) -> io::Result<()> {
        let packet = self.endpoint.create_packet(PacketType::ConnectionRequest);
        self.endpoint.send(&packet)?;
        self.last_request_time = Instant::now();
        Ok(())
    }

    pub fn update(&mut self, delta_time: f32, input: &InputState) -> io::Result<()> {
        self.process_network()?;

        match self.state {
            ConnectionState::Connecting => {
                if let Some(start) = self.connection_start_time {
                    if start.elapsed() > Duration::from_secs(self.config.connection_timeout_secs) {
                        log::warn!("Connection timeout");
                        self.reset();
                        return Ok(());
                    }
                }
                if self.last_request_time.elapsed()
                    >= Duration::from_millis(self.config.connect_retry_ms)
                {
                    self.send_connection_request()?;
                }
            }
            ConnectionState::Connected => {
                self.timestep.accumulate(delta_time);
                while self.timestep.consume_tick() {
                    if let Some(session) = self.session.as_mut() {
                        session.tick(input);
                    }
                }
                self.flush_outbox()?;

                if self.last_ping_time.elapsed()
                    >= Duration::from_secs_f32(self.config.ping_interval_secs)
                {
                    self.send_ping()?;
                    self.last_ping_time = Instant::now();
                }

                if self.last_receive_time.elapsed()
                    > Duration::from_secs(self.config.connection_timeout_secs)
                {
                    log::warn!("Server connection lost");
                    self.reset();
                }
            }
            ConnectionState::Disconnected => {}
        }

        Ok(())
    }

    fn flush_outbox(&mut self) -> io::Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        for payload in session.drain_outbox() {
            let packet = self.endpoint.create_packet(payload);
            self.endpoint.send(&packet)?;
        }
        Ok(())
    }

    fn send_ping(&mut self) -> io::Result<()> {
        let timestamp = self.epoch.elapsed().as_millis() as u64;
        let packet = self.endpoint.create_packet(PacketType::Ping { timestamp });
        self.endpoint.send(&packet)?;
        Ok(())
    }

    fn process_network(&mut self) -> io::Result<()> {
        let packets = self.endpoint.receive()?;

        for (packet, addr) in packets {
            if self.endpoint.remote_addr() != Some(addr) {
                log::debug!("Ignoring packet from unexpected address {}", addr);
                continue;
            }
            self.last_receive_time = Instant::now();
            self.handle_payload(packet.payload);
        }

        Ok(())
    }

    fn handle_payload(&mut self, payload: PacketType) {
        match payload {
            PacketType::ConnectionAccepted {
                entity_id,
                tick,
                tick_rate,
            } => {
                self.handle_connection_accepted(entity_id, tick, tick_rate);
            }
            PacketType::ConnectionDenied { reason } => {
                log::warn!("Connection denied: {}", reason);
                self.denied_reason = Some(reason);
                self.reset();
            }
            PacketType::Pong { timestamp } => {
                let now = self.epoch.elapsed().as_millis() as u64;
                let rtt = now.saturating_sub(timestamp);
                self.endpoint.stats_mut().record_rtt(rtt as f32);
                log::trace!("Ping RTT: {} ms", rtt);
            }
            PacketType::Disconnect => {
                log::info!("Disconnected by server");
                self.reset();
            }
            other => match self.session.as_mut() {
                Some(session) => {
                    session.handle_payload(&other);
                }
                None => log::debug!("Dropping payload received before the handshake"),
            },
        }
    }

    fn handle_connection_accepted(&mut self, entity_id: u32, tick: u32, tick_rate: u32) {
        if self.state == ConnectionState::Connected {
            // Duplicate accept from a retried request.
            return;
        }

        log::info!(
            "Connected to server as entity {} (tick {}, {} Hz)",
            entity_id,
            tick,
            tick_rate
        );

        if tick_rate != self.config.tick_rate {
            self.config.tick_rate = tick_rate;
            self.timestep = FixedTimestep::new(tick_rate);
        }
        self.session = Some(ClientSession::new(entity_id, &self.config));
        self.state = ConnectionState::Connected;
        self.denied_reason = None;
        self.last_ping_time = Instant::now();
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn entity_id(&self) -> Option<u32> {
        self.session.as_ref().map(ClientSession::entity_id)
    }

    pub fn session(&self) -> Option<&ClientSession> {
        self.session.as_ref()
    }

    pub fn predicted_state(&self) -> Option<&EntityState> {
        self.session.as_ref().map(ClientSession::predicted_state)
    }

    pub fn reconcile_stats(&self) -> Option<&ReconcileStats> {
        self.session.as_ref().map(ClientSession::reconcile_stats)
    }

    pub fn denied_reason(&self) -> Option<&str> {
        self.denied_reason.as_deref()
    }

    pub fn stats(&self) -> &NetworkStats {
        self.endpoint.stats()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.disconnect();
    }
}
