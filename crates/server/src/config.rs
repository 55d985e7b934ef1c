use skirmish::{DEFAULT_TICK_RATE, PacketLossSimulation};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tick_rate: u32,
    pub max_clients: usize,
    pub connection_timeout_secs: u64,
    pub drone_count: usize,
    pub global_packet_loss: Option<PacketLossSimulation>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            max_clients: 16,
            connection_timeout_secs: 10,
            drone_count: 2,
            global_packet_loss: None,
        }
    }
}
