mod connection;
mod endpoint;
mod protocol;
mod reliable;
mod simulator;
mod stats;

pub use connection::{ClientConnection, ConnectionManager, ConnectionState};
pub use endpoint::NetworkEndpoint;
pub use protocol::{
    AckMessage, DEFAULT_PORT, DEFAULT_TICK_RATE, InputMessage, MAX_PACKET_SIZE, NetEntityState,
    PROTOCOL_MAGIC, PROTOCOL_VERSION, Packet, PacketError, PacketHeader, PacketType,
    ReliableMessage, ReplicatedState, SnapshotMessage, SpawnMessage,
};
pub use reliable::{ReliableChannel, ReliableReceiver};
pub use simulator::NetworkSimulator;
pub use stats::{NetworkStats, PacketLossSimulation};
