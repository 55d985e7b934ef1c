pub mod net;
pub mod simulation;
pub mod snapshot;

pub use net::{
    AckMessage, ClientConnection, ConnectionManager, ConnectionState, DEFAULT_PORT,
    DEFAULT_TICK_RATE, InputMessage, NetEntityState, NetworkEndpoint, NetworkSimulator,
    NetworkStats, Packet, PacketError, PacketHeader, PacketLossSimulation, PacketType,
    ReliableChannel, ReliableMessage, ReliableReceiver, ReplicatedState, SnapshotMessage,
    SpawnMessage,
};
pub use simulation::{
    Buttons, CommandBuffer, EntityState, FixedTimestep, InputCommand, SimulationLoop, TickOutput,
    step,
};
pub use snapshot::{
    Authority, DroneData, Entity, EntityKind, InterpolationBuffer, PlayerData, Replicable,
    Snapshot, World,
};
