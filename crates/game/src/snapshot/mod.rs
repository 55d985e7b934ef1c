mod buffer;
mod entity;
mod world;

pub use buffer::{DEFAULT_BUFFER_DEPTH, InterpolationBuffer, lerp_angle, lerp_state, wrap_angle};
pub use entity::{
    Authority, DroneData, Entity, EntityKind, PLAYER_MAX_HEALTH, PlayerData, Replicable,
    decode_state, encode_state,
};
pub use world::{Snapshot, World};
