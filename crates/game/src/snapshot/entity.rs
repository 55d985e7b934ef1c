use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::net::{NetEntityState, ReplicatedState};
use crate::simulation::{Buttons, EntityState, InputCommand};

pub const PLAYER_MAX_HEALTH: u16 = 100;

/// Who is applying an incoming state blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// The receiver does not own the entity and takes every field.
    Remote,
    /// The receiver predicts this entity locally and keeps the fields it
    /// predicts.
    Predicted,
}

/// Extended per-entity state that rides along with the kinematic state.
pub trait Replicable {
    fn replicated_state(&self) -> ReplicatedState;

    /// Returns `false` if the blob belongs to a different kind of entity.
    fn apply_replicated_state(&mut self, state: &ReplicatedState, authority: Authority) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerData {
    pub health: u16,
    /// Buttons held in the last consumed input.
    pub buttons: Buttons,
}

impl Default for PlayerData {
    fn default() -> Self {
        Self {
            health: PLAYER_MAX_HEALTH,
            buttons: Buttons::empty(),
        }
    }
}

impl Replicable for PlayerData {
    fn replicated_state(&self) -> ReplicatedState {
        ReplicatedState::Player {
            health: self.health,
            buttons: self.buttons.bits(),
        }
    }

    fn apply_replicated_state(&mut self, state: &ReplicatedState, authority: Authority) -> bool {
        let ReplicatedState::Player { health, buttons } = *state else {
            return false;
        };
        self.health = health;
        // The owner already knows what it pressed.
        if authority == Authority::Remote {
            self.buttons = Buttons::from_bits_truncate(buttons);
        }
        true
    }
}

/// A server-driven entity that wanders in circles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DroneData {
    /// Radians per second.
    pub turn_rate: f32,
}

impl DroneData {
    /// Half-speed forward along the current facing, aim rotated by the turn
    /// rate. Derived only from the state, so replays reproduce it exactly.
    pub fn steer(&self, state: &EntityState, dt: f32) -> InputCommand {
        let heading = Vec2::from_angle(state.orientation);
        let aim = Vec2::from_angle(state.orientation + self.turn_rate * dt);
        InputCommand {
            seq: 0,
            movement: heading * 0.5,
            aim,
            buttons: Buttons::empty(),
        }
    }
}

impl Replicable for DroneData {
    fn replicated_state(&self) -> ReplicatedState {
        ReplicatedState::Drone {
            turn_rate: self.turn_rate,
        }
    }

    fn apply_replicated_state(&mut self, state: &ReplicatedState, _authority: Authority) -> bool {
        let ReplicatedState::Drone { turn_rate } = *state else {
            return false;
        };
        self.turn_rate = turn_rate;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EntityKind {
    Player(PlayerData),
    Drone(DroneData),
}

impl EntityKind {
    pub fn from_replicated(state: &ReplicatedState) -> Self {
        match *state {
            ReplicatedState::Player { health, buttons } => Self::Player(PlayerData {
                health,
                buttons: Buttons::from_bits_truncate(buttons),
            }),
            ReplicatedState::Drone { turn_rate } => Self::Drone(DroneData { turn_rate }),
        }
    }
}

impl Replicable for EntityKind {
    fn replicated_state(&self) -> ReplicatedState {
        match self {
            Self::Player(data) => data.replicated_state(),
            Self::Drone(data) => data.replicated_state(),
        }
    }

    fn apply_replicated_state(&mut self, state: &ReplicatedState, authority: Authority) -> bool {
        match self {
            Self::Player(data) => data.apply_replicated_state(state, authority),
            Self::Drone(data) => data.apply_replicated_state(state, authority),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entity {
    pub id: u32,
    pub state: EntityState,
    pub kind: EntityKind,
}

impl Entity {
    pub fn new(id: u32, state: EntityState, kind: EntityKind) -> Self {
        Self { id, state, kind }
    }

    pub fn player(id: u32, spawn_position: Vec2) -> Self {
        Self::new(
            id,
            EntityState::at(spawn_position),
            EntityKind::Player(PlayerData::default()),
        )
    }

    pub fn drone(id: u32, spawn_position: Vec2, turn_rate: f32) -> Self {
        Self::new(
            id,
            EntityState::at(spawn_position),
            EntityKind::Drone(DroneData { turn_rate }),
        )
    }

    pub fn to_network_state(&self) -> NetEntityState {
        encode_state(self.id, &self.state, self.kind.replicated_state())
    }

    pub fn from_network_state(state: &NetEntityState) -> Self {
        Self {
            id: state.entity_id,
            state: decode_state(state),
            kind: EntityKind::from_replicated(&state.extended),
        }
    }
}

pub fn encode_state(
    entity_id: u32,
    state: &EntityState,
    extended: ReplicatedState,
) -> NetEntityState {
    NetEntityState {
        entity_id,
        position: state.position.to_array(),
        velocity: state.velocity.to_array(),
        orientation: state.orientation,
        extended,
    }
}

pub fn decode_state(state: &NetEntityState) -> EntityState {
    EntityState {
        position: Vec2::from_array(state.position),
        velocity: Vec2::from_array(state.velocity),
        orientation: state.orientation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_conversion_is_lossless() {
        let mut entity = Entity::player(42, Vec2::new(10.0, -3.0));
        entity.state.velocity = Vec2::new(2.5, -1.0);
        entity.state.orientation = -2.9;

        let reconstructed = Entity::from_network_state(&entity.to_network_state());

        assert_eq!(reconstructed, entity);
    }

    #[test]
    fn owner_keeps_predicted_buttons_but_takes_health() {
        let mut data = PlayerData {
            health: 100,
            buttons: Buttons::FIRE,
        };
        let incoming = ReplicatedState::Player {
            health: 40,
            buttons: Buttons::RELOAD.bits(),
        };

        assert!(data.apply_replicated_state(&incoming, Authority::Predicted));
        assert_eq!(data.health, 40);
        assert_eq!(data.buttons, Buttons::FIRE);

        assert!(data.apply_replicated_state(&incoming, Authority::Remote));
        assert_eq!(data.buttons, Buttons::RELOAD);
    }

    #[test]
    fn mismatched_kind_is_ignored() {
        let mut kind = EntityKind::Drone(DroneData { turn_rate: 1.0 });
        let incoming = ReplicatedState::Player {
            health: 1,
            buttons: 0,
        };

        assert!(!kind.apply_replicated_state(&incoming, Authority::Remote));
        assert_eq!(kind, EntityKind::Drone(DroneData { turn_rate: 1.0 }));
    }

    #[test]
    fn drone_steering_turns_steadily() {
        let drone = DroneData { turn_rate: 1.0 };
        let state = EntityState::default();

        let input = drone.steer(&state, 0.5);

        assert!((input.movement - Vec2::new(0.5, 0.0)).length() < 1.0e-6);
        assert!((input.aim.to_angle() - 0.5).abs() < 1.0e-6);
    }
}
