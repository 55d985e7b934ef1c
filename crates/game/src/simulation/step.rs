use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::command::InputCommand;

/// Units per second at full stick deflection.
pub const MOVE_SPEED: f32 = 5.0;
/// Aim vectors shorter than this leave the orientation untouched.
pub const AIM_EPSILON: f32 = 1.0e-4;

/// The replicated kinematic state of one simulated object.
///
/// Server and clients must produce identical values from identical inputs, so
/// every mutation goes through [`step`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityState {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Radians, as returned by `atan2`.
    pub orientation: f32,
}

impl EntityState {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn position_error(&self, other: &EntityState) -> f32 {
        self.position.distance(other.position)
    }
}

/// Advances `state` by one fixed timestep using `input`.
///
/// Pure and deterministic: no globals, and the order of floating-point
/// operations is the same for every caller.
pub fn step(state: &EntityState, input: &InputCommand, dt: f32) -> EntityState {
    let movement = input.movement.clamp_length_max(1.0);
    let velocity = movement * MOVE_SPEED;
    let position = state.position + velocity * dt;

    // No aim input keeps the previous facing instead of snapping to zero.
    let orientation = if input.aim.length() > AIM_EPSILON {
        input.aim.y.atan2(input.aim.x)
    } else {
        state.orientation
    };

    EntityState {
        position,
        velocity,
        orientation,
    }
}
