use std::collections::VecDeque;
use std::f32::consts::{PI, TAU};

use crate::simulation::EntityState;

pub const DEFAULT_BUFFER_DEPTH: usize = 32;

/// Tick-ordered history of one remote entity, oldest first. Append-only ring:
/// the oldest entry is evicted once `capacity` is reached. A capacity below
/// two never interpolates, so the caller keeps its last-known state.
#[derive(Debug, Clone)]
pub struct InterpolationBuffer {
    entries: VecDeque<(u32, EntityState)>,
    capacity: usize,
}

impl Default for InterpolationBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_DEPTH)
    }
}

impl InterpolationBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a state. A tick at or below the newest buffered tick is a
    /// reordered or duplicated delivery and is rejected.
    pub fn push(&mut self, tick: u32, state: EntityState) -> bool {
        if self.latest_tick().is_some_and(|latest| tick <= latest) {
            return false;
        }
        if self.capacity == 0 {
            return false;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((tick, state));
        true
    }

    pub fn latest_tick(&self) -> Option<u32> {
        self.entries.back().map(|&(tick, _)| tick)
    }

    pub fn latest(&self) -> Option<&EntityState> {
        self.entries.back().map(|(_, state)| state)
    }

    pub fn oldest_tick(&self) -> Option<u32> {
        self.entries.front().map(|&(tick, _)| tick)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u32, EntityState)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// State at `render_tick`, interpolated between the bracketing entries.
    /// Ticks before the oldest entry clamp to it, ticks past the newest clamp
    /// to the newest. `None` until two entries exist.
    pub fn interpolate(&self, render_tick: u32) -> Option<EntityState> {
        if self.entries.len() < 2 {
            return None;
        }

        let &(first_tick, first) = self.entries.front()?;
        if render_tick <= first_tick {
            return Some(first);
        }

        for (&(from_tick, from), &(to_tick, to)) in
            self.entries.iter().zip(self.entries.iter().skip(1))
        {
            if render_tick >= from_tick && render_tick < to_tick {
                let t = (render_tick - from_tick) as f32 / (to_tick - from_tick) as f32;
                return Some(lerp_state(&from, &to, t.clamp(0.0, 1.0)));
            }
        }

        self.latest().copied()
    }
}

pub fn lerp_state(from: &EntityState, to: &EntityState, t: f32) -> EntityState {
    EntityState {
        position: from.position.lerp(to.position, t),
        velocity: from.velocity.lerp(to.velocity, t),
        orientation: lerp_angle(from.orientation, to.orientation, t),
    }
}

/// Interpolates along the shorter arc, so 170° to -170° passes through 180°.
pub fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    let delta = wrap_angle(to - from);
    wrap_angle(from + delta * t)
}

/// Wraps into [-π, π].
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped < -PI { wrapped + TAU } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn at(x: f32, y: f32) -> EntityState {
        EntityState::at(Vec2::new(x, y))
    }

    #[test]
    fn midpoint_between_bracketing_ticks() {
        let mut buffer = InterpolationBuffer::new(8);
        buffer.push(10, at(0.0, 0.0));
        buffer.push(12, at(10.0, 20.0));

        let mid = buffer.interpolate(11).unwrap();
        assert_eq!(mid.position, Vec2::new(5.0, 10.0));
    }

    #[test]
    fn clamps_outside_the_buffered_range() {
        let mut buffer = InterpolationBuffer::new(8);
        buffer.push(10, at(0.0, 0.0));
        buffer.push(12, at(10.0, 20.0));

        assert_eq!(buffer.interpolate(10).unwrap().position, Vec2::new(0.0, 0.0));
        assert_eq!(buffer.interpolate(3).unwrap().position, Vec2::new(0.0, 0.0));
        assert_eq!(buffer.interpolate(12).unwrap().position, Vec2::new(10.0, 20.0));
        assert_eq!(buffer.interpolate(40).unwrap().position, Vec2::new(10.0, 20.0));
    }

    #[test]
    fn single_entry_cannot_interpolate() {
        let mut buffer = InterpolationBuffer::new(8);
        buffer.push(5, at(1.0, 1.0));
        assert!(buffer.interpolate(5).is_none());
    }

    #[test]
    fn reordered_ticks_are_rejected() {
        let mut buffer = InterpolationBuffer::new(8);
        assert!(buffer.push(10, at(0.0, 0.0)));
        assert!(!buffer.push(10, at(1.0, 0.0)));
        assert!(!buffer.push(9, at(1.0, 0.0)));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut buffer = InterpolationBuffer::new(4);
        for tick in 1..=10 {
            buffer.push(tick, at(tick as f32, 0.0));
        }

        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.oldest_tick(), Some(7));
        assert_eq!(buffer.latest_tick(), Some(10));
    }

    #[test]
    fn capacity_of_one_holds_only_the_newest() {
        let mut buffer = InterpolationBuffer::new(1);
        for tick in 1..=5 {
            assert!(buffer.push(tick, at(tick as f32, 0.0)));
            assert!(buffer.len() <= 1);
        }

        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.latest_tick(), Some(5));
        assert!(buffer.interpolate(4).is_none());
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut buffer = InterpolationBuffer::new(0);
        assert!(!buffer.push(1, at(1.0, 0.0)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn picks_the_right_segment() {
        let mut buffer = InterpolationBuffer::new(8);
        buffer.push(1, at(0.0, 0.0));
        buffer.push(2, at(1.0, 0.0));
        buffer.push(4, at(5.0, 0.0));

        assert_eq!(buffer.interpolate(2).unwrap().position.x, 1.0);
        assert_eq!(buffer.interpolate(3).unwrap().position.x, 3.0);
    }

    #[test]
    fn orientation_takes_the_short_way_around() {
        let from = 170.0_f32.to_radians();
        let to = (-170.0_f32).to_radians();

        let mid = lerp_angle(from, to, 0.5);

        assert!((mid.abs() - PI).abs() < 1.0e-5);
    }

    #[test]
    fn wrap_angle_stays_in_range() {
        for raw in [-10.0_f32, -PI, 0.0, PI, 4.0, 12.0] {
            let wrapped = wrap_angle(raw);
            assert!((-PI..=PI).contains(&wrapped), "{raw} -> {wrapped}");
            assert!((wrapped.cos() - raw.cos()).abs() < 1.0e-4);
            assert!((wrapped.sin() - raw.sin()).abs() < 1.0e-4);
        }
    }
}
