use std::collections::HashMap;

use skirmish::{EntityState, InterpolationBuffer};

use super::config::InterpolationConfig;

/// Renders every remote entity a fixed number of ticks in the past, between
/// two states the server actually sent.
#[derive(Debug)]
pub struct RemoteInterpolator {
    config: InterpolationConfig,
    buffers: HashMap<u32, InterpolationBuffer>,
    rendered: HashMap<u32, EntityState>,
    latest_tick: u32,
}

impl RemoteInterpolator {
    pub fn new(config: InterpolationConfig) -> Self {
        Self {
            config,
            buffers: HashMap::new(),
            rendered: HashMap::new(),
            latest_tick: 0,
        }
    }

    /// Buffers one snapshot entry. Returns `false` if the tick is not newer
    /// than what is already buffered for this entity.
    pub fn push(&mut self, tick: u32, entity_id: u32, state: EntityState) -> bool {
        let depth = self.config.buffer_depth;
        let accepted = self
            .buffers
            .entry(entity_id)
            .or_insert_with(|| InterpolationBuffer::new(depth))
            .push(tick, state);

        if accepted {
            self.latest_tick = self.latest_tick.max(tick);
            self.rendered.entry(entity_id).or_insert(state);
        }
        accepted
    }

    /// Last-known state for an entity nothing has been buffered for yet,
    /// typically from its spawn message.
    pub fn insert_known(&mut self, entity_id: u32, state: EntityState) {
        self.rendered.entry(entity_id).or_insert(state);
    }

    pub fn remove(&mut self, entity_id: u32) -> bool {
        let had_buffer = self.buffers.remove(&entity_id).is_some();
        let had_state = self.rendered.remove(&entity_id).is_some();
        had_buffer || had_state
    }

    /// `None` while the newest tick is still within the delay window.
    pub fn render_tick(&self) -> Option<u32> {
        self.latest_tick
            .checked_sub(self.config.delay_ticks)
            .filter(|&tick| tick > 0)
    }

    /// Recomputes every rendered state. Entities that cannot be interpolated
    /// yet keep their last-known state.
    pub fn update(&mut self) {
        let Some(render_tick) = self.render_tick() else {
            return;
        };

        for (&id, buffer) in &self.buffers {
            if let Some(state) = buffer.interpolate(render_tick) {
                self.rendered.insert(id, state);
            }
        }
    }

    pub fn sample_at(&self, entity_id: u32, render_tick: u32) -> Option<EntityState> {
        self.buffers.get(&entity_id)?.interpolate(render_tick)
    }

    pub fn get(&self, entity_id: u32) -> Option<&EntityState> {
        self.rendered.get(&entity_id)
    }

    pub fn states(&self) -> impl Iterator<Item = (u32, &EntityState)> {
        self.rendered.iter().map(|(&id, state)| (id, state))
    }

    pub fn buffered(&self, entity_id: u32) -> usize {
        self.buffers.get(&entity_id).map_or(0, InterpolationBuffer::len)
    }

    pub fn latest_tick(&self) -> u32 {
        self.latest_tick
    }

    pub fn entity_count(&self) -> usize {
        self.rendered.len()
    }

    pub fn reset(&mut self) {
        self.buffers.clear();
        self.rendered.clear();
        self.latest_tick = 0;
    }
}
