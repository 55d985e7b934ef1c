use std::collections::{BTreeMap, HashMap};

use glam::Vec2;

use crate::net::{ReplicatedState, SnapshotMessage, SpawnMessage};
use crate::simulation::EntityState;

use super::entity::{Entity, Replicable, decode_state, encode_state};

/// All authoritative entity states at one tick. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub tick: u32,
    pub states: BTreeMap<u32, EntityState>,
    pub extended: BTreeMap<u32, ReplicatedState>,
}

impl Snapshot {
    pub fn state(&self, entity_id: u32) -> Option<&EntityState> {
        self.states.get(&entity_id)
    }

    pub fn to_message(&self) -> SnapshotMessage {
        let entities = self
            .states
            .iter()
            .filter_map(|(&id, state)| {
                let extended = *self.extended.get(&id)?;
                Some(encode_state(id, state, extended))
            })
            .collect();
        SnapshotMessage {
            tick: self.tick,
            entities,
        }
    }

    pub fn from_message(message: &SnapshotMessage) -> Self {
        let mut snapshot = Snapshot {
            tick: message.tick,
            ..Default::default()
        };
        for entity in &message.entities {
            snapshot
                .states
                .insert(entity.entity_id, decode_state(entity));
            snapshot.extended.insert(entity.entity_id, entity.extended);
        }
        snapshot
    }
}

/// The authoritative entity table. Only the simulation loop that owns it
/// mutates it.
#[derive(Debug)]
pub struct World {
    tick: u32,
    entities: HashMap<u32, Entity>,
    next_entity_id: u32,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            tick: 0,
            entities: HashMap::new(),
            next_entity_id: 1,
        }
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn advance_tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }

    pub fn spawn_player(&mut self, spawn_position: Vec2) -> u32 {
        let id = self.allocate_id();
        self.entities.insert(id, Entity::player(id, spawn_position));
        id
    }

    pub fn spawn_drone(&mut self, spawn_position: Vec2, turn_rate: f32) -> u32 {
        let id = self.allocate_id();
        self.entities
            .insert(id, Entity::drone(id, spawn_position, turn_rate));
        id
    }

    pub fn despawn(&mut self, id: u32) -> Option<Entity> {
        self.entities.remove(&id)
    }

    pub fn get(&self, id: u32) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot {
            tick: self.tick,
            ..Default::default()
        };
        for entity in self.entities.values() {
            snapshot.states.insert(entity.id, entity.state);
            snapshot
                .extended
                .insert(entity.id, entity.kind.replicated_state());
        }
        snapshot
    }

    pub fn spawn_message(&self, id: u32) -> Option<SpawnMessage> {
        self.entities.get(&id).map(|entity| SpawnMessage {
            entity: entity.to_network_state(),
        })
    }

    /// Spawn messages for every entity, ordered by id.
    pub fn spawn_messages(&self) -> Vec<SpawnMessage> {
        let mut ids: Vec<u32> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| self.spawn_message(id))
            .collect()
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }
}
