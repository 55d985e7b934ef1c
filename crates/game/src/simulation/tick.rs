use glam::Vec2;

use crate::net::{AckMessage, SpawnMessage};
use crate::snapshot::{Entity, EntityKind, Snapshot, World};

use super::command::{CommandBuffer, InputCommand};
use super::step::step;

const SPAWN_RING_RADIUS: f32 = 4.0;

pub struct FixedTimestep {
    tick_rate: u32,
    dt: f32,
    accumulator: f32,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            dt: 1.0 / tick_rate as f32,
            accumulator: 0.0,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// Frame spikes are capped so a stall does not trigger a burst of ticks.
    pub fn accumulate(&mut self, delta: f32) {
        self.accumulator += delta.min(0.25);
    }

    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

/// What one server tick publishes: a snapshot for everyone and an ack per
/// connected player.
#[derive(Debug, Clone)]
pub struct TickOutput {
    pub snapshot: Snapshot,
    /// `(entity_id, ack)`, ordered by entity id.
    pub acks: Vec<(u32, AckMessage)>,
}

impl TickOutput {
    pub fn ack_for(&self, entity_id: u32) -> Option<AckMessage> {
        self.acks
            .iter()
            .find(|(id, _)| *id == entity_id)
            .map(|(_, ack)| *ack)
    }
}

/// The authoritative fixed-tick simulation. Single writer of every entity
/// state; never fails, only advances.
pub struct SimulationLoop {
    world: World,
    commands: CommandBuffer,
    timestep: FixedTimestep,
}

impl SimulationLoop {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            world: World::new(),
            commands: CommandBuffer::new(),
            timestep: FixedTimestep::new(tick_rate),
        }
    }

    pub fn tick(&self) -> u32 {
        self.world.tick()
    }

    pub fn dt(&self) -> f32 {
        self.timestep.dt()
    }

    pub fn tick_rate(&self) -> u32 {
        self.timestep.tick_rate()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Spawns a player for a new connection. The returned entity id is the
    /// connection's identity from here on.
    pub fn connect(&mut self) -> SpawnMessage {
        let slot = self.world.entity_count() as f32;
        let position = Vec2::from_angle(slot * 2.4) * SPAWN_RING_RADIUS;
        let id = self.world.spawn_player(position);
        self.commands.register(id);
        log::info!("Spawned player entity {} at {:?}", id, position);
        SpawnMessage {
            entity: Entity::player(id, position).to_network_state(),
        }
    }

    pub fn spawn_drone(&mut self, position: Vec2, turn_rate: f32) -> SpawnMessage {
        let id = self.world.spawn_drone(position, turn_rate);
        log::info!("Spawned drone entity {}", id);
        SpawnMessage {
            entity: Entity::drone(id, position, turn_rate).to_network_state(),
        }
    }

    /// Removes the entity and its input slot. Unknown ids are a no-op.
    pub fn despawn(&mut self, entity_id: u32) -> bool {
        self.commands.remove(entity_id);
        let removed = self.world.despawn(entity_id).is_some();
        if removed {
            log::info!("Despawned entity {}", entity_id);
        }
        removed
    }

    /// Queues an input for the next tick. Returns `false` for stale or
    /// duplicate sequences and for unknown entities.
    pub fn receive_input(&mut self, entity_id: u32, command: InputCommand) -> bool {
        let accepted = self.commands.push(entity_id, command);
        if !accepted {
            log::trace!(
                "Dropped input {} for entity {} (stale or unknown)",
                command.seq,
                entity_id
            );
        }
        accepted
    }

    pub fn last_acked(&self, entity_id: u32) -> Option<u32> {
        self.commands.last_acked(entity_id)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.world.snapshot()
    }

    pub fn spawn_messages(&self) -> Vec<SpawnMessage> {
        self.world.spawn_messages()
    }

    /// Runs as many ticks as `delta` seconds allow.
    pub fn update(&mut self, delta: f32) -> Vec<TickOutput> {
        self.timestep.accumulate(delta);

        let mut outputs = Vec::new();
        while self.timestep.consume_tick() {
            outputs.push(self.step_tick());
        }
        outputs
    }

    /// Ingest then publish, exactly once.
    pub fn step_tick(&mut self) -> TickOutput {
        let dt = self.timestep.dt();

        for entity in self.world.entities_mut() {
            match &mut entity.kind {
                EntityKind::Player(data) => {
                    // Nothing fresh: stand still, ack stays where it was.
                    let input = self
                        .commands
                        .take(entity.id)
                        .unwrap_or_else(InputCommand::neutral);
                    data.buttons = input.buttons;
                    entity.state = step(&entity.state, &input, dt);
                }
                EntityKind::Drone(drone) => {
                    let input = drone.steer(&entity.state, dt);
                    entity.state = step(&entity.state, &input, dt);
                }
            }
        }

        self.world.advance_tick();
        let tick = self.world.tick();

        let mut acks: Vec<(u32, AckMessage)> = self
            .commands
            .acks()
            .map(|(id, ack_seq)| (id, AckMessage { tick, ack_seq }))
            .collect();
        acks.sort_unstable_by_key(|(id, _)| *id);

        TickOutput {
            snapshot: self.world.snapshot(),
            acks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{Buttons, EntityState};

    fn cmd(seq: u32, x: f32) -> InputCommand {
        InputCommand::new(seq, Vec2::new(x, 0.0), Vec2::ZERO, Buttons::empty())
    }

    #[test]
    fn fixed_timestep_accumulation() {
        let mut ts = FixedTimestep::new(60);

        ts.accumulate(1.0 / 30.0);
        assert!(ts.consume_tick());
        assert!(ts.consume_tick());
        assert!(!ts.consume_tick());
    }

    #[test]
    fn update_runs_whole_ticks() {
        let mut sim = SimulationLoop::new(60);
        assert_eq!(sim.update(1.0 / 30.0 + 0.001).len(), 2);
        assert_eq!(sim.tick(), 2);
    }

    #[test]
    fn consumed_input_moves_player_and_is_acked() {
        let mut sim = SimulationLoop::new(60);
        let id = sim.connect().entity.entity_id;
        let start = *sim.snapshot().state(id).unwrap();

        assert!(sim.receive_input(id, cmd(1, 1.0)));
        let output = sim.step_tick();

        let expected = step(&start, &cmd(1, 1.0), sim.dt());
        assert_eq!(output.snapshot.state(id), Some(&expected));
        assert_eq!(output.ack_for(id), Some(AckMessage { tick: 1, ack_seq: 1 }));
        assert_eq!(output.snapshot.tick, 1);
    }

    #[test]
    fn no_input_yet_keeps_ack_at_zero() {
        let mut sim = SimulationLoop::new(60);
        let id = sim.connect().entity.entity_id;
        let start = *sim.snapshot().state(id).unwrap();

        let output = sim.step_tick();

        assert_eq!(output.ack_for(id).map(|a| a.ack_seq), Some(0));
        assert_eq!(output.snapshot.state(id).map(|s| s.position), Some(start.position));
    }

    #[test]
    fn inputs_between_ticks_are_superseded_not_summed() {
        let mut sim = SimulationLoop::new(60);
        let id = sim.connect().entity.entity_id;
        let start = *sim.snapshot().state(id).unwrap();

        sim.receive_input(id, cmd(1, 1.0));
        sim.receive_input(id, cmd(2, -1.0));
        let output = sim.step_tick();

        let expected = step(&start, &cmd(2, -1.0), sim.dt());
        assert_eq!(output.snapshot.state(id), Some(&expected));
        assert_eq!(output.ack_for(id).map(|a| a.ack_seq), Some(2));
    }

    #[test]
    fn stale_input_never_changes_state() {
        let mut sim = SimulationLoop::new(60);
        let id = sim.connect().entity.entity_id;

        sim.receive_input(id, cmd(5, 1.0));
        sim.step_tick();
        let before: EntityState = *sim.snapshot().state(id).unwrap();

        assert!(!sim.receive_input(id, cmd(3, -1.0)));
        assert!(!sim.receive_input(id, cmd(5, -1.0)));
        let output = sim.step_tick();

        // Idle tick: same position, ack unchanged.
        assert_eq!(
            output.snapshot.state(id).map(|s| s.position),
            Some(before.position)
        );
        assert_eq!(output.ack_for(id).map(|a| a.ack_seq), Some(5));
    }

    #[test]
    fn despawned_entity_disappears_everywhere() {
        let mut sim = SimulationLoop::new(60);
        let a = sim.connect().entity.entity_id;
        let b = sim.connect().entity.entity_id;

        assert!(sim.despawn(b));
        assert!(!sim.despawn(b));
        assert!(!sim.receive_input(b, cmd(1, 1.0)));

        let output = sim.step_tick();
        assert!(output.snapshot.state(b).is_none());
        assert!(output.ack_for(b).is_none());
        assert!(output.ack_for(a).is_some());
    }

    #[test]
    fn drones_move_without_input() {
        let mut sim = SimulationLoop::new(60);
        let id = sim.spawn_drone(Vec2::ZERO, 1.0).entity.entity_id;

        for _ in 0..30 {
            sim.step_tick();
        }

        let state = sim.snapshot().state(id).copied().unwrap();
        assert!(state.position.length() > 0.5);
        assert!(state.orientation > 0.0);
        assert!(sim.last_acked(id).is_none());
    }
}
