use std::collections::{BTreeMap, VecDeque};

use skirmish::{EntityState, InputCommand, step};

use super::input::InputState;

/// Locally simulates the owned entity ahead of the server.
///
/// Every issued command is kept until the server acknowledges it, and the
/// state reached after it is recorded under its sequence so the server's
/// answer can be compared against it later.
pub struct ClientPredictor {
    state: EntityState,
    next_sequence: u32,
    pending: VecDeque<InputCommand>,
    records: BTreeMap<u32, EntityState>,
    max_pending: usize,
    last_acked: u32,
    dt: f32,
}

impl ClientPredictor {
    pub fn new(tick_rate: u32, max_pending: usize) -> Self {
        Self {
            state: EntityState::default(),
            next_sequence: 1,
            pending: VecDeque::with_capacity(max_pending),
            records: BTreeMap::new(),
            max_pending,
            last_acked: 0,
            dt: 1.0 / tick_rate.max(1) as f32,
        }
    }

    /// Seeds the predicted state. Only meaningful before the first input.
    pub fn set_state(&mut self, state: EntityState) {
        self.state = state;
    }

    pub fn predict(&mut self, input: &InputState) -> InputCommand {
        let command = input.to_command(self.next_sequence);
        self.next_sequence = self.next_sequence.wrapping_add(1).max(1);
        self.apply(command);
        command
    }

    fn apply(&mut self, command: InputCommand) {
        self.state = step(&self.state, &command, self.dt);
        self.pending.push_back(command);
        self.records.insert(command.seq, self.state);

        while self.pending.len() > self.max_pending {
            self.pending.pop_front();
        }
        while self.records.len() > self.max_pending {
            self.records.pop_first();
        }
    }

    /// Drops every input and record the server has consumed.
    pub fn confirm(&mut self, ack_seq: u32) {
        while self
            .pending
            .front()
            .is_some_and(|command| command.seq <= ack_seq)
        {
            self.pending.pop_front();
        }
        self.records.retain(|&seq, _| seq > ack_seq);
        self.last_acked = self.last_acked.max(ack_seq);
    }

    /// Snaps to the server's state at `ack_seq` and re-simulates every
    /// input issued after it. Returns how many inputs were replayed.
    pub fn rewind_and_replay(&mut self, authoritative: &EntityState, ack_seq: u32) -> usize {
        self.confirm(ack_seq);
        self.records.clear();
        self.state = *authoritative;

        for command in &self.pending {
            self.state = step(&self.state, command, self.dt);
            self.records.insert(command.seq, self.state);
        }
        self.pending.len()
    }

    pub fn record(&self, seq: u32) -> Option<&EntityState> {
        self.records.get(&seq)
    }

    pub fn state(&self) -> &EntityState {
        &self.state
    }

    pub fn pending(&self) -> impl Iterator<Item = &InputCommand> {
        self.pending.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn last_acked(&self) -> u32 {
        self.last_acked
    }

    pub fn has_issued_input(&self) -> bool {
        self.next_sequence > 1
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn reset(&mut self) {
        self.state = EntityState::default();
        self.next_sequence = 1;
        self.pending.clear();
        self.records.clear();
        self.last_acked = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn moving(x: f32, y: f32) -> InputState {
        InputState {
            move_direction: [x, y],
            ..Default::default()
        }
    }

    #[test]
    fn predicted_state_is_applied_immediately() {
        let mut predictor = ClientPredictor::new(60, 128);
        predictor.set_state(EntityState::at(Vec2::new(1.0, 1.0)));

        let command = predictor.predict(&moving(1.0, 0.0));

        assert_eq!(command.seq, 1);
        assert!(predictor.state().position.x > 1.0);
        assert_eq!(predictor.record(1), Some(predictor.state()));
        assert_eq!(predictor.pending_len(), 1);
    }

    #[test]
    fn sequences_are_monotonic_from_one() {
        let mut predictor = ClientPredictor::new(60, 128);
        let seqs: Vec<u32> = (0..4)
            .map(|_| predictor.predict(&InputState::default()).seq)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
    }

    #[test]
    fn confirm_prunes_acknowledged_inputs() {
        let mut predictor = ClientPredictor::new(60, 128);
        for _ in 0..5 {
            predictor.predict(&moving(0.0, 1.0));
        }

        predictor.confirm(3);

        let remaining: Vec<u32> = predictor.pending().map(|c| c.seq).collect();
        assert_eq!(remaining, vec![4, 5]);
        assert!(predictor.record(3).is_none());
        assert!(predictor.record(4).is_some());
        assert_eq!(predictor.last_acked(), 3);
    }

    #[test]
    fn bounded_queues_evict_oldest() {
        let mut predictor = ClientPredictor::new(60, 4);
        for _ in 0..10 {
            predictor.predict(&moving(1.0, 0.0));
        }

        assert_eq!(predictor.pending_len(), 4);
        assert_eq!(predictor.record_count(), 4);
        assert_eq!(predictor.pending().next().map(|c| c.seq), Some(7));
        assert!(predictor.record(6).is_none());
    }

    #[test]
    fn capacity_of_one_keeps_only_the_newest_input() {
        let mut predictor = ClientPredictor::new(60, 1);
        for _ in 0..5 {
            predictor.predict(&moving(1.0, 0.0));
            assert!(predictor.pending_len() <= 1);
            assert!(predictor.record_count() <= 1);
        }

        assert_eq!(predictor.pending().next().map(|c| c.seq), Some(5));
        assert!(predictor.record(5).is_some());
    }

    #[test]
    fn replay_matches_direct_simulation() {
        let mut predictor = ClientPredictor::new(60, 128);
        let inputs = [moving(1.0, 0.0), moving(0.0, 1.0), moving(-1.0, -1.0)];
        let commands: Vec<InputCommand> = inputs.iter().map(|i| predictor.predict(i)).collect();

        let authoritative = EntityState::at(Vec2::new(10.0, -4.0));
        let replayed = predictor.rewind_and_replay(&authoritative, 1);

        let dt = predictor.dt();
        let expected = step(&step(&authoritative, &commands[1], dt), &commands[2], dt);
        assert_eq!(replayed, 2);
        assert_eq!(*predictor.state(), expected);
        assert_eq!(predictor.record(3), Some(&expected));
    }
}
