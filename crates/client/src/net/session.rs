use std::collections::{HashMap, VecDeque};

use skirmish::snapshot::decode_state;
use skirmish::{
    AckMessage, Authority, EntityKind, EntityState, InputCommand, PacketType, PlayerData,
    ReliableMessage, ReliableReceiver, Replicable, SnapshotMessage, SpawnMessage,
};

use super::config::ClientConfig;
use super::input::InputState;
use super::interpolation::RemoteInterpolator;
use super::prediction::ClientPredictor;
use super::reconciliation::{ReconcileStats, Reconciler};

const AUTHORITATIVE_HISTORY: usize = 64;
const MAX_QUEUED_ACKS: usize = 32;
const DESPAWNED_HISTORY: usize = 256;

/// Client-side synchronization state for one connection, independent of the
/// transport. Feed it every payload the server sends, call [`tick`] once per
/// local tick and ship whatever [`drain_outbox`] returns.
///
/// [`tick`]: ClientSession::tick
/// [`drain_outbox`]: ClientSession::drain_outbox
pub struct ClientSession {
    entity_id: u32,
    predictor: ClientPredictor,
    reconciler: Reconciler,
    interpolator: RemoteInterpolator,
    kinds: HashMap<u32, EntityKind>,
    /// Recently removed ids, oldest first, so late spawn resends stay dead.
    despawned: VecDeque<u32>,
    /// Own authoritative states by tick, waiting for the matching ack.
    authoritative: VecDeque<(u32, EntityState)>,
    queued_acks: VecDeque<AckMessage>,
    last_reconciled_tick: Option<u32>,
    last_snapshot_tick: Option<u32>,
    reliable: ReliableReceiver,
    outbox: Vec<PacketType>,
    ready: bool,
}

impl ClientSession {
    pub fn new(entity_id: u32, config: &ClientConfig) -> Self {
        let mut kinds = HashMap::new();
        kinds.insert(entity_id, EntityKind::Player(PlayerData::default()));

        Self {
            entity_id,
            predictor: ClientPredictor::new(config.tick_rate, config.prediction.max_pending_inputs),
            reconciler: Reconciler::new(&config.prediction),
            interpolator: RemoteInterpolator::new(config.interpolation.clone()),
            kinds,
            despawned: VecDeque::with_capacity(DESPAWNED_HISTORY),
            authoritative: VecDeque::with_capacity(AUTHORITATIVE_HISTORY),
            queued_acks: VecDeque::new(),
            last_reconciled_tick: None,
            last_snapshot_tick: None,
            reliable: ReliableReceiver::new(),
            outbox: Vec::new(),
            ready: false,
        }
    }

    pub fn entity_id(&self) -> u32 {
        self.entity_id
    }

    /// `true` once the owned entity's state is known and inputs can be
    /// predicted from it.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Returns `false` for payloads that are not part of synchronization.
    pub fn handle_payload(&mut self, payload: &PacketType) -> bool {
        match payload {
            PacketType::Snapshot(snapshot) => self.handle_snapshot(snapshot),
            PacketType::Ack(ack) => self.handle_ack(*ack),
            PacketType::Reliable { sequence, message } => {
                // Re-ack duplicates too: the first ack may have been lost.
                self.outbox.push(PacketType::ReliableAck {
                    sequence: *sequence,
                });
                if self.reliable.accept(*sequence) {
                    self.handle_reliable(message);
                }
            }
            _ => return false,
        }
        true
    }

    /// Predicts one local tick and queues the input for the server.
    pub fn tick(&mut self, input: &InputState) -> Option<InputCommand> {
        self.interpolator.update();

        if !self.ready {
            return None;
        }

        let command = self.predictor.predict(input);
        if let Some(EntityKind::Player(data)) = self.kinds.get_mut(&self.entity_id) {
            data.buttons = command.buttons;
        }
        self.outbox.push(PacketType::Input(command.to_message()));
        Some(command)
    }

    pub fn drain_outbox(&mut self) -> Vec<PacketType> {
        std::mem::take(&mut self.outbox)
    }

    fn handle_reliable(&mut self, message: &ReliableMessage) {
        match message {
            ReliableMessage::Spawn(spawn) => self.handle_spawn(spawn),
            ReliableMessage::Despawn { entity_id } => self.handle_despawn(*entity_id),
        }
    }

    fn handle_spawn(&mut self, spawn: &SpawnMessage) {
        let id = spawn.entity.entity_id;
        if self.despawned.contains(&id) {
            log::debug!("Ignoring spawn of already despawned entity {}", id);
            return;
        }

        let state = decode_state(&spawn.entity);
        if id == self.entity_id {
            if let Some(kind) = self.kinds.get_mut(&id) {
                kind.apply_replicated_state(&spawn.entity.extended, Authority::Predicted);
            }
            self.seed_own_state(state);
            return;
        }

        log::info!("Entity {} spawned", id);
        self.kinds
            .entry(id)
            .or_insert_with(|| EntityKind::from_replicated(&spawn.entity.extended));
        self.interpolator.insert_known(id, state);
    }

    fn handle_despawn(&mut self, entity_id: u32) {
        if !self.despawned.contains(&entity_id) {
            if self.despawned.len() >= DESPAWNED_HISTORY {
                self.despawned.pop_front();
            }
            self.despawned.push_back(entity_id);
        }
        let known = self.kinds.remove(&entity_id).is_some();
        self.interpolator.remove(entity_id);

        if entity_id == self.entity_id {
            log::warn!("Own entity {} was despawned by the server", entity_id);
            self.ready = false;
            self.predictor.reset();
            self.reconciler.reset();
            self.authoritative.clear();
            self.queued_acks.clear();
            self.last_reconciled_tick = None;
        } else if known {
            log::info!("Entity {} despawned", entity_id);
        } else {
            log::debug!("Despawn for unknown entity {}", entity_id);
        }
    }

    fn handle_snapshot(&mut self, snapshot: &SnapshotMessage) {
        let tick = snapshot.tick;
        if self.last_snapshot_tick.is_some_and(|last| tick <= last) {
            log::trace!("Dropping out-of-order snapshot {}", tick);
            return;
        }
        self.last_snapshot_tick = Some(tick);

        for net in &snapshot.entities {
            let id = net.entity_id;
            let Some(kind) = self.kinds.get_mut(&id) else {
                log::debug!("Snapshot {} names unknown entity {}", tick, id);
                continue;
            };
            let state = decode_state(net);

            if id == self.entity_id {
                kind.apply_replicated_state(&net.extended, Authority::Predicted);
                if self.authoritative.len() >= AUTHORITATIVE_HISTORY {
                    self.authoritative.pop_front();
                }
                self.authoritative.push_back((tick, state));
                self.seed_own_state(state);
            } else {
                kind.apply_replicated_state(&net.extended, Authority::Remote);
                self.interpolator.push(tick, id, state);
            }
        }

        self.process_acks();
    }

    fn handle_ack(&mut self, ack: AckMessage) {
        if self.last_reconciled_tick.is_some_and(|last| ack.tick <= last) {
            return;
        }
        if self.queued_acks.len() >= MAX_QUEUED_ACKS {
            self.queued_acks.pop_front();
        }
        self.queued_acks.push_back(ack);
        self.process_acks();
    }

    /// Reconciles every queued ack whose snapshot has arrived, oldest first.
    fn process_acks(&mut self) {
        if self.queued_acks.is_empty() {
            return;
        }
        self.queued_acks.make_contiguous().sort_unstable_by_key(|ack| ack.tick);

        let mut waiting = VecDeque::with_capacity(self.queued_acks.len());
        while let Some(ack) = self.queued_acks.pop_front() {
            if self.last_reconciled_tick.is_some_and(|last| ack.tick <= last) {
                continue;
            }
            let Some(&(_, server_state)) = self
                .authoritative
                .iter()
                .find(|(tick, _)| *tick == ack.tick)
            else {
                waiting.push_back(ack);
                continue;
            };

            self.reconciler
                .reconcile(&mut self.predictor, ack.ack_seq, &server_state);
            self.last_reconciled_tick = Some(ack.tick);
        }

        // An ack older than the newest reconciled tick can no longer matter.
        let last = self.last_reconciled_tick;
        waiting.retain(|ack| last.is_none_or(|last| ack.tick > last));
        self.queued_acks = waiting;
    }

    fn seed_own_state(&mut self, state: EntityState) {
        if !self.predictor.has_issued_input() {
            self.predictor.set_state(state);
        }
        if !self.ready {
            log::info!("Own entity {} ready at {:?}", self.entity_id, state.position);
            self.ready = true;
        }
    }

    pub fn predicted_state(&self) -> &EntityState {
        self.predictor.state()
    }

    pub fn remote_state(&self, entity_id: u32) -> Option<&EntityState> {
        self.interpolator.get(entity_id)
    }

    pub fn remote_states(&self) -> impl Iterator<Item = (u32, &EntityState)> {
        self.interpolator.states()
    }

    pub fn kind(&self, entity_id: u32) -> Option<&EntityKind> {
        self.kinds.get(&entity_id)
    }

    pub fn known_entities(&self) -> usize {
        self.kinds.len()
    }

    pub fn predictor(&self) -> &ClientPredictor {
        &self.predictor
    }

    pub fn interpolator(&self) -> &RemoteInterpolator {
        &self.interpolator
    }

    pub fn reconcile_stats(&self) -> &ReconcileStats {
        self.reconciler.stats()
    }

    pub fn last_snapshot_tick(&self) -> Option<u32> {
        self.last_snapshot_tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use skirmish::snapshot::encode_state;
    use skirmish::{NetEntityState, ReplicatedState};

    const OWN: u32 = 1;
    const OTHER: u32 = 2;

    fn player_net(id: u32, x: f32, health: u16) -> NetEntityState {
        encode_state(
            id,
            &EntityState::at(Vec2::new(x, 0.0)),
            ReplicatedState::Player { health, buttons: 0 },
        )
    }

    fn spawn(sequence: u32, id: u32, x: f32) -> PacketType {
        PacketType::Reliable {
            sequence,
            message: ReliableMessage::Spawn(SpawnMessage {
                entity: player_net(id, x, 100),
            }),
        }
    }

    fn snapshot(tick: u32, entities: Vec<NetEntityState>) -> PacketType {
        PacketType::Snapshot(SnapshotMessage { tick, entities })
    }

    fn session() -> ClientSession {
        ClientSession::new(OWN, &ClientConfig::default())
    }

    #[test]
    fn no_inputs_before_own_state_is_known() {
        let mut session = session();
        assert!(session.tick(&InputState::default()).is_none());
        assert!(session.drain_outbox().is_empty());

        session.handle_payload(&spawn(0, OWN, 3.0));

        assert!(session.is_ready());
        assert_eq!(session.predicted_state().position, Vec2::new(3.0, 0.0));
        assert!(session.tick(&InputState::default()).is_some());
    }

    #[test]
    fn reliable_messages_are_acked_and_deduplicated() {
        let mut session = session();

        session.handle_payload(&spawn(4, OTHER, 1.0));
        session.handle_payload(&spawn(4, OTHER, 1.0));

        let acks: Vec<PacketType> = session.drain_outbox();
        assert_eq!(
            acks,
            vec![
                PacketType::ReliableAck { sequence: 4 },
                PacketType::ReliableAck { sequence: 4 }
            ]
        );
        assert_eq!(session.known_entities(), 2);
    }

    #[test]
    fn ack_waits_for_matching_snapshot() {
        let mut session = session();
        session.handle_payload(&spawn(0, OWN, 0.0));
        session.tick(&InputState {
            move_direction: [1.0, 0.0],
            ..Default::default()
        });

        session.handle_payload(&PacketType::Ack(AckMessage { tick: 5, ack_seq: 1 }));
        assert_eq!(session.predictor().pending_len(), 1);

        // The server ended up somewhere else entirely.
        session.handle_payload(&snapshot(5, vec![player_net(OWN, -20.0, 100)]));

        assert_eq!(session.predictor().pending_len(), 0);
        assert_eq!(session.predicted_state().position.x, -20.0);
        assert_eq!(session.reconcile_stats().corrected, 1);
    }

    #[test]
    fn own_entity_keeps_predicted_fields() {
        let mut session = session();
        session.handle_payload(&spawn(0, OWN, 0.0));
        session.tick(&InputState {
            fire: true,
            ..Default::default()
        });

        let mut net = player_net(OWN, 0.0, 55);
        net.extended = ReplicatedState::Player {
            health: 55,
            buttons: 0,
        };
        session.handle_payload(&snapshot(1, vec![net]));

        match session.kind(OWN) {
            Some(EntityKind::Player(data)) => {
                assert_eq!(data.health, 55);
                assert!(data.buttons.contains(skirmish::Buttons::FIRE));
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn unknown_entities_in_snapshots_are_ignored() {
        let mut session = session();
        session.handle_payload(&snapshot(1, vec![player_net(99, 1.0, 100)]));

        assert!(session.remote_state(99).is_none());
        assert!(session.kind(99).is_none());
    }

    #[test]
    fn despawn_discards_everything_for_the_entity() {
        let mut session = session();
        session.handle_payload(&spawn(0, OTHER, 1.0));
        session.handle_payload(&snapshot(1, vec![player_net(OTHER, 1.0, 100)]));
        assert!(session.remote_state(OTHER).is_some());

        session.handle_payload(&PacketType::Reliable {
            sequence: 1,
            message: ReliableMessage::Despawn { entity_id: OTHER },
        });
        // Late deliveries for the removed id change nothing.
        session.handle_payload(&snapshot(2, vec![player_net(OTHER, 2.0, 100)]));
        session.handle_payload(&spawn(7, OTHER, 1.0));

        assert!(session.remote_state(OTHER).is_none());
        assert!(session.kind(OTHER).is_none());
        assert_eq!(session.interpolator().buffered(OTHER), 0);
    }

    #[test]
    fn own_despawn_discards_prediction_state() {
        let mut session = session();
        session.handle_payload(&spawn(0, OWN, 0.0));
        for _ in 0..5 {
            session.tick(&InputState {
                move_direction: [1.0, 0.0],
                ..Default::default()
            });
        }
        session.handle_payload(&snapshot(1, vec![player_net(OWN, 0.1, 100)]));
        session.handle_payload(&PacketType::Ack(AckMessage { tick: 7, ack_seq: 2 }));
        assert_eq!(session.predictor().pending_len(), 5);

        session.handle_payload(&PacketType::Reliable {
            sequence: 1,
            message: ReliableMessage::Despawn { entity_id: OWN },
        });
        session.handle_payload(&snapshot(2, vec![player_net(OWN, 0.2, 100)]));
        session.handle_payload(&spawn(2, OWN, 0.0));

        assert!(!session.is_ready());
        assert!(session.kind(OWN).is_none());
        assert_eq!(session.predictor().pending_len(), 0);
        assert_eq!(session.predictor().record_count(), 0);
        assert_eq!(*session.predicted_state(), EntityState::default());
        assert!(session.tick(&InputState::default()).is_none());
    }

    #[test]
    fn despawn_history_is_bounded() {
        let mut session = session();
        for id in 0..(DESPAWNED_HISTORY as u32 + 10) {
            session.handle_payload(&PacketType::Reliable {
                sequence: id + 1,
                message: ReliableMessage::Despawn {
                    entity_id: 1000 + id,
                },
            });
        }
        // A repeated despawn does not take a second slot.
        session.handle_payload(&PacketType::Reliable {
            sequence: 9999,
            message: ReliableMessage::Despawn {
                entity_id: 1000 + DESPAWNED_HISTORY as u32 + 9,
            },
        });

        assert_eq!(session.despawned.len(), DESPAWNED_HISTORY);
        assert_eq!(session.despawned.front(), Some(&1010));
    }

    #[test]
    fn stale_snapshots_are_dropped() {
        let mut session = session();
        session.handle_payload(&spawn(0, OTHER, 0.0));
        session.handle_payload(&snapshot(5, vec![player_net(OTHER, 5.0, 100)]));
        session.handle_payload(&snapshot(4, vec![player_net(OTHER, 4.0, 100)]));

        assert_eq!(session.last_snapshot_tick(), Some(5));
        assert_eq!(session.interpolator().buffered(OTHER), 1);
    }
}
