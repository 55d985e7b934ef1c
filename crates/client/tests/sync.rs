use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use skirmish::{
    EntityState, InputCommand, PacketType, ReliableChannel, ReliableMessage, SimulationLoop,
    Snapshot,
};
use skirmish_client::{ClientConfig, ClientSession, InputState};

const TICK_RATE: u32 = 60;

fn config() -> ClientConfig {
    ClientConfig {
        tick_rate: TICK_RATE,
        ..Default::default()
    }
}

/// One direction of a simulated network path, measured in ticks.
struct Link {
    latency: u64,
    loss: f64,
    queue: Vec<(u64, PacketType)>,
}

impl Link {
    fn new(latency: u64, loss: f64) -> Self {
        Self {
            latency,
            loss,
            queue: Vec::new(),
        }
    }

    fn send(&mut self, rng: &mut StdRng, now: u64, payload: PacketType) {
        if self.loss > 0.0 && rng.gen_bool(self.loss) {
            return;
        }
        self.queue.push((now + self.latency, payload));
    }

    fn receive(&mut self, now: u64) -> Vec<PacketType> {
        let (due, later): (Vec<_>, Vec<_>) =
            self.queue.drain(..).partition(|(at, _)| *at <= now);
        self.queue = later;
        due.into_iter().map(|(_, payload)| payload).collect()
    }
}

struct Peer {
    id: u32,
    session: ClientSession,
    reliable: ReliableChannel,
    downlink: Link,
    uplink: Link,
}

/// Authoritative server plus client sessions, wired together in memory.
struct Harness {
    sim: SimulationLoop,
    peers: Vec<Peer>,
    rng: StdRng,
    now: u64,
    history: BTreeMap<u32, Snapshot>,
}

impl Harness {
    fn new(seed: u64) -> Self {
        Self {
            sim: SimulationLoop::new(TICK_RATE),
            peers: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            now: 0,
            history: BTreeMap::new(),
        }
    }

    fn connect(&mut self, latency: u64, loss: f64) -> u32 {
        let spawn = self.sim.connect();
        let id = spawn.entity.entity_id;

        for peer in &mut self.peers {
            peer.reliable.push(ReliableMessage::Spawn(spawn));
        }

        let mut reliable = ReliableChannel::new(Duration::ZERO, 256);
        for message in self.sim.spawn_messages() {
            reliable.push(ReliableMessage::Spawn(message));
        }

        self.peers.push(Peer {
            id,
            session: ClientSession::new(id, &config()),
            reliable,
            downlink: Link::new(latency, loss),
            uplink: Link::new(latency, loss),
        });
        id
    }

    fn disconnect(&mut self, id: u32) {
        self.sim.despawn(id);
        self.peers.retain(|peer| peer.id != id);
        for peer in &mut self.peers {
            peer.reliable.discard_spawn_of(id);
            peer.reliable.push(ReliableMessage::Despawn { entity_id: id });
        }
    }

    fn client_phase(&mut self, input: impl Fn(u32, u64) -> InputState) {
        let Self {
            peers, rng, now, ..
        } = self;

        for peer in peers.iter_mut() {
            for payload in peer.downlink.receive(*now) {
                peer.session.handle_payload(&payload);
            }
            peer.session.tick(&input(peer.id, *now));
            for payload in peer.session.drain_outbox() {
                peer.uplink.send(rng, *now, payload);
            }
        }
    }

    fn server_phase(&mut self) {
        let Self {
            sim,
            peers,
            rng,
            now,
            history,
        } = self;

        for peer in peers.iter_mut() {
            for payload in peer.uplink.receive(*now) {
                match payload {
                    PacketType::Input(message) => {
                        sim.receive_input(peer.id, InputCommand::from_message(&message));
                    }
                    PacketType::ReliableAck { sequence } => {
                        peer.reliable.ack(sequence);
                    }
                    _ => {}
                }
            }
        }

        let output = sim.step_tick();
        let deliver_at = *now + 1;
        let wire = output.snapshot.to_message();

        for peer in peers.iter_mut() {
            for (sequence, message) in peer.reliable.due(Instant::now()) {
                peer.downlink
                    .send(rng, deliver_at, PacketType::Reliable { sequence, message });
            }
            peer.downlink
                .send(rng, deliver_at, PacketType::Snapshot(wire.clone()));
            if let Some(ack) = output.ack_for(peer.id) {
                peer.downlink.send(rng, deliver_at, PacketType::Ack(ack));
            }
        }

        history.insert(output.snapshot.tick, output.snapshot);
        *now += 1;
    }

    fn step(&mut self, input: impl Fn(u32, u64) -> InputState) {
        self.client_phase(input);
        self.server_phase();
    }

    fn peer(&self, id: u32) -> &Peer {
        self.peers
            .iter()
            .find(|peer| peer.id == id)
            .expect("peer is connected")
    }

    fn server_state(&self, id: u32) -> EntityState {
        *self.sim.snapshot().state(id).expect("entity exists")
    }
}

fn circle(now: u64) -> InputState {
    let t = now as f32 * 0.05;
    InputState {
        move_direction: [t.cos(), t.sin()],
        aim_direction: [t.cos(), t.sin()],
        ..Default::default()
    }
}

fn idle() -> InputState {
    InputState::default()
}

#[test]
fn clean_link_never_corrects() {
    let mut harness = Harness::new(1);
    let id = harness.connect(0, 0.0);

    for _ in 0..120 {
        harness.step(|_, now| circle(now));
    }

    let stats = *harness.peer(id).session.reconcile_stats();
    assert_eq!(stats.corrected, 0);
    assert!(stats.accepted > 100);
    assert_eq!(stats.max_error, 0.0);
}

#[test]
fn latency_alone_never_corrects() {
    let mut harness = Harness::new(2);
    let id = harness.connect(4, 0.0);

    for _ in 0..150 {
        harness.step(|_, now| circle(now));
    }

    let session = &harness.peer(id).session;
    assert_eq!(session.reconcile_stats().corrected, 0);
    assert!(session.reconcile_stats().accepted > 100);
    // Roughly one round trip of inputs stays in flight.
    assert!(session.predictor().pending_len() <= 12);
}

#[test]
fn superseded_inputs_are_corrected_and_converge() {
    let mut harness = Harness::new(3);
    let id = harness.connect(0, 0.0);
    harness.step(|_, _| idle());

    // Two client ticks per server tick: the server only ever sees the newer one.
    for _ in 0..30 {
        harness.client_phase(|_, now| circle(now));
        harness.client_phase(|_, now| circle(now));
        harness.server_phase();
    }
    for _ in 0..10 {
        harness.step(|_, _| idle());
    }

    let session = &harness.peer(id).session;
    assert!(session.reconcile_stats().corrected > 0);
    let error = session
        .predicted_state()
        .position_error(&harness.server_state(id));
    assert!(error < config().prediction.reconcile_threshold, "error {error}");
}

#[test]
fn lossy_link_converges_once_input_settles() {
    let mut harness = Harness::new(4);
    let id = harness.connect(3, 0.1);

    for _ in 0..200 {
        harness.step(|_, now| circle(now));
    }
    for _ in 0..60 {
        harness.step(|_, _| idle());
    }

    let session = &harness.peer(id).session;
    assert!(session.is_ready());
    assert!(session.reconcile_stats().corrected > 0);
    let error = session
        .predicted_state()
        .position_error(&harness.server_state(id));
    assert!(error < config().prediction.reconcile_threshold, "error {error}");
    assert!(session.predictor().pending_len() <= config().prediction.max_pending_inputs);
}

#[test]
fn remote_entities_render_two_ticks_behind() {
    let mut harness = Harness::new(5);
    let mover = harness.connect(0, 0.0);
    let watcher = harness.connect(0, 0.0);

    for step in 0..90 {
        harness.step(|id, now| if id == mover { circle(now) } else { idle() });

        if step < 5 {
            continue;
        }
        let session = &harness.peer(watcher).session;
        let render_tick = session
            .interpolator()
            .render_tick()
            .expect("enough snapshots buffered");
        let expected = *harness.history[&render_tick]
            .state(mover)
            .expect("mover in snapshot");
        let seen = *session.remote_state(mover).expect("mover is visible");

        assert_eq!(seen.position, expected.position);
        assert!((seen.orientation - expected.orientation).abs() < 1.0e-5);
    }

    // Once the mover stops, the delayed view catches up exactly.
    for _ in 0..10 {
        harness.step(|_, _| idle());
    }
    harness.client_phase(|_, _| idle());
    let seen = harness
        .peer(watcher)
        .session
        .remote_state(mover)
        .copied()
        .expect("mover is visible");
    assert_eq!(seen.position, harness.server_state(mover).position);
}

#[test]
fn late_joiner_sees_existing_entities() {
    let mut harness = Harness::new(6);
    let first = harness.connect(0, 0.0);
    let drone = harness.sim.spawn_drone(glam::Vec2::new(5.0, 5.0), 0.5);
    for peer in &mut harness.peers {
        peer.reliable.push(ReliableMessage::Spawn(drone));
    }
    for _ in 0..20 {
        harness.step(|_, now| circle(now));
    }

    let late = harness.connect(1, 0.0);
    for _ in 0..10 {
        harness.step(|_, _| idle());
    }

    let session = &harness.peer(late).session;
    assert!(session.is_ready());
    assert_eq!(session.known_entities(), 3);
    assert!(session.remote_state(first).is_some());
    assert!(harness.peer(first).session.remote_state(drone.entity.entity_id).is_some());
}

#[test]
fn disconnect_removes_entity_everywhere() {
    let mut harness = Harness::new(7);
    let stayer = harness.connect(1, 0.0);
    let leaver = harness.connect(1, 0.0);

    for _ in 0..20 {
        harness.step(|_, now| circle(now));
    }
    assert!(harness.peer(stayer).session.remote_state(leaver).is_some());

    harness.disconnect(leaver);
    assert!(!harness
        .sim
        .receive_input(leaver, InputCommand::neutral()));

    for _ in 0..10 {
        harness.step(|_, now| circle(now));
    }

    let session = &harness.peer(stayer).session;
    assert!(session.remote_state(leaver).is_none());
    assert!(session.kind(leaver).is_none());
    assert_eq!(session.interpolator().buffered(leaver), 0);
    assert!(harness.sim.snapshot().state(leaver).is_none());
}
