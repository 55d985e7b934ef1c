use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::protocol::Packet;
use super::stats::PacketLossSimulation;

#[derive(Debug)]
struct DelayedPacket {
    release_time: Instant,
    order: u64,
    packet: Packet,
    addr: SocketAddr,
}

impl PartialEq for DelayedPacket {
    fn eq(&self, other: &Self) -> bool {
        self.release_time == other.release_time && self.order == other.order
    }
}

impl Eq for DelayedPacket {}

impl PartialOrd for DelayedPacket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedPacket {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap on release time.
        other
            .release_time
            .cmp(&self.release_time)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Delays and drops outgoing packets according to per-destination settings,
/// falling back to a global setting. Jitter reorders packets naturally.
#[derive(Debug, Default)]
pub struct NetworkSimulator {
    global: PacketLossSimulation,
    configs: HashMap<SocketAddr, PacketLossSimulation>,
    queue: BinaryHeap<DelayedPacket>,
    next_order: u64,
    dropped: u64,
}

impl NetworkSimulator {
    pub fn new(global: PacketLossSimulation) -> Self {
        Self {
            global,
            ..Self::default()
        }
    }

    pub fn set_config(&mut self, addr: SocketAddr, config: PacketLossSimulation) {
        if config.enabled {
            self.configs.insert(addr, config);
        } else {
            self.configs.remove(&addr);
        }
    }

    pub fn remove(&mut self, addr: &SocketAddr) {
        self.configs.remove(addr);
    }

    pub fn config_for(&self, addr: &SocketAddr) -> &PacketLossSimulation {
        self.configs.get(addr).unwrap_or(&self.global)
    }

    pub fn is_active(&self) -> bool {
        self.global.enabled || !self.configs.is_empty()
    }

    /// Returns `false` if the simulated link dropped the packet.
    pub fn enqueue(&mut self, packet: Packet, addr: SocketAddr, now: Instant) -> bool {
        let config = self.config_for(&addr);
        if config.should_drop() {
            self.dropped += 1;
            return false;
        }

        let delay = Duration::from_millis(config.delay_ms() as u64);
        let order = self.next_order;
        self.next_order += 1;
        self.queue.push(DelayedPacket {
            release_time: now + delay,
            order,
            packet,
            addr,
        });
        true
    }

    pub fn take_due(&mut self, now: Instant) -> Vec<(Packet, SocketAddr)> {
        let mut packets = Vec::new();
        while self.queue.peek().is_some_and(|d| d.release_time <= now) {
            if let Some(delayed) = self.queue.pop() {
                packets.push((delayed.packet, delayed.addr));
            }
        }
        packets
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}
