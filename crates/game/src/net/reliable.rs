use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::protocol::ReliableMessage;

pub const DEFAULT_RESEND_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_MAX_PENDING: usize = 256;
const RECEIVE_WINDOW: usize = 512;

#[derive(Debug, Clone)]
struct PendingReliable {
    sequence: u32,
    message: ReliableMessage,
    last_sent: Option<Instant>,
}

/// Sender half of the best-effort reliable channel used for spawn and
/// despawn. Messages are resent until acknowledged; nothing waits on them.
#[derive(Debug)]
pub struct ReliableChannel {
    pending: VecDeque<PendingReliable>,
    next_sequence: u32,
    resend_interval: Duration,
    max_pending: usize,
}

impl Default for ReliableChannel {
    fn default() -> Self {
        Self::new(DEFAULT_RESEND_INTERVAL, DEFAULT_MAX_PENDING)
    }
}

impl ReliableChannel {
    pub fn new(resend_interval: Duration, max_pending: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(max_pending.min(64)),
            next_sequence: 0,
            resend_interval,
            max_pending,
        }
    }

    pub fn push(&mut self, message: ReliableMessage) -> u32 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        if self.pending.len() >= self.max_pending {
            if let Some(dropped) = self.pending.pop_front() {
                log::warn!(
                    "Reliable queue full, dropping unacknowledged message {}",
                    dropped.sequence
                );
            }
        }

        self.pending.push_back(PendingReliable {
            sequence,
            message,
            last_sent: None,
        });
        sequence
    }

    /// Messages never sent or whose resend interval elapsed. Marks them sent.
    pub fn due(&mut self, now: Instant) -> Vec<(u32, ReliableMessage)> {
        let interval = self.resend_interval;
        self.pending
            .iter_mut()
            .filter(|p| {
                p.last_sent
                    .is_none_or(|sent| now.saturating_duration_since(sent) >= interval)
            })
            .map(|p| {
                p.last_sent = Some(now);
                (p.sequence, p.message.clone())
            })
            .collect()
    }

    pub fn ack(&mut self, sequence: u32) -> bool {
        match self.pending.iter().position(|p| p.sequence == sequence) {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }

    /// Forgets queued messages about `entity_id`, used when it despawns
    /// before its spawn was delivered.
    pub fn discard_spawn_of(&mut self, entity_id: u32) {
        self.pending.retain(|p| {
            !matches!(&p.message, ReliableMessage::Spawn(spawn) if spawn.entity.entity_id == entity_id)
        });
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Receiver half: filters out resent duplicates.
#[derive(Debug, Default)]
pub struct ReliableReceiver {
    seen: VecDeque<u32>,
}

impl ReliableReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` the first time `sequence` is seen.
    pub fn accept(&mut self, sequence: u32) -> bool {
        if self.seen.contains(&sequence) {
            return false;
        }
        if self.seen.len() >= RECEIVE_WINDOW {
            self.seen.pop_front();
        }
        self.seen.push_back(sequence);
        true
    }

    pub fn reset(&mut self) {
        self.seen.clear();
    }
}
