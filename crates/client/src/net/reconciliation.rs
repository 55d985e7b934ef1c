use skirmish::EntityState;

use super::config::PredictionConfig;
use super::prediction::ClientPredictor;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    /// `ack_seq` 0: the server has not consumed anything yet.
    Ignored,
    /// No prediction was recorded for the acknowledged sequence. Confirmed
    /// inputs are pruned and nothing else changes.
    Unrecorded,
    Accepted { error: f32 },
    Corrected { error: f32, replayed: usize },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileStats {
    pub accepted: u64,
    pub corrected: u64,
    pub unrecorded: u64,
    pub replayed_inputs: u64,
    pub max_error: f32,
    pub last_error: f32,
}

/// Compares acknowledged predictions against the server's state for the
/// same tick and rewinds the predictor when they disagree.
pub struct Reconciler {
    threshold: f32,
    warn_after: u32,
    consecutive_corrections: u32,
    stats: ReconcileStats,
}

impl Reconciler {
    pub fn new(config: &PredictionConfig) -> Self {
        Self {
            threshold: config.reconcile_threshold,
            warn_after: config.warn_after_corrections.max(1),
            consecutive_corrections: 0,
            stats: ReconcileStats::default(),
        }
    }

    pub fn reconcile(
        &mut self,
        predictor: &mut ClientPredictor,
        ack_seq: u32,
        authoritative: &EntityState,
    ) -> ReconcileOutcome {
        if ack_seq == 0 {
            return ReconcileOutcome::Ignored;
        }

        let Some(predicted) = predictor.record(ack_seq).copied() else {
            log::debug!("No prediction recorded for input {}, pruning only", ack_seq);
            predictor.confirm(ack_seq);
            self.stats.unrecorded += 1;
            return ReconcileOutcome::Unrecorded;
        };

        let error = predicted.position_error(authoritative);
        self.stats.last_error = error;
        self.stats.max_error = self.stats.max_error.max(error);

        if error < self.threshold {
            predictor.confirm(ack_seq);
            self.consecutive_corrections = 0;
            self.stats.accepted += 1;
            return ReconcileOutcome::Accepted { error };
        }

        let replayed = predictor.rewind_and_replay(authoritative, ack_seq);
        self.consecutive_corrections += 1;
        self.stats.corrected += 1;
        self.stats.replayed_inputs += replayed as u64;

        log::debug!(
            "Corrected prediction at input {}: error {:.4}, replayed {}",
            ack_seq,
            error,
            replayed
        );
        if self.consecutive_corrections % self.warn_after == 0 {
            log::warn!(
                "{} corrections in a row (last error {:.4}); client and server simulations may diverge",
                self.consecutive_corrections,
                error
            );
        }

        ReconcileOutcome::Corrected { error, replayed }
    }

    pub fn stats(&self) -> &ReconcileStats {
        &self.stats
    }

    pub fn consecutive_corrections(&self) -> u32 {
        self.consecutive_corrections
    }

    pub fn reset(&mut self) {
        self.consecutive_corrections = 0;
        self.stats = ReconcileStats::default();
    }
}
