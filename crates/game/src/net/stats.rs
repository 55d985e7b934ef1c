use rand::Rng;

/// Artificial loss and latency applied to outgoing traffic for testing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    /// 0-100.
    pub loss_percent: f32,
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
}

impl PacketLossSimulation {
    pub fn should_drop(&self) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_range(0.0..100.0) < self.loss_percent
    }

    pub fn delay_ms(&self) -> u32 {
        if !self.enabled || self.max_latency_ms == 0 {
            return 0;
        }
        let mut rng = rand::thread_rng();
        let base = self.min_latency_ms.min(self.max_latency_ms);
        let jitter = if self.jitter_ms > 0 {
            rng.gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        rng.gen_range(base..=self.max_latency_ms) + jitter
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub rtt_ms: f32,
}

impl NetworkStats {
    /// Exponentially smoothed round trip estimate.
    pub fn record_rtt(&mut self, sample_ms: f32) {
        const ALPHA: f32 = 0.125;
        if self.rtt_ms <= 0.0 {
            self.rtt_ms = sample_ms;
        } else {
            self.rtt_ms += (sample_ms - self.rtt_ms) * ALPHA;
        }
    }
}
