use skirmish::DEFAULT_TICK_RATE;

#[derive(Debug, Clone)]
pub struct PredictionConfig {
    /// Cap on unacknowledged inputs and on prediction records.
    pub max_pending_inputs: usize,
    /// Position error below which a prediction is accepted as is.
    pub reconcile_threshold: f32,
    /// Back-to-back corrections before the mismatch is reported.
    pub warn_after_corrections: u32,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            max_pending_inputs: 128,
            reconcile_threshold: 0.01,
            warn_after_corrections: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InterpolationConfig {
    /// Remote entities are rendered this many ticks behind the newest snapshot.
    pub delay_ticks: u32,
    pub buffer_depth: usize,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            delay_ticks: 2,
            buffer_depth: skirmish::snapshot::DEFAULT_BUFFER_DEPTH,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub tick_rate: u32,
    pub connection_timeout_secs: u64,
    pub connect_retry_ms: u64,
    pub ping_interval_secs: f32,
    pub prediction: PredictionConfig,
    pub interpolation: InterpolationConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            connection_timeout_secs: 10,
            connect_retry_ms: 500,
            ping_interval_secs: 0.25,
            prediction: PredictionConfig::default(),
            interpolation: InterpolationConfig::default(),
        }
    }
}
