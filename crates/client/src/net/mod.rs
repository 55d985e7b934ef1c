pub mod client;
pub mod config;
pub mod input;
pub mod interpolation;
pub mod prediction;
pub mod reconciliation;
pub mod session;

pub use client::NetworkClient;
pub use config::{ClientConfig, InterpolationConfig, PredictionConfig};
pub use input::InputState;
pub use interpolation::RemoteInterpolator;
pub use prediction::ClientPredictor;
pub use reconciliation::{ReconcileOutcome, ReconcileStats, Reconciler};
pub use session::ClientSession;
