pub mod net;

pub use net::{
    ClientConfig, ClientPredictor, ClientSession, InputState, NetworkClient, ReconcileOutcome,
    ReconcileStats, Reconciler, RemoteInterpolator,
};
