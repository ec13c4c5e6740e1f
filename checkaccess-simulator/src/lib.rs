//! Stand-in for the Azure CheckAccess data plane: an OAuth-style token
//! endpoint, a batched decision endpoint with injected latency, throttling
//! and allow/deny mix, and JSON counters.

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod startup;
pub mod state;

pub use config::SimulatorConfig;
pub use startup::{build_router, Application};
pub use state::AppState;
