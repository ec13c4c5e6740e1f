//! Authentication and authorization webhook for a cluster orchestrator.
//!
//! Token reviews and subject-access reviews are routed by organization tag
//! to the matching provider adapter.

pub mod auth;
pub mod authz;
pub mod cancel;
pub mod config;
pub mod handlers;
pub mod orgs;
pub mod startup;
pub mod state;

pub use config::WebhookConfig;
pub use startup::{build_router, Application};
pub use state::AppState;
