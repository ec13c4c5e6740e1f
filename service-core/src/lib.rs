//! service-core: Shared infrastructure for the guard webhook and its simulator.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod reload;
pub mod shutdown;
