use crate::config::SimulatorConfig;
use crate::models::MockMetrics;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-lifetime request counters. Each is updated with a single atomic
/// add; a snapshot may straddle concurrent updates.
#[derive(Debug, Default)]
pub struct Counters {
    pub total: AtomicI64,
    pub throttled: AtomicI64,
    pub allowed: AtomicI64,
    pub denied: AtomicI64,
    pub tokens_issued: AtomicI64,
}

impl Counters {
    /// Increment and return the new value.
    pub fn bump(counter: &AtomicI64) -> i64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<SimulatorConfig>,
    pub counters: Arc<Counters>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config: Arc::new(config),
            counters: Arc::new(Counters::default()),
            started_at: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> MockMetrics {
        let c = &self.counters;
        let cfg = &self.config;
        MockMetrics {
            total_requests: c.total.load(Ordering::Relaxed),
            throttled: c.throttled.load(Ordering::Relaxed),
            allowed: c.allowed.load(Ordering::Relaxed),
            denied: c.denied.load(Ordering::Relaxed),
            tokens_issued: c.tokens_issued.load(Ordering::Relaxed),
            uptime_seconds: self.started_at.elapsed().as_secs() as i64,
            config_port: i64::from(cfg.port),
            config_min_lat: cfg.min_latency_ms,
            config_max_lat: cfg.max_latency_ms,
            config_allow: (cfg.allow_rate * 100.0) as i64,
            config_throttle: (cfg.throttle_rate * 100.0) as i64,
        }
    }
}
