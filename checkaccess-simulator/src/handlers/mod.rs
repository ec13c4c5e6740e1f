use rand::Rng;
use std::time::Duration;

/// Per-request events go to `info` with `--verbose` and `debug` otherwise.
macro_rules! request_event {
    ($state:expr, $($arg:tt)+) => {
        if $state.config.verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}
pub(crate) use request_event;

pub mod check_access;
pub mod metrics;
pub mod token;

pub use check_access::check_access;
pub use metrics::{health, mock_metrics};
pub use token::issue_token;

/// Uniform in `[min, max)` milliseconds; exactly `min` when the range is
/// empty; nothing when both bounds are non-positive.
pub fn pick_latency<R: Rng + ?Sized>(min_ms: i64, max_ms: i64, rng: &mut R) -> Option<Duration> {
    if min_ms <= 0 && max_ms <= 0 {
        return None;
    }
    let ms = if max_ms > min_ms {
        rng.gen_range(min_ms..max_ms)
    } else {
        min_ms
    };
    Some(Duration::from_millis(ms.max(0) as u64))
}

pub(crate) async fn simulate_latency(min_ms: i64, max_ms: i64) {
    // the thread-local rng must not live across the await
    let latency = pick_latency(min_ms, max_ms, &mut rand::thread_rng());
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
}

/// One Bernoulli trial with success probability `rate`.
pub fn roll<R: Rng + ?Sized>(rate: f64, rng: &mut R) -> bool {
    rng.gen::<f64>() < rate
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn latency_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(pick_latency(0, 0, &mut rng), None);
        assert_eq!(pick_latency(-5, -1, &mut rng), None);
        assert_eq!(pick_latency(30, 10, &mut rng), Some(Duration::from_millis(30)));
        assert_eq!(pick_latency(30, 30, &mut rng), Some(Duration::from_millis(30)));
        assert_eq!(pick_latency(-10, 5, &mut rng).map(|d| d.as_millis() <= 5), Some(true));

        for _ in 0..1000 {
            let latency = pick_latency(10, 50, &mut rng).unwrap().as_millis();
            assert!((10..50).contains(&latency));
        }
    }

    #[test]
    fn roll_edges() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!((0..1000).all(|_| !roll(0.0, &mut rng)));
        assert!((0..1000).all(|_| roll(1.0, &mut rng)));
    }
}
