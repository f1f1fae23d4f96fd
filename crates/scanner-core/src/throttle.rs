//! Request throttling shared by the HTTP adapters.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Token-bucket throttle. The bucket starts full with `capacity` tokens and
/// refills continuously at a fixed rate; each request spends one token, and
/// callers sleep on an empty bucket until the next token accrues.
pub struct Throttle {
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    updated: Instant,
}

/// Tokens held after `elapsed_secs` of refill, capped at capacity.
fn replenish(tokens: f64, capacity: f64, refill_per_sec: f64, elapsed_secs: f64) -> f64 {
    (tokens + elapsed_secs * refill_per_sec).min(capacity)
}

impl Throttle {
    pub fn new(capacity: usize, per: Duration) -> Self {
        let capacity = capacity.max(1) as f64;
        Self {
            capacity,
            refill_per_sec: capacity / per.as_secs_f64().max(f64::EPSILON),
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                updated: Instant::now(),
            }),
        }
    }

    /// Convenience for the usual requests-per-minute API quota.
    pub fn per_minute(requests: usize) -> Self {
        Self::new(requests, Duration::from_secs(60))
    }

    /// Spend one token, sleeping while the bucket is empty.
    pub async fn acquire(&self) {
        loop {
            let shortfall = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                bucket.tokens = replenish(
                    bucket.tokens,
                    self.capacity,
                    self.refill_per_sec,
                    now.duration_since(bucket.updated).as_secs_f64(),
                );
                bucket.updated = now;
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                1.0 - bucket.tokens
            };

            let wait = Duration::from_secs_f64(shortfall / self.refill_per_sec);
            tracing::debug!("request throttled for {:.2}s", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replenish_accrues_at_the_configured_rate() {
        // 2 tokens/sec: half a second buys one token.
        assert!((replenish(0.0, 10.0, 2.0, 0.5) - 1.0).abs() < 1e-9);
        assert!((replenish(3.0, 10.0, 2.0, 2.0) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn replenish_caps_at_capacity() {
        assert_eq!(replenish(9.5, 10.0, 2.0, 60.0), 10.0);
        assert_eq!(replenish(10.0, 10.0, 2.0, 0.0), 10.0);
    }

    #[tokio::test]
    async fn initial_burst_is_not_throttled() {
        let throttle = Throttle::per_minute(5);
        let started = std::time::Instant::now();
        for _ in 0..5 {
            throttle.acquire().await;
        }
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn empty_bucket_makes_the_caller_wait() {
        // 2 tokens per 100ms: the third acquire needs ~50ms of refill.
        let throttle = Throttle::new(2, Duration::from_millis(100));
        let started = std::time::Instant::now();
        for _ in 0..3 {
            throttle.acquire().await;
        }
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
