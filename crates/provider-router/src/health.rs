use chrono::Utc;
use scanner_core::{ProviderError, ProviderHealth, ProviderStatus};

/// EWMA weight for the most recent outcome. Deliberately slower than the
/// circuit breaker so a short failure run opens the circuit before the
/// health filter writes the adapter off entirely.
const ALPHA: f64 = 0.1;

/// Rolling health bookkeeping for one adapter, derived from call outcomes.
pub struct HealthTracker {
    health: ProviderHealth,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            health: ProviderHealth {
                status: ProviderStatus::Healthy,
                last_check: Utc::now(),
                latency_ms: None,
                success_rate: 1.0,
                rate_limit_remaining: None,
                rate_limit_reset: None,
                error_message: None,
            },
        }
    }

    pub fn snapshot(&self) -> ProviderHealth {
        self.health.clone()
    }

    pub fn record_success(&mut self, latency_ms: u64) {
        self.health.success_rate = self.health.success_rate * (1.0 - ALPHA) + ALPHA;
        self.health.latency_ms = Some(latency_ms);
        self.health.last_check = Utc::now();
        self.health.error_message = None;
        self.health.status = Self::status_from_rate(self.health.success_rate);
    }

    pub fn record_failure(&mut self, error: &ProviderError) {
        self.health.success_rate *= 1.0 - ALPHA;
        self.health.last_check = Utc::now();
        self.health.error_message = Some(error.to_string());
        self.health.status = match error {
            // Bad credentials stay bad until the configuration changes.
            ProviderError::Authentication(_) => ProviderStatus::Unhealthy,
            ProviderError::RateLimited { .. } => ProviderStatus::Degraded,
            _ => Self::status_from_rate(self.health.success_rate),
        };
    }

    /// Overwrite from an explicit health probe.
    pub fn apply_probe(&mut self, probed: ProviderHealth) {
        self.health = probed;
    }

    fn status_from_rate(rate: f64) -> ProviderStatus {
        if rate >= 0.9 {
            ProviderStatus::Healthy
        } else if rate >= 0.5 {
            ProviderStatus::Degraded
        } else {
            ProviderStatus::Unhealthy
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_failures_degrade_then_kill() {
        let mut tracker = HealthTracker::new();
        let err = ProviderError::Transient("reset".into());
        for _ in 0..3 {
            tracker.record_failure(&err);
        }
        assert_eq!(tracker.snapshot().status, ProviderStatus::Degraded);
        for _ in 0..5 {
            tracker.record_failure(&err);
        }
        assert_eq!(tracker.snapshot().status, ProviderStatus::Unhealthy);
    }

    #[test]
    fn auth_failure_is_immediately_unhealthy() {
        let mut tracker = HealthTracker::new();
        tracker.record_failure(&ProviderError::Authentication("rejected".into()));
        assert_eq!(tracker.snapshot().status, ProviderStatus::Unhealthy);
    }

    #[test]
    fn success_recovers() {
        let mut tracker = HealthTracker::new();
        let err = ProviderError::Transient("reset".into());
        for _ in 0..8 {
            tracker.record_failure(&err);
        }
        assert_eq!(tracker.snapshot().status, ProviderStatus::Unhealthy);
        for _ in 0..20 {
            tracker.record_success(10);
        }
        assert_eq!(tracker.snapshot().status, ProviderStatus::Healthy);
    }
}
