//! Per-tool reliability tracking and the circuit breaker.
//!
//! Each registry entry owns one `HealthTracker`. Updates take a per-entry
//! lock so concurrent executions of the same tool never lose an update.
//! The breaker resets lazily: the auto-close check runs whenever the state
//! is queried, not on a background timer.

use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Smoothing factor for the latency moving average.
const LATENCY_SMOOTHING: f64 = 0.2;

/// Success/failure counters and breaker state for one tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReliabilityState {
    pub success_count: u32,
    pub failure_count: u32,
    /// Monotonic stamp of the most recent failure, for the reset window.
    pub last_failure_at: Option<Instant>,
    /// Wall-clock stamp of the most recent failure, for error reporting.
    pub last_failure_time: Option<DateTime<Utc>>,
    pub circuit_open: bool,
}

/// Latency and usage counters for one tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceState {
    /// Exponentially weighted average latency in milliseconds.
    pub avg_latency_ms: f64,
    pub call_count: u64,
    pub last_used: Option<DateTime<Utc>>,
}

/// Combined health snapshot for one tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolHealth {
    pub reliability: ReliabilityState,
    pub performance: PerformanceState,
}

/// Lock-guarded health state with breaker thresholds.
#[derive(Debug)]
pub struct HealthTracker {
    threshold: u32,
    reset_window: Duration,
    inner: Mutex<ToolHealth>,
}

impl HealthTracker {
    /// Create a tracker with the given breaker settings.
    pub fn new(threshold: u32, reset_window: Duration) -> Self {
        Self {
            threshold,
            reset_window,
            inner: Mutex::new(ToolHealth::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ToolHealth> {
        // A poisoned lock only means another update panicked mid-write;
        // the counters are still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a successful call.
    ///
    /// A success decrements the failure count by one (floor zero) and, if
    /// the circuit was open, force-closes it regardless of the reset window.
    pub fn record_success(&self, latency: Duration) {
        let mut health = self.lock();
        health.reliability.success_count = health.reliability.success_count.saturating_add(1);
        health.reliability.failure_count = health.reliability.failure_count.saturating_sub(1);
        health.reliability.circuit_open = false;
        update_performance(&mut health.performance, latency);
    }

    /// Record a failed call (including cancellation and timeout).
    pub fn record_failure(&self, latency: Duration) {
        self.record_failure_at(latency, Instant::now());
    }

    fn record_failure_at(&self, latency: Duration, now: Instant) {
        let mut health = self.lock();
        health.reliability.failure_count = health.reliability.failure_count.saturating_add(1);
        health.reliability.last_failure_at = Some(now);
        health.reliability.last_failure_time = Some(Utc::now());
        if health.reliability.failure_count >= self.threshold {
            health.reliability.circuit_open = true;
        }
        update_performance(&mut health.performance, latency);
    }

    /// Whether the circuit is open, applying the lazy auto-reset first.
    pub fn is_circuit_open(&self) -> bool {
        self.is_circuit_open_at(Instant::now())
    }

    fn is_circuit_open_at(&self, now: Instant) -> bool {
        let mut health = self.lock();
        if health.reliability.circuit_open
            && let Some(last_failure) = health.reliability.last_failure_at
            && now.duration_since(last_failure) > self.reset_window
        {
            health.reliability.circuit_open = false;
            health.reliability.failure_count = 0;
        }
        health.reliability.circuit_open
    }

    /// Snapshot of the current counters.
    pub fn snapshot(&self) -> ToolHealth {
        self.lock().clone()
    }
}

fn update_performance(performance: &mut PerformanceState, latency: Duration) {
    let sample_ms = latency.as_secs_f64() * 1_000.0;
    performance.avg_latency_ms = if performance.call_count == 0 {
        sample_ms
    } else {
        LATENCY_SMOOTHING * sample_ms + (1.0 - LATENCY_SMOOTHING) * performance.avg_latency_ms
    };
    performance.call_count += 1;
    performance.last_used = Some(Utc::now());
}

#[cfg(test)]
mod tests {
    use super::*;

    const LATENCY: Duration = Duration::from_millis(10);

    fn tracker(threshold: u32, reset_window: Duration) -> HealthTracker {
        HealthTracker::new(threshold, reset_window)
    }

    #[test]
    fn circuit_opens_exactly_at_the_threshold() {
        let tracker = tracker(3, Duration::from_secs(60));

        tracker.record_failure(LATENCY);
        tracker.record_failure(LATENCY);
        assert!(!tracker.is_circuit_open());

        tracker.record_failure(LATENCY);
        assert!(tracker.is_circuit_open());
        assert_eq!(tracker.snapshot().reliability.failure_count, 3);
    }

    #[test]
    fn success_decrements_by_one_and_force_closes() {
        let tracker = tracker(2, Duration::from_secs(60));
        tracker.record_failure(LATENCY);
        tracker.record_failure(LATENCY);
        assert!(tracker.is_circuit_open());

        tracker.record_success(LATENCY);
        let reliability = tracker.snapshot().reliability;
        assert!(!reliability.circuit_open);
        assert_eq!(reliability.failure_count, 1);
        assert_eq!(reliability.success_count, 1);
    }

    #[test]
    fn failure_count_never_underflows() {
        let tracker = tracker(5, Duration::from_secs(60));
        tracker.record_success(LATENCY);
        assert_eq!(tracker.snapshot().reliability.failure_count, 0);
    }

    #[test]
    fn query_after_reset_window_closes_and_zeroes() {
        let tracker = tracker(1, Duration::from_millis(100));
        let failed_at = Instant::now();
        tracker.record_failure_at(LATENCY, failed_at);
        assert!(tracker.is_circuit_open_at(failed_at + Duration::from_millis(50)));

        // One query past the window both closes the circuit and resets
        // the failure count.
        assert!(!tracker.is_circuit_open_at(failed_at + Duration::from_millis(150)));
        let reliability = tracker.snapshot().reliability;
        assert!(!reliability.circuit_open);
        assert_eq!(reliability.failure_count, 0);
    }

    #[test]
    fn reset_window_is_exclusive_at_the_boundary() {
        let tracker = tracker(1, Duration::from_millis(100));
        let failed_at = Instant::now();
        tracker.record_failure_at(LATENCY, failed_at);

        // Exactly the window elapsed: not yet past it.
        assert!(tracker.is_circuit_open_at(failed_at + Duration::from_millis(100)));
    }

    #[test]
    fn latency_average_is_exponentially_weighted() {
        let tracker = tracker(5, Duration::from_secs(60));
        tracker.record_success(Duration::from_millis(100));
        tracker.record_failure(Duration::from_millis(200));

        let performance = tracker.snapshot().performance;
        assert_eq!(performance.call_count, 2);
        // 0.2 * 200 + 0.8 * 100
        assert!((performance.avg_latency_ms - 120.0).abs() < 1e-9);
        assert!(performance.last_used.is_some());
    }

    #[test]
    fn performance_updates_on_failures_too() {
        let tracker = tracker(5, Duration::from_secs(60));
        tracker.record_failure(Duration::from_millis(30));
        let performance = tracker.snapshot().performance;
        assert_eq!(performance.call_count, 1);
        assert!((performance.avg_latency_ms - 30.0).abs() < 1e-9);
    }
}
