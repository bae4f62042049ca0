//! Gateway counters
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Relaxed atomics; readers tolerate slightly stale values

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Request outcome counters
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    /// Requests received
    requests: AtomicU64,
    /// Requests rejected by validation
    rejected: AtomicU64,
    /// Store calls that completed
    executed: AtomicU64,
    /// Store calls that returned an error
    failed: AtomicU64,
    /// Store calls that hit the timeout
    timed_out: AtomicU64,
    /// Completed calls that mutated the store
    writes: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_writes(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub rejected: u64,
    pub executed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub writes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_metrics_are_zero() {
        assert_eq!(GatewayMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increments() {
        let m = GatewayMetrics::new();
        m.increment_requests();
        m.increment_requests();
        m.increment_rejected();
        m.increment_timed_out();

        let s = m.snapshot();
        assert_eq!(s.requests, 2);
        assert_eq!(s.rejected, 1);
        assert_eq!(s.timed_out, 1);
        assert_eq!(s.executed, 0);
    }

    #[test]
    fn test_concurrent_increments() {
        let m = Arc::new(GatewayMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&m);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        m.increment_executed();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(m.snapshot().executed, 8000);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(GatewayMetrics::new().snapshot()).unwrap();
        assert_eq!(json["timed_out"], 0);
    }
}
