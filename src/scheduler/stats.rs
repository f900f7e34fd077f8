// src/scheduler/stats.rs
//! Scheduler statistics

use serde::Serialize;
use std::time::Duration;

/// Point-in-time scheduler counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStats {
    /// Tasks waiting on dependencies
    pub blocked: usize,

    /// Tasks eligible for dispatch (including ones waiting out a retry backoff)
    pub pending: usize,

    /// Tasks with a handler in flight
    pub running: usize,

    /// Tasks that reached `Complete` since startup
    pub completed: u64,

    /// Tasks that reached `Failed` since startup
    pub failed: u64,

    /// Handler failures that were retried
    pub retried: u64,

    /// Running average of enqueue-to-complete latency (milliseconds)
    pub avg_latency_ms: f64,

    /// Concurrency bound
    pub concurrency: usize,
}

impl SchedulerStats {
    /// Tasks not yet settled
    pub fn in_flight(&self) -> usize {
        self.blocked + self.pending + self.running
    }

    /// Share of settled tasks that failed, as a percentage
    pub fn failure_rate(&self) -> f64 {
        let settled = self.completed + self.failed;
        if settled == 0 {
            0.0
        } else {
            (self.failed as f64 / settled as f64) * 100.0
        }
    }

    /// Share of the pool currently busy, as a percentage
    pub fn utilization(&self) -> f64 {
        if self.concurrency == 0 {
            0.0
        } else {
            (self.running as f64 / self.concurrency as f64) * 100.0
        }
    }
}

/// Incremental running mean of task latency
#[derive(Debug, Clone, Default)]
pub struct LatencyTracker {
    samples: u64,
    mean_ms: f64,
}

impl LatencyTracker {
    pub fn record(&mut self, latency: Duration) {
        self.samples += 1;
        let sample = latency.as_secs_f64() * 1000.0;
        self.mean_ms += (sample - self.mean_ms) / self.samples as f64;
    }

    pub fn mean_ms(&self) -> f64 {
        self.mean_ms
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_average() {
        let mut tracker = LatencyTracker::default();
        tracker.record(Duration::from_millis(10));
        tracker.record(Duration::from_millis(30));
        tracker.record(Duration::from_millis(20));

        assert_eq!(tracker.samples(), 3);
        assert!((tracker.mean_ms() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_rates() {
        let stats = SchedulerStats {
            running: 2,
            completed: 3,
            failed: 1,
            concurrency: 4,
            ..Default::default()
        };

        assert_eq!(stats.failure_rate(), 25.0);
        assert_eq!(stats.utilization(), 50.0);
        assert_eq!(stats.in_flight(), 2);
    }

    #[test]
    fn test_empty_rates() {
        let stats = SchedulerStats::default();
        assert_eq!(stats.failure_rate(), 0.0);
        assert_eq!(stats.utilization(), 0.0);
    }
}
