// src/engine/progress.rs
//! Progress reporting
//!
//! The tick engine publishes into a `watch` channel; pollers read the latest
//! value without ever waiting on the tick that produces it.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Planning,
    Generating,
    Integrating,
    Saving,
    Complete,
    Failed,
}

impl Phase {
    /// Share of one tick that is done once this phase starts
    fn tick_fraction(&self) -> f64 {
        match self {
            Phase::Idle | Phase::Planning => 0.0,
            Phase::Generating => 0.1,
            Phase::Integrating => 0.8,
            Phase::Saving => 0.95,
            Phase::Complete | Phase::Failed => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// Last committed tick
    pub tick: u64,
    pub target_ticks: u64,
    pub phase: Phase,
    pub percent_complete: f64,
    pub last_event_summary: Option<String>,

    /// Universe status (`active`, `complete`, `failed`)
    pub status: String,

    /// Generation tasks of the tick in flight
    pub tasks_total: usize,
    pub tasks_settled: usize,
}

impl ProgressSnapshot {
    fn recompute(&mut self) {
        if matches!(self.phase, Phase::Complete) {
            self.percent_complete = 100.0;
            return;
        }
        if self.target_ticks == 0 {
            self.percent_complete = 0.0;
            return;
        }

        let mut within = self.phase.tick_fraction();
        if self.phase == Phase::Generating && self.tasks_total > 0 {
            let done = self.tasks_settled as f64 / self.tasks_total as f64;
            within += done * (Phase::Integrating.tick_fraction() - within);
        }
        if self.phase == Phase::Failed {
            within = 0.0;
        }

        let ticks = (self.tick as f64 + within).min(self.target_ticks as f64);
        self.percent_complete = ticks / self.target_ticks as f64 * 100.0;
    }
}

/// Write side, shared by the universe and its tick engine
#[derive(Clone)]
pub struct ProgressReporter {
    tx: Arc<watch::Sender<ProgressSnapshot>>,
}

impl ProgressReporter {
    pub fn new(tick: u64, target_ticks: u64) -> Self {
        let mut initial = ProgressSnapshot {
            tick,
            target_ticks,
            phase: Phase::Idle,
            percent_complete: 0.0,
            last_event_summary: None,
            status: "active".to_string(),
            tasks_total: 0,
            tasks_settled: 0,
        };
        initial.recompute();

        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn handle(&self) -> ProgressHandle {
        ProgressHandle {
            rx: self.tx.subscribe(),
        }
    }

    fn update(&self, f: impl FnOnce(&mut ProgressSnapshot)) {
        self.tx.send_modify(|snapshot| {
            f(snapshot);
            snapshot.recompute();
        });
    }

    pub fn set_phase(&self, phase: Phase) {
        self.update(|s| {
            s.phase = phase;
            if phase != Phase::Generating {
                s.tasks_total = 0;
                s.tasks_settled = 0;
            }
        });
    }

    pub fn set_tasks(&self, settled: usize, total: usize) {
        self.update(|s| {
            s.tasks_settled = settled;
            s.tasks_total = total;
        });
    }

    /// A tick was committed
    pub fn tick_committed(&self, tick: u64, last_event_summary: Option<String>) {
        self.update(|s| {
            s.tick = tick;
            if last_event_summary.is_some() {
                s.last_event_summary = last_event_summary;
            }
        });
    }

    pub fn set_status(&self, status: &str, phase: Phase) {
        self.update(|s| {
            s.status = status.to_string();
            s.phase = phase;
        });
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.tx.borrow().clone()
    }
}

/// Read side for pollers
#[derive(Clone)]
pub struct ProgressHandle {
    rx: watch::Receiver<ProgressSnapshot>,
}

impl ProgressHandle {
    /// Latest published state; never blocks
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next update; `false` once the reporter is gone
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_tracks_ticks_and_tasks() {
        let reporter = ProgressReporter::new(0, 10);
        let handle = reporter.handle();
        assert_eq!(handle.snapshot().percent_complete, 0.0);

        reporter.tick_committed(4, Some("[tick 4] meeting: sync".into()));
        assert!((handle.snapshot().percent_complete - 40.0).abs() < 1e-9);

        reporter.set_phase(Phase::Generating);
        reporter.set_tasks(2, 4);
        let snap = handle.snapshot();
        assert!(snap.percent_complete > 41.0 && snap.percent_complete < 48.0);
        assert_eq!(snap.last_event_summary.as_deref(), Some("[tick 4] meeting: sync"));
    }

    #[test]
    fn test_complete_is_full() {
        let reporter = ProgressReporter::new(3, 10);
        reporter.set_status("complete", Phase::Complete);
        assert_eq!(reporter.snapshot().percent_complete, 100.0);
        assert_eq!(reporter.snapshot().status, "complete");
    }

    #[tokio::test]
    async fn test_handle_sees_updates() {
        let reporter = ProgressReporter::new(0, 2);
        let mut handle = reporter.handle();

        reporter.set_phase(Phase::Planning);
        assert!(handle.changed().await);
        assert_eq!(handle.snapshot().phase, Phase::Planning);

        drop(reporter);
        assert!(!handle.changed().await);
    }
}
