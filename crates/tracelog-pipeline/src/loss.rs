use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

/// Summary emitted when dropped events are reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LossReport {
    /// Events dropped since the previous report.
    pub lost: u64,
    /// Events dropped since the monitor was created.
    pub total: u64,
    /// Time elapsed since the previous report.
    pub elapsed: Duration,
}

/// Counts events dropped on queue overflow and throttles the warning.
///
/// A warning is logged at most once per `interval`, or earlier once
/// `threshold` losses have piled up since the last one. The report lock is
/// only ever `try_lock`ed: a producer that loses the race simply skips
/// reporting, so recording a loss never blocks.
pub struct LossMonitor {
    total: AtomicU64,
    since_report: AtomicU64,
    last_report: Mutex<Instant>,
    interval: Duration,
    threshold: u64,
}

impl LossMonitor {
    pub fn new(interval: Duration, threshold: u64) -> Self {
        Self {
            total: AtomicU64::new(0),
            since_report: AtomicU64::new(0),
            last_report: Mutex::new(Instant::now()),
            interval,
            threshold: threshold.max(1),
        }
    }

    /// Count one dropped event. Returns the report if a warning was logged.
    pub fn record(&self) -> Option<LossReport> {
        self.total.fetch_add(1, Ordering::Relaxed);
        let pending = self.since_report.fetch_add(1, Ordering::Relaxed) + 1;

        let mut last = self.last_report.try_lock().ok()?;
        let elapsed = last.elapsed();
        if elapsed < self.interval && pending < self.threshold {
            return None;
        }

        let report = LossReport {
            lost: self.since_report.swap(0, Ordering::Relaxed),
            total: self.total(),
            elapsed,
        };
        *last = Instant::now();

        warn!(
            lost = report.lost,
            total = report.total,
            elapsed_ms = elapsed.as_millis() as u64,
            "trace queue full; events dropped"
        );
        Some(report)
    }

    /// Total events dropped so far. Never decreases.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_every_loss() {
        let m = LossMonitor::new(Duration::from_secs(3600), u64::MAX);
        for _ in 0..10 {
            m.record();
        }
        assert_eq!(m.total(), 10);
    }

    #[test]
    fn quiet_within_interval_below_threshold() {
        let m = LossMonitor::new(Duration::from_secs(3600), 100);
        assert!(m.record().is_none());
        assert!(m.record().is_none());
    }

    #[test]
    fn threshold_triggers_report_and_resets() {
        let m = LossMonitor::new(Duration::from_secs(3600), 3);
        assert!(m.record().is_none());
        assert!(m.record().is_none());
        let report = m.record().expect("third loss reaches threshold");
        assert_eq!(report.lost, 3);
        assert_eq!(report.total, 3);

        // Interval counter restarted; cumulative total did not.
        assert!(m.record().is_none());
        assert_eq!(m.total(), 4);
    }

    #[test]
    fn interval_triggers_report() {
        let m = LossMonitor::new(Duration::from_millis(10), u64::MAX);
        std::thread::sleep(Duration::from_millis(20));
        let report = m.record().expect("interval elapsed");
        assert_eq!(report.lost, 1);
        assert!(report.elapsed >= Duration::from_millis(10));
    }
}
