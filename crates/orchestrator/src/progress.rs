//! Progress tracking for dispatched targets

use tokio::sync::Mutex;
use tracing::info;

use tlsmark_common::FingerprintResult;

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Completed targets with at least one placeholder probe.
    pub degraded: usize,
}

impl ProgressSnapshot {
    pub fn finished(&self) -> usize {
        self.completed + self.failed
    }
}

pub struct ProgressTracker {
    total: Mutex<usize>,
    completed: Mutex<usize>,
    failed: Mutex<usize>,
    degraded: Mutex<usize>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            total: Mutex::new(0),
            completed: Mutex::new(0),
            failed: Mutex::new(0),
            degraded: Mutex::new(0),
        }
    }

    pub async fn set_total(&self, total: usize) {
        *self.total.lock().await = total;
    }

    pub async fn increment_completed(&self) {
        *self.completed.lock().await += 1;
    }

    pub async fn increment_failed(&self) {
        *self.failed.lock().await += 1;
    }

    pub async fn increment_degraded(&self) {
        *self.degraded.lock().await += 1;
    }

    /// Count one finished result in the right buckets.
    pub async fn record(&self, result: &FingerprintResult) {
        if result.is_ok() {
            self.increment_completed().await;
            if result.is_degraded() {
                self.increment_degraded().await;
            }
        } else {
            self.increment_failed().await;
        }
    }

    pub async fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: *self.total.lock().await,
            completed: *self.completed.lock().await,
            failed: *self.failed.lock().await,
            degraded: *self.degraded.lock().await,
        }
    }

    pub async fn log_summary(&self) {
        let s = self.snapshot().await;

        info!("Fingerprint Summary:");
        info!("  Total targets: {}", s.total);
        info!("  Completed: {}", s.completed);
        info!("  Degraded: {}", s.degraded);
        info!("  Failed: {}", s.failed);
        if s.total > 0 {
            info!("  Success rate: {:.1}%", (s.completed as f64 / s.total as f64) * 100.0);
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
