//! Per-worker success/failure accounting.

use std::sync::atomic::{AtomicU64, Ordering};

/// Failure threshold: a worker that has never succeeded but keeps failing is
/// assumed broken (bad GPU, unreachable services) and kills itself so the
/// broker re-delivers its jobs to healthy peers.
const MAX_FAILURES_WITHOUT_SUCCESS: u64 = 5;
const MAX_RETRIES_WITHOUT_SUCCESS: u64 = 10;

#[derive(Debug, Default)]
pub struct HealthCounters {
    success: AtomicU64,
    failure: AtomicU64,
    retry: AtomicU64,
}

impl HealthCounters {
    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retry.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.success.load(Ordering::Relaxed),
            self.failure.load(Ordering::Relaxed),
            self.retry.load(Ordering::Relaxed),
        )
    }

    /// True when the worker should terminate itself: zero successes combined
    /// with sustained failures or retries.
    pub fn should_terminate(&self) -> bool {
        let (success, failure, retry) = self.snapshot();
        success == 0
            && (failure > MAX_FAILURES_WITHOUT_SUCCESS || retry > MAX_RETRIES_WITHOUT_SUCCESS)
    }
}
