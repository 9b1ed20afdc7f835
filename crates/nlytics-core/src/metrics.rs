//! Atomic counters for pipeline observability.
//!
//! Each [`RetryOrchestrator`](crate::RetryOrchestrator) owns its own
//! `Arc<Metrics>`; independent pipelines never share counters. Call
//! [`Metrics::flush`] to emit the current values as one `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Lightweight atomic counters, no allocations, no locking.
#[derive(Debug)]
pub struct Metrics {
    validations: AtomicU64,
    rejected_programs: AtomicU64,
    executions: AtomicU64,
    runtime_faults: AtomicU64,
    timeouts: AtomicU64,
    retries: AtomicU64,
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub validations: u64,
    pub rejected_programs: u64,
    pub executions: u64,
    pub runtime_faults: u64,
    pub timeouts: u64,
    pub retries: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            validations: AtomicU64::new(0),
            rejected_programs: AtomicU64::new(0),
            executions: AtomicU64::new(0),
            runtime_faults: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    /// Record one validator pass; `valid == false` also counts a rejection.
    pub fn record_validation(&self, valid: bool) {
        self.validations.fetch_add(1, Ordering::Relaxed);
        if !valid {
            self.rejected_programs.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(metric = "validations", "counter incremented");
    }

    pub fn inc_executions(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "executions", "counter incremented");
    }

    pub fn inc_runtime_faults(&self) {
        self.runtime_faults.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runtime_faults", "counter incremented");
    }

    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "timeouts", "counter incremented");
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "retries", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            validations = s.validations,
            rejected_programs = s.rejected_programs,
            executions = s.executions,
            runtime_faults = s.runtime_faults,
            timeouts = s.timeouts,
            retries = s.retries,
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            validations: self.validations.load(Ordering::Relaxed),
            rejected_programs: self.rejected_programs.load(Ordering::Relaxed),
            executions: self.executions.load(Ordering::Relaxed),
            runtime_faults: self.runtime_faults.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.validations.store(0, Ordering::Relaxed);
        self.rejected_programs.store(0, Ordering::Relaxed);
        self.executions.store(0, Ordering::Relaxed);
        self.runtime_faults.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
        self.retries.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.record_validation(true);
        m.record_validation(false);
        m.inc_executions();
        m.inc_timeouts();
        m.inc_retries();
        m.inc_retries();

        let s = m.snapshot();
        assert_eq!(s.validations, 2);
        assert_eq!(s.rejected_programs, 1);
        assert_eq!(s.executions, 1);
        assert_eq!(s.runtime_faults, 0);
        assert_eq!(s.timeouts, 1);
        assert_eq!(s.retries, 2);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.record_validation(false);
        m.inc_runtime_faults();
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn instances_are_independent() {
        let a = Metrics::new();
        let b = Metrics::new();
        a.inc_executions();
        assert_eq!(b.snapshot().executions, 0);
    }
}
