//! Metrics for the reconcile loops.
//!
//! Recorded through the `metrics` facade; installing an exporter is up to
//! the embedding process. Without a recorder every call is a no-op.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `warden_reconciles_total` | Counter | `controller`, `kind`, `outcome` | Reconcile passes by outcome |
//! | `warden_reconcile_duration_seconds` | Histogram | `controller`, `kind` | Reconcile pass latency |
//! | `warden_skips_total` | Counter | `kind`, `reason` | Objects skipped before evaluation |
//! | `warden_evaluations_total` | Counter | `kind`, `domain` | Rule engine invocations |
//! | `warden_report_writes_total` | Counter | `collection` | Reports written |
//! | `warden_report_deletions_total` | Counter | `collection` | Stale reports deleted |

use std::time::{Duration, Instant};

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: reconcile passes by outcome.
    pub const RECONCILES_TOTAL: &str = "warden_reconciles_total";
    /// Histogram: reconcile pass latency in seconds.
    pub const RECONCILE_DURATION_SECONDS: &str = "warden_reconcile_duration_seconds";
    /// Counter: objects skipped before evaluation.
    pub const SKIPS_TOTAL: &str = "warden_skips_total";
    /// Counter: rule engine invocations.
    pub const EVALUATIONS_TOTAL: &str = "warden_evaluations_total";
    /// Counter: reports written.
    pub const REPORT_WRITES_TOTAL: &str = "warden_report_writes_total";
    /// Counter: stale reports deleted.
    pub const REPORT_DELETIONS_TOTAL: &str = "warden_report_deletions_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Controller name (resource, policy_config).
    pub const CONTROLLER: &str = "controller";
    /// Watched kind.
    pub const KIND: &str = "kind";
    /// Reconcile outcome (done, requeue, error).
    pub const OUTCOME: &str = "outcome";
    /// Skip reason.
    pub const REASON: &str = "reason";
    /// Report domain.
    pub const DOMAIN: &str = "domain";
    /// Report collection.
    pub const COLLECTION: &str = "collection";
}

/// Records reconcile metrics.
#[derive(Debug, Clone, Default)]
pub struct AuditMetrics;

impl AuditMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records the outcome of a reconcile pass.
    pub fn record_reconcile(&self, controller: &'static str, kind: &str, outcome: &'static str) {
        counter!(
            names::RECONCILES_TOTAL,
            labels::CONTROLLER => controller,
            labels::KIND => kind.to_string(),
            labels::OUTCOME => outcome,
        )
        .increment(1);
    }

    /// Records reconcile latency.
    pub fn observe_reconcile_duration(
        &self,
        controller: &'static str,
        kind: &str,
        duration: Duration,
    ) {
        histogram!(
            names::RECONCILE_DURATION_SECONDS,
            labels::CONTROLLER => controller,
            labels::KIND => kind.to_string(),
        )
        .record(duration.as_secs_f64());
    }

    /// Records an object skipped before evaluation.
    pub fn record_skip(&self, kind: &str, reason: &'static str) {
        counter!(
            names::SKIPS_TOTAL,
            labels::KIND => kind.to_string(),
            labels::REASON => reason,
        )
        .increment(1);
    }

    /// Records a rule engine invocation.
    pub fn record_evaluation(&self, kind: &str, domain: &'static str) {
        counter!(
            names::EVALUATIONS_TOTAL,
            labels::KIND => kind.to_string(),
            labels::DOMAIN => domain,
        )
        .increment(1);
    }

    /// Records a report write.
    pub fn record_report_write(&self, collection: &'static str) {
        counter!(names::REPORT_WRITES_TOTAL, labels::COLLECTION => collection).increment(1);
    }

    /// Records stale report deletions.
    pub fn record_report_deletions(&self, collection: &'static str, count: usize) {
        counter!(names::REPORT_DELETIONS_TOTAL, labels::COLLECTION => collection)
            .increment(count as u64);
    }
}

/// Guard that reports elapsed time when dropped.
pub struct TimingGuard<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> TimingGuard<F>
where
    F: FnOnce(Duration),
{
    /// Creates a guard calling `on_drop` with the elapsed duration.
    pub fn new(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }
}

impl<F> Drop for TimingGuard<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        let metrics = AuditMetrics::new();
        metrics.record_reconcile("resource", "Pod", "done");
        metrics.observe_reconcile_duration("resource", "Pod", Duration::from_millis(3));
        metrics.record_skip("Pod", "managed_by_workload");
        metrics.record_evaluation("Pod", "config_audit");
        metrics.record_report_write("ConfigAuditReport");
        metrics.record_report_deletions("ConfigAuditReport", 10);
    }

    #[test]
    fn timing_guard_reports_on_drop() {
        let mut recorded = None;
        {
            let _guard = TimingGuard::new(|d| recorded = Some(d));
        }
        assert!(recorded.is_some());
    }
}
