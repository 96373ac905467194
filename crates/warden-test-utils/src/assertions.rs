//! Custom test assertions.

use std::time::Duration;

use warden_audit::report::{Report, ReportCollection};
use warden_audit::store::memory::InMemoryReportStore;
use warden_audit::{Error, ReconcileOutcome, Result};
use warden_core::labels::{PLUGIN_CONFIG_HASH, RESOURCE_SPEC_HASH};

/// Asserts a pass finished without requeue.
///
/// # Panics
///
/// Panics if the pass failed or asked to be requeued.
pub fn assert_done(result: &Result<ReconcileOutcome>) {
    match result {
        Ok(ReconcileOutcome::Done) => {}
        other => panic!("expected Done, got {other:?}"),
    }
}

/// Asserts a pass asked to be requeued after `delay`.
///
/// # Panics
///
/// Panics on any other outcome.
pub fn assert_requeue_after(result: &Result<ReconcileOutcome>, delay: Duration) {
    match result {
        Ok(ReconcileOutcome::RequeueAfter(d)) if *d == delay => {}
        other => panic!("expected RequeueAfter({delay:?}), got {other:?}"),
    }
}

/// Asserts a pass failed with an error matching `predicate`.
///
/// # Panics
///
/// Panics if the pass succeeded or the error does not match.
pub fn assert_error<F>(result: &Result<ReconcileOutcome>, predicate: F)
where
    F: FnOnce(&Error) -> bool,
{
    match result {
        Err(e) => assert!(predicate(e), "unexpected error: {e:?}"),
        Ok(outcome) => panic!("expected error, got {outcome:?}"),
    }
}

/// Returns the single report in `collection`.
///
/// # Panics
///
/// Panics if the collection does not hold exactly one report.
pub fn single_report(store: &InMemoryReportStore, collection: ReportCollection) -> Report {
    let mut reports: Vec<Report> = store
        .reports()
        .expect("reports")
        .into_iter()
        .filter(|r| r.collection == collection)
        .collect();
    assert_eq!(
        reports.len(),
        1,
        "expected one report in {collection}, found {}",
        reports.len()
    );
    reports.remove(0)
}

/// Asserts the report carries both hash labels with the given values.
///
/// # Panics
///
/// Panics if either label is missing or differs.
pub fn assert_report_hashes(report: &Report, spec_hash: &str, config_hash: &str) {
    assert_eq!(report.label(RESOURCE_SPEC_HASH), Some(spec_hash));
    assert_eq!(report.label(PLUGIN_CONFIG_HASH), Some(config_hash));
}
