//! Failure propagation and cancellation tests.
//!
//! Every failure other than absence surfaces as an error so the caller
//! retries with backoff, and no partial report is left behind.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use warden_audit::Error;
use warden_audit::report::ReportCollection;
use warden_audit::store::memory::{Failure, InMemoryReportStore, Operation};
use warden_core::{CancelHandle, Kind};
use warden_test_utils::{
    TestEnv, assert_done, assert_error, fixtures, init_test_logging, single_report,
};

fn env_with_policies() -> TestEnv {
    init_test_logging();
    let env = TestEnv::new();
    env.set_policies(fixtures::policy_bundle("package privileged"));
    env
}

#[tokio::test]
async fn object_read_failure_is_resolve_error() {
    let env = env_with_policies();
    let pod = env.cluster.apply(fixtures::pod("default", "web", "nginx"));
    env.cluster.fail_gets_of(Kind::Pod);

    let result = env.reconcile(&pod).await;

    assert_error(&result, |e| {
        matches!(e, Error::ResolveObject { object, .. } if object.name == "web")
    });
    assert_eq!(env.write_count(), 0);
}

#[tokio::test]
async fn missing_deployment_is_ownership_error() {
    let env = env_with_policies();
    let rs = env
        .cluster
        .apply(fixtures::replica_set("default", "web-abc", "web", "1"));

    assert_error(&env.reconcile(&rs).await, |e| {
        matches!(e, Error::Ownership { source, .. } if source.is_not_found())
    });
}

#[tokio::test]
async fn deployment_read_failure_is_ownership_error() {
    let env = env_with_policies();
    env.cluster.apply(fixtures::deployment("default", "web", "1"));
    let rs = env
        .cluster
        .apply(fixtures::replica_set("default", "web-abc", "web", "1"));
    env.cluster.fail_gets_of(Kind::Deployment);

    assert_error(&env.reconcile(&rs).await, |e| {
        matches!(e, Error::Ownership { .. })
    });
}

#[tokio::test]
async fn policy_read_failure_is_load_error() {
    let env = env_with_policies();
    let pod = env.cluster.apply(fixtures::pod("default", "web", "nginx"));
    env.cluster.fail_config_reads();

    assert_error(&env.reconcile(&pod).await, |e| {
        matches!(e, Error::PolicyLoad { name, .. } if name == "warden-policies-config")
    });
    assert_eq!(env.engine.calls(), 0);
}

#[tokio::test]
async fn malformed_bundle_is_config_error() {
    let env = env_with_policies();
    let mut bundle = fixtures::policy_bundle("package privileged");
    bundle.remove("policy.privileged.kinds");
    env.set_policies(bundle);
    let pod = env.cluster.apply(fixtures::pod("default", "web", "nginx"));

    assert_error(&env.reconcile(&pod).await, |e| {
        matches!(e, Error::PolicyConfig { .. })
    });
}

#[tokio::test]
async fn lookup_failure_is_persistence_error() -> Result<()> {
    let env = env_with_policies();
    let pod = env.cluster.apply(fixtures::pod("default", "web", "nginx"));
    env.config_audit
        .inject_failure(Operation::FindByOwner, Failure::Storage)?;

    assert_error(&env.reconcile(&pod).await, |e| {
        matches!(e, Error::Persistence { .. })
    });
    assert_eq!(env.engine.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn lookup_not_found_counts_as_missing_report() -> Result<()> {
    let env = env_with_policies();
    let pod = env.cluster.apply(fixtures::pod("default", "web", "nginx"));
    env.config_audit
        .inject_failure(Operation::FindByOwner, Failure::NotFound)?;

    assert_done(&env.reconcile(&pod).await);
    assert_eq!(env.write_count(), 1);
    Ok(())
}

#[tokio::test]
async fn write_failure_is_persistence_error() -> Result<()> {
    let env = env_with_policies();
    let pod = env.cluster.apply(fixtures::pod("default", "web", "nginx"));
    env.config_audit
        .inject_failure(Operation::Write, Failure::Storage)?;

    assert_error(&env.reconcile(&pod).await, |e| {
        matches!(e, Error::Persistence { operation, .. } if *operation == "writing")
    });
    assert_eq!(
        env.config_audit
            .report_count(ReportCollection::ConfigAuditReport)?,
        0
    );

    // The retry succeeds once the store recovers.
    env.config_audit.clear_failures()?;
    assert_done(&env.reconcile(&pod).await);
    single_report(&env.config_audit, ReportCollection::ConfigAuditReport);
    Ok(())
}

#[tokio::test]
async fn engine_failure_is_evaluation_error() {
    let env = env_with_policies();
    let pod = env.cluster.apply(fixtures::pod("default", "web", "nginx"));
    env.engine.fail();

    assert_error(&env.reconcile(&pod).await, |e| {
        matches!(e, Error::Evaluation { .. })
    });
    assert_eq!(env.write_count(), 0);
}

#[tokio::test]
async fn cancelled_before_start_does_nothing() {
    let env = env_with_policies();
    let pod = env.cluster.apply(fixtures::pod("default", "web", "nginx"));
    let (handle, token) = CancelHandle::new();
    handle.cancel();

    let result = env
        .controller
        .reconcile_resource(Kind::Pod, &pod.object_ref().key(), &token)
        .await;

    assert_error(&result, Error::is_cancelled);
    assert_eq!(env.cluster.get_count(), 0);
    assert_eq!(env.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_slow_store() {
    init_test_logging();
    let slow = Arc::new(InMemoryReportStore::with_latency(Duration::from_secs(5)));
    let env = TestEnv::with_stores(
        TestEnv::default_config(),
        slow,
        Arc::new(InMemoryReportStore::new()),
    );
    env.set_policies(fixtures::policy_bundle("package privileged"));
    let pod = env.cluster.apply(fixtures::pod("default", "web", "nginx"));
    let key = pod.object_ref().key();
    let (handle, token) = CancelHandle::new();

    let (result, ()) = tokio::join!(
        env.controller.reconcile_resource(Kind::Pod, &key, &token),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        }
    );

    assert_error(&result, Error::is_cancelled);
    assert_eq!(env.engine.calls(), 0);
    assert_eq!(env.write_count(), 0);
}
