//! Reconcile entry points and event routing.
//!
//! [`ResourceController`] carries every collaborator the reconcile logic
//! needs, named by capability, and is shared by reference across workers.
//! It holds no locks: distinct keys reconcile concurrently, and repeated
//! passes on one key are idempotent because the report store is the only
//! state.
//!
//! ## Resource pass
//!
//! 1. Fetch the object; gone means done
//! 2. Skip objects covered by a related owner
//! 3. Load policies; requeue after `scan_retry_after` if none applies
//! 4. Compute both hashes; done if a fresh report exists
//! 5. Evaluate, build and write the report
//!
//! ## Policy-config pass
//!
//! Recomputes the kind's policy hash and deletes stale reports in bounded
//! batches, requeueing after `batch_delete_delay` while work remains.

use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, debug, warn};

use warden_core::hash::compute_spec_hash;
use warden_core::{CancelToken, Kind, ObjectKey, ObjectRef, Resource, reconcile_span};

use crate::collector::StaleReportCollector;
use crate::config::AuditConfig;
use crate::error::{Error, Result};
use crate::evaluator::{Evaluator, RuleEngine};
use crate::freshness::FreshnessChecker;
use crate::metrics::{AuditMetrics, TimingGuard};
use crate::ownership::OwnershipResolver;
use crate::persister::{ReportBuilder, ReportPersister};
use crate::policy::{Policies, PolicyLoader};
use crate::predicate::{self, Predicate};
use crate::registry::REGISTRY;
use crate::report::{BuildInfo, ReportDomain, ReportScope};
use crate::store::{ObjectResolver, PolicyConfigSource, ReportStores};

/// Controller name used in spans and metrics for resource passes.
pub const RESOURCE_CONTROLLER: &str = "resource";
/// Controller name used in spans and metrics for policy-config passes.
pub const POLICY_CONFIG_CONTROLLER: &str = "policy_config";

/// Successful outcome of a reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing left to do.
    Done,
    /// Invoke again for the same key after the delay.
    RequeueAfter(Duration),
}

impl ReconcileOutcome {
    /// Returns the requeue delay, if any.
    #[must_use]
    pub const fn requeue_after(&self) -> Option<Duration> {
        match self {
            Self::Done => None,
            Self::RequeueAfter(d) => Some(*d),
        }
    }

    const fn as_label(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::RequeueAfter(_) => "requeue",
        }
    }
}

/// Handler a route invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    /// [`ResourceController::reconcile_resource`] for the kind.
    Resource(Kind),
    /// [`ResourceController::reconcile_policy_config`] for the kind.
    PolicyConfig(Kind),
}

/// An installed watch: events for `watches` passing `predicate` run `target`.
#[derive(Debug, Clone)]
pub struct Route {
    /// Kind of the watched objects.
    pub watches: Kind,
    /// Admission predicate.
    pub predicate: Predicate,
    /// Handler.
    pub target: RouteTarget,
}

/// Result of one handler run by [`ResourceController::dispatch`].
#[derive(Debug)]
pub struct Dispatched {
    /// Handler that ran.
    pub target: RouteTarget,
    /// Its outcome.
    pub outcome: Result<ReconcileOutcome>,
}

/// Reconciles compliance reports for watched objects.
pub struct ResourceController {
    config: AuditConfig,
    objects: Arc<dyn ObjectResolver>,
    policy_source: Arc<dyn PolicyConfigSource>,
    rule_engine: Arc<dyn RuleEngine>,
    reports: ReportStores,
    build_info: BuildInfo,
    metrics: AuditMetrics,
}

impl ResourceController {
    /// Creates a controller.
    #[must_use]
    pub fn new(
        config: AuditConfig,
        objects: Arc<dyn ObjectResolver>,
        policy_source: Arc<dyn PolicyConfigSource>,
        rule_engine: Arc<dyn RuleEngine>,
        reports: ReportStores,
        build_info: BuildInfo,
    ) -> Self {
        Self {
            config,
            objects,
            policy_source,
            rule_engine,
            reports,
            build_info,
            metrics: AuditMetrics::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Builds one resource route and one policy-config route per registry row.
    ///
    /// Namespaced rows reject managed, leader-election, terminating and
    /// out-of-scope objects. Cluster rows reject only managed and
    /// terminating objects.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the install mode cannot be resolved.
    pub fn routes(&self) -> Result<Vec<Route>> {
        let install_mode = predicate::install_mode(&self.config)?;
        let policy_config = Predicate::all(vec![
            predicate::being_terminated().not(),
            predicate::has_name(self.config.policies_config_name.clone()),
            predicate::in_namespace(self.config.operator_namespace.clone()),
        ]);

        let mut routes = Vec::with_capacity(REGISTRY.len() * 2);
        for row in &REGISTRY {
            let admission = match row.scope {
                ReportScope::Namespaced => Predicate::all(vec![
                    predicate::managed_by_warden().not(),
                    predicate::leader_election_resource().not(),
                    predicate::being_terminated().not(),
                    install_mode.clone(),
                ]),
                ReportScope::Cluster => Predicate::all(vec![
                    predicate::managed_by_warden().not(),
                    predicate::being_terminated().not(),
                ]),
            };
            routes.push(Route {
                watches: row.kind,
                predicate: admission,
                target: RouteTarget::Resource(row.kind),
            });
            routes.push(Route {
                watches: Kind::ConfigMap,
                predicate: policy_config.clone(),
                target: RouteTarget::PolicyConfig(row.kind),
            });
        }
        Ok(routes)
    }

    /// Runs every route admitting `event`, in route order.
    pub async fn dispatch(
        &self,
        routes: &[Route],
        event: &Resource,
        cancel: &CancelToken,
    ) -> Vec<Dispatched> {
        let key = event.object_ref().key();
        let mut out = Vec::new();
        for route in routes.iter().filter(|r| r.watches == event.kind) {
            if !route.predicate.evaluate(event) {
                debug!(
                    kind = %event.kind,
                    %key,
                    predicate = route.predicate.name(),
                    "event filtered"
                );
                continue;
            }
            let outcome = match route.target {
                RouteTarget::Resource(kind) => self.reconcile_resource(kind, &key, cancel).await,
                RouteTarget::PolicyConfig(kind) => {
                    self.reconcile_policy_config(kind, &key, cancel).await
                }
            };
            out.push(Dispatched {
                target: route.target,
                outcome,
            });
        }
        out
    }

    /// Brings the report for one watched object up to date.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than absence; the caller
    /// retries with backoff.
    pub async fn reconcile_resource(
        &self,
        kind: Kind,
        key: &ObjectKey,
        cancel: &CancelToken,
    ) -> Result<ReconcileOutcome> {
        let span = reconcile_span(RESOURCE_CONTROLLER, kind.as_str(), &key.to_string());
        self.observe(RESOURCE_CONTROLLER, kind, self.resource_pass(kind, key, cancel))
            .instrument(span)
            .await
    }

    /// Deletes reports of `kind` made stale by a policy bundle change.
    ///
    /// `key` identifies the changed config object.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than absence; the caller
    /// retries with backoff.
    pub async fn reconcile_policy_config(
        &self,
        kind: Kind,
        key: &ObjectKey,
        cancel: &CancelToken,
    ) -> Result<ReconcileOutcome> {
        let span = reconcile_span(POLICY_CONFIG_CONTROLLER, kind.as_str(), &key.to_string());
        self.observe(
            POLICY_CONFIG_CONTROLLER,
            kind,
            self.policy_config_pass(kind, key, cancel),
        )
        .instrument(span)
        .await
    }

    async fn observe<F>(
        &self,
        controller: &'static str,
        kind: Kind,
        pass: F,
    ) -> Result<ReconcileOutcome>
    where
        F: std::future::Future<Output = Result<ReconcileOutcome>>,
    {
        let _timing = TimingGuard::new(|elapsed| {
            self.metrics
                .observe_reconcile_duration(controller, kind.as_str(), elapsed);
        });
        let result = pass.await;
        match &result {
            Ok(outcome) => {
                self.metrics
                    .record_reconcile(controller, kind.as_str(), outcome.as_label());
            }
            Err(e) => {
                self.metrics.record_reconcile(controller, kind.as_str(), "error");
                warn!(error = %e, "reconcile failed");
            }
        }
        result
    }

    async fn resource_pass(
        &self,
        kind: Kind,
        key: &ObjectKey,
        cancel: &CancelToken,
    ) -> Result<ReconcileOutcome> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let object = ObjectRef::from_key(kind, key);

        let fetched = cancel.run(self.objects.get(&object)).await;
        let resource = match fetched {
            Ok(r) => r,
            Err(e) if e.is_not_found() => {
                debug!("ignoring cached resource that must have been deleted");
                return Ok(ReconcileOutcome::Done);
            }
            Err(e) if e.is_cancelled() => return Err(Error::Cancelled),
            Err(source) => return Err(Error::ResolveObject { object, source }),
        };

        let ownership =
            OwnershipResolver::new(self.objects.as_ref(), self.config.scan_only_current_revisions);
        if let Some(reason) = ownership.skip_reason(&resource, cancel).await? {
            debug!(%reason, "skipping object");
            self.metrics.record_skip(kind.as_str(), reason.as_str());
            return Ok(ReconcileOutcome::Done);
        }

        let policies = self.load_policies(cancel).await?;
        let (applicable, reason) =
            policies.applicable(&resource, self.config.rbac_assessment_enabled)?;
        if !applicable {
            debug!(
                %reason,
                retry_after = ?self.config.scan_retry_after,
                "pushing back reconcile key"
            );
            return Ok(ReconcileOutcome::RequeueAfter(self.config.scan_retry_after));
        }

        let spec_hash = compute_spec_hash(&resource)
            .map_err(|e| Error::computation("resource spec hash", e))?;
        let config_hash = policies.hash(kind)?;

        let fresh = FreshnessChecker::new(&self.reports)
            .has_fresh_report(&object, &spec_hash, &config_hash, cancel)
            .await?;
        if fresh {
            debug!("report is fresh");
            return Ok(ReconcileOutcome::Done);
        }

        let evaluator = Evaluator::new(self.rule_engine.as_ref(), &self.build_info);
        let data = match evaluator.evaluate(&policies, &resource, cancel).await {
            Ok(data) => data,
            Err(Error::NoPoliciesApplicable { kind }) => {
                debug!(%kind, "no policies applicable");
                return Ok(ReconcileOutcome::Done);
            }
            Err(e) => return Err(e),
        };
        self.metrics
            .record_evaluation(kind.as_str(), domain_label(data.domain()));

        let report = ReportBuilder::new(&resource)
            .resource_spec_hash(spec_hash)
            .plugin_config_hash(config_hash)
            .data(data)
            .build()?;
        ReportPersister::new(&self.reports)
            .write(&report, cancel)
            .await?;
        self.metrics.record_report_write(report.collection.as_str());
        Ok(ReconcileOutcome::Done)
    }

    async fn policy_config_pass(
        &self,
        kind: Kind,
        key: &ObjectKey,
        cancel: &CancelToken,
    ) -> Result<ReconcileOutcome> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let namespace = key
            .namespace
            .as_deref()
            .unwrap_or(&self.config.operator_namespace);
        match cancel
            .run(self.policy_source.get_config(namespace, &key.name))
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                debug!("ignoring cached policy config that must have been deleted");
                return Ok(ReconcileOutcome::Done);
            }
            Err(e) if e.is_cancelled() => return Err(Error::Cancelled),
            Err(source) => {
                return Err(Error::PolicyLoad {
                    namespace: namespace.to_string(),
                    name: key.name.clone(),
                    source,
                });
            }
        }

        let policies = self.load_policies(cancel).await?;
        let config_hash = policies.hash(kind)?;

        let collector = StaleReportCollector::new(
            &self.reports,
            self.config.batch_delete_limit,
            self.config.rbac_assessment_enabled,
        );
        let outcome = collector.collect(kind, &config_hash, cancel).await?;
        for sweep in &outcome.sweeps {
            if sweep.deleted > 0 {
                self.metrics
                    .record_report_deletions(sweep.collection.as_str(), sweep.deleted);
            }
        }

        if outcome.pending() {
            Ok(ReconcileOutcome::RequeueAfter(self.config.batch_delete_delay))
        } else {
            Ok(ReconcileOutcome::Done)
        }
    }

    async fn load_policies(&self, cancel: &CancelToken) -> Result<Policies> {
        PolicyLoader::new(
            self.policy_source.as_ref(),
            &self.config.operator_namespace,
            &self.config.policies_config_name,
            self.config.use_builtin_policies,
        )
        .load(cancel)
        .await
    }
}

const fn domain_label(domain: ReportDomain) -> &'static str {
    match domain {
        ReportDomain::ConfigAudit => "config_audit",
        ReportDomain::RbacAssessment => "rbac_assessment",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_accessors() {
        assert_eq!(ReconcileOutcome::Done.requeue_after(), None);
        let d = Duration::from_secs(10);
        assert_eq!(ReconcileOutcome::RequeueAfter(d).requeue_after(), Some(d));
        assert_eq!(ReconcileOutcome::Done.as_label(), "done");
        assert_eq!(ReconcileOutcome::RequeueAfter(d).as_label(), "requeue");
    }

    #[test]
    fn domain_labels() {
        assert_eq!(domain_label(ReportDomain::ConfigAudit), "config_audit");
        assert_eq!(domain_label(ReportDomain::RbacAssessment), "rbac_assessment");
    }
}
