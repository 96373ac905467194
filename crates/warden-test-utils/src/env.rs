//! A controller wired to in-memory collaborators.

use std::collections::BTreeMap;
use std::sync::Arc;

use warden_audit::report::BuildInfo;
use warden_audit::store::ReportStores;
use warden_audit::store::memory::InMemoryReportStore;
use warden_audit::{AuditConfig, ReconcileOutcome, ResourceController, Result};
use warden_core::{CancelToken, Kind, ObjectKey, Resource};

use crate::cluster::MemoryCluster;
use crate::engine::ScriptedRuleEngine;
use crate::fixtures::OPERATOR_NAMESPACE;

/// Test environment: cluster, rule engine, report stores and controller.
pub struct TestEnv {
    /// Watched objects and policy config.
    pub cluster: Arc<MemoryCluster>,
    /// Rule engine behind the evaluator.
    pub engine: Arc<ScriptedRuleEngine>,
    /// Config-audit report store.
    pub config_audit: Arc<InMemoryReportStore>,
    /// RBAC-assessment report store.
    pub rbac_assessment: Arc<InMemoryReportStore>,
    /// Controller under test.
    pub controller: ResourceController,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    /// Creates an environment with default configuration.
    pub fn new() -> Self {
        Self::with_config(Self::default_config())
    }

    /// Configuration used by [`TestEnv::new`].
    pub fn default_config() -> AuditConfig {
        AuditConfig {
            operator_namespace: OPERATOR_NAMESPACE.to_string(),
            ..AuditConfig::default()
        }
    }

    /// Creates an environment with `config`.
    pub fn with_config(config: AuditConfig) -> Self {
        Self::with_stores(
            config,
            Arc::new(InMemoryReportStore::new()),
            Arc::new(InMemoryReportStore::new()),
        )
    }

    /// Creates an environment with caller-supplied report stores.
    pub fn with_stores(
        config: AuditConfig,
        config_audit: Arc<InMemoryReportStore>,
        rbac_assessment: Arc<InMemoryReportStore>,
    ) -> Self {
        let cluster = Arc::new(MemoryCluster::new());
        cluster.cascade_to(Arc::clone(&config_audit));
        cluster.cascade_to(Arc::clone(&rbac_assessment));
        let engine = Arc::new(ScriptedRuleEngine::default());
        let stores = ReportStores::new(config_audit.clone(), rbac_assessment.clone());
        let controller = ResourceController::new(
            config,
            cluster.clone(),
            cluster.clone(),
            engine.clone(),
            stores,
            BuildInfo::current(),
        );
        Self {
            cluster,
            engine,
            config_audit,
            rbac_assessment,
            controller,
        }
    }

    /// Report stores as the controller sees them.
    pub fn stores(&self) -> ReportStores {
        ReportStores::new(self.config_audit.clone(), self.rbac_assessment.clone())
    }

    /// Replaces the policy bundle.
    pub fn set_policies(&self, data: BTreeMap<String, String>) {
        let config = self.controller.config();
        self.cluster
            .set_config(&config.operator_namespace, &config.policies_config_name, data);
    }

    /// Runs a resource pass for `resource`.
    pub async fn reconcile(&self, resource: &Resource) -> Result<ReconcileOutcome> {
        let key = resource.object_ref().key();
        self.controller
            .reconcile_resource(resource.kind, &key, &CancelToken::never())
            .await
    }

    /// Runs a policy-config pass for `kind` against the configured config object.
    pub async fn reconcile_policies(&self, kind: Kind) -> Result<ReconcileOutcome> {
        let config = self.controller.config();
        let key = ObjectKey::new(
            config.operator_namespace.clone(),
            config.policies_config_name.clone(),
        );
        self.controller
            .reconcile_policy_config(kind, &key, &CancelToken::never())
            .await
    }

    /// Total writes across both stores.
    pub fn write_count(&self) -> usize {
        self.config_audit.write_count().expect("write count")
            + self.rbac_assessment.write_count().expect("write count")
    }

    /// Total deletes across both stores.
    pub fn delete_count(&self) -> usize {
        self.config_audit.delete_count().expect("delete count")
            + self.rbac_assessment.delete_count().expect("delete count")
    }
}
