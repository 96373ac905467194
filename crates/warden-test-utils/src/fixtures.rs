//! Pre-built watched objects and policy bundles.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{Value, json};

use warden_audit::config::DEFAULT_POLICIES_CONFIG_NAME;
use warden_audit::persister::ReportBuilder;
use warden_audit::report::{
    BuildInfo, ConfigAuditReportData, RbacAssessmentReportData, Report, ReportData, ReportDomain,
    Summary,
};
use warden_core::labels::DEPLOYMENT_REVISION_ANNOTATION;
use warden_core::{Kind, ObjectRef, OwnerReference, Resource};

/// Operator namespace used by [`crate::TestEnv`].
pub const OPERATOR_NAMESPACE: &str = "warden-system";

/// A bare pod running `image`.
pub fn pod(namespace: &str, name: &str, image: &str) -> Resource {
    Resource::new(
        &ObjectRef::namespaced(Kind::Pod, namespace, name),
        json!({"spec": {"containers": [{"name": "main", "image": image}]}}),
    )
}

/// Marks `resource` as controlled by the given owner.
pub fn controlled_by(mut resource: Resource, owner_kind: Kind, owner_name: &str) -> Resource {
    resource.metadata.owner_references.push(OwnerReference {
        api_version: owner_kind.api_version().to_string(),
        kind: owner_kind.as_str().to_string(),
        name: owner_name.to_string(),
        uid: format!("uid-{owner_name}"),
        controller: true,
        block_owner_deletion: true,
    });
    resource
}

/// A deployment at `revision`.
pub fn deployment(namespace: &str, name: &str, revision: &str) -> Resource {
    with_revision(
        Resource::new(
            &ObjectRef::namespaced(Kind::Deployment, namespace, name),
            json!({"spec": {"replicas": 2}}),
        ),
        revision,
    )
}

/// A replica set at `revision`, controlled by `deployment`.
pub fn replica_set(namespace: &str, name: &str, deployment: &str, revision: &str) -> Resource {
    controlled_by(
        with_revision(
            Resource::new(
                &ObjectRef::namespaced(Kind::ReplicaSet, namespace, name),
                json!({"spec": {"replicas": 2, "template": {"spec": {"containers": [{"image": "nginx"}]}}}}),
            ),
            revision,
        ),
        Kind::Deployment,
        deployment,
    )
}

/// A job spawned by `cron_job`.
pub fn cron_job_job(namespace: &str, name: &str, cron_job: &str) -> Resource {
    controlled_by(
        Resource::new(
            &ObjectRef::namespaced(Kind::Job, namespace, name),
            json!({"spec": {"template": {"spec": {"containers": [{"image": "backup"}]}}}}),
        ),
        Kind::CronJob,
        cron_job,
    )
}

/// A namespaced role granting `verbs` on pods.
pub fn role(namespace: &str, name: &str, verbs: &[&str]) -> Resource {
    Resource::new(
        &ObjectRef::namespaced(Kind::Role, namespace, name),
        json!({"rules": [{"apiGroups": [""], "resources": ["pods"], "verbs": verbs}]}),
    )
}

/// A cluster role granting `verbs` on everything.
pub fn cluster_role(name: &str, verbs: &[&str]) -> Resource {
    Resource::new(
        &ObjectRef::cluster(Kind::ClusterRole, name),
        json!({"rules": [{"apiGroups": ["*"], "resources": ["*"], "verbs": verbs}]}),
    )
}

/// A cluster-scoped custom resource definition.
pub fn crd(name: &str) -> Resource {
    Resource::new(
        &ObjectRef::cluster(Kind::CustomResourceDefinition, name),
        json!({"spec": {"group": "example.com", "scope": "Namespaced"}}),
    )
}

/// A service.
pub fn service(namespace: &str, name: &str, service_type: &str) -> Resource {
    Resource::new(
        &ObjectRef::namespaced(Kind::Service, namespace, name),
        json!({"spec": {"type": service_type}}),
    )
}

/// The policy config object as a watched `ConfigMap`, for dispatch tests.
pub fn policy_config_object() -> Resource {
    Resource::new(
        &ObjectRef::namespaced(Kind::ConfigMap, OPERATOR_NAMESPACE, DEFAULT_POLICIES_CONFIG_NAME),
        Value::Null,
    )
}

/// A bundle with one workload policy, one RBAC policy and a shared library.
pub fn policy_bundle(workload_body: &str) -> BTreeMap<String, String> {
    [
        ("library.kubernetes.rego", "package lib.kubernetes"),
        ("policy.privileged.rego", workload_body),
        ("policy.privileged.kinds", "Workload"),
        ("policy.wildcard_rbac.rego", "package rbac.wildcard"),
        ("policy.wildcard_rbac.kinds", "Role,ClusterRole"),
        ("policy.crd.rego", "package crd"),
        ("policy.crd.kinds", "CustomResourceDefinition"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn with_revision(mut resource: Resource, revision: &str) -> Resource {
    resource
        .metadata
        .annotations
        .insert(DEPLOYMENT_REVISION_ANNOTATION.to_string(), revision.to_string());
    resource
}

/// A report owned by `resource`, carrying the given hashes and no checks.
///
/// The domain follows the resource kind.
pub fn report_for(resource: &Resource, spec_hash: &str, config_hash: &str) -> Report {
    let scanner = BuildInfo::current().scanner();
    let update_timestamp = Utc::now();
    let summary = Summary::from_checks(&[]);
    let data = match ReportDomain::for_kind(resource.kind) {
        ReportDomain::ConfigAudit => ReportData::ConfigAudit(ConfigAuditReportData {
            update_timestamp,
            scanner,
            summary,
            checks: Vec::new(),
        }),
        ReportDomain::RbacAssessment => ReportData::RbacAssessment(RbacAssessmentReportData {
            update_timestamp,
            scanner,
            summary,
            checks: Vec::new(),
        }),
    };
    ReportBuilder::new(resource)
        .resource_spec_hash(spec_hash)
        .plugin_config_hash(config_hash)
        .data(data)
        .build()
        .expect("report fixture")
}
