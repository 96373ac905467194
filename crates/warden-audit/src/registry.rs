//! Watched kinds and the report collections they own.
//!
//! Consumed once by [`crate::controller::ResourceController::routes`] to
//! install one resource route and one policy-config route per row.

use warden_core::Kind;

use crate::report::{ReportCollection, ReportDomain, ReportScope};

/// One watched kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationRow {
    /// Watched kind.
    pub kind: Kind,
    /// Scope of the kind and of the reports it owns.
    pub scope: ReportScope,
    /// Collection holding reports owned by objects of this kind.
    pub owns: ReportCollection,
}

impl RegistrationRow {
    const fn new(kind: Kind) -> Self {
        let scope = ReportScope::for_kind(kind);
        Self {
            kind,
            scope,
            owns: ReportCollection::new(ReportDomain::for_kind(kind), scope),
        }
    }
}

/// Every watched kind, namespaced rows first.
pub const REGISTRY: [RegistrationRow; 19] = [
    RegistrationRow::new(Kind::Pod),
    RegistrationRow::new(Kind::ReplicaSet),
    RegistrationRow::new(Kind::ReplicationController),
    RegistrationRow::new(Kind::StatefulSet),
    RegistrationRow::new(Kind::DaemonSet),
    RegistrationRow::new(Kind::CronJob),
    RegistrationRow::new(Kind::Job),
    RegistrationRow::new(Kind::Service),
    RegistrationRow::new(Kind::ConfigMap),
    RegistrationRow::new(Kind::Role),
    RegistrationRow::new(Kind::RoleBinding),
    RegistrationRow::new(Kind::NetworkPolicy),
    RegistrationRow::new(Kind::Ingress),
    RegistrationRow::new(Kind::ResourceQuota),
    RegistrationRow::new(Kind::LimitRange),
    RegistrationRow::new(Kind::ClusterRole),
    RegistrationRow::new(Kind::ClusterRoleBinding),
    RegistrationRow::new(Kind::CustomResourceDefinition),
    RegistrationRow::new(Kind::PodSecurityPolicy),
];

/// Returns the row for `kind`, if it is watched.
#[must_use]
pub fn row_for(kind: Kind) -> Option<&'static RegistrationRow> {
    REGISTRY.iter().find(|row| row.kind == kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_is_not_watched() {
        assert!(row_for(Kind::Deployment).is_none());
        assert_eq!(REGISTRY.len(), Kind::ALL.len() - 1);
    }

    #[test]
    fn rbac_rows_own_rbac_collections() {
        for row in REGISTRY {
            let expected_rbac = matches!(
                row.kind,
                Kind::Role | Kind::RoleBinding | Kind::ClusterRole | Kind::ClusterRoleBinding
            );
            assert_eq!(
                row.owns.domain() == ReportDomain::RbacAssessment,
                expected_rbac,
                "{}",
                row.kind
            );
        }
    }

    #[test]
    fn cluster_rows() {
        let cluster: Vec<Kind> = REGISTRY
            .iter()
            .filter(|r| r.scope == ReportScope::Cluster)
            .map(|r| r.kind)
            .collect();
        assert_eq!(
            cluster,
            vec![
                Kind::ClusterRole,
                Kind::ClusterRoleBinding,
                Kind::CustomResourceDefinition,
                Kind::PodSecurityPolicy
            ]
        );
        assert_eq!(
            row_for(Kind::CustomResourceDefinition).map(|r| r.owns),
            Some(ReportCollection::ClusterConfigAuditReport)
        );
    }
}
