//! Report model.
//!
//! Reports live in four collections, chosen along two independent axes:
//!
//! | | generic | RBAC |
//! |---|---|---|
//! | namespaced | `ConfigAuditReport` | `RbacAssessmentReport` |
//! | cluster | `ClusterConfigAuditReport` | `ClusterRbacAssessmentReport` |
//!
//! The domain axis is decided once from the owner kind and carried as the
//! [`ReportData`] variant; the scope axis follows the owner's scope.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{Kind, ObjectKey, ObjectMeta};

/// Category attached to every check produced by the evaluator.
pub const CHECK_CATEGORY: &str = "Kubernetes Security Check";

/// Evaluation domain of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportDomain {
    /// General configuration checks.
    ConfigAudit,
    /// Access-control assessment of roles and bindings.
    RbacAssessment,
}

impl ReportDomain {
    /// Classifies a kind.
    #[must_use]
    pub const fn for_kind(kind: Kind) -> Self {
        if kind.is_rbac() {
            Self::RbacAssessment
        } else {
            Self::ConfigAudit
        }
    }
}

/// Scope of a report collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportScope {
    /// Reports live in the owner's namespace.
    Namespaced,
    /// Reports are cluster-scoped.
    Cluster,
}

impl ReportScope {
    /// Returns the scope of reports owned by objects of `kind`.
    #[must_use]
    pub const fn for_kind(kind: Kind) -> Self {
        if kind.is_cluster_scoped() {
            Self::Cluster
        } else {
            Self::Namespaced
        }
    }
}

/// One of the four report collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReportCollection {
    /// Namespaced generic reports.
    ConfigAuditReport,
    /// Cluster-scoped generic reports.
    ClusterConfigAuditReport,
    /// Namespaced RBAC reports.
    RbacAssessmentReport,
    /// Cluster-scoped RBAC reports.
    ClusterRbacAssessmentReport,
}

impl ReportCollection {
    /// All collections.
    pub const ALL: [Self; 4] = [
        Self::ConfigAuditReport,
        Self::ClusterConfigAuditReport,
        Self::RbacAssessmentReport,
        Self::ClusterRbacAssessmentReport,
    ];

    /// Selects the collection from both axes.
    #[must_use]
    pub const fn new(domain: ReportDomain, scope: ReportScope) -> Self {
        match (domain, scope) {
            (ReportDomain::ConfigAudit, ReportScope::Namespaced) => Self::ConfigAuditReport,
            (ReportDomain::ConfigAudit, ReportScope::Cluster) => Self::ClusterConfigAuditReport,
            (ReportDomain::RbacAssessment, ReportScope::Namespaced) => Self::RbacAssessmentReport,
            (ReportDomain::RbacAssessment, ReportScope::Cluster) => {
                Self::ClusterRbacAssessmentReport
            }
        }
    }

    /// Returns the collection holding reports owned by objects of `kind`.
    #[must_use]
    pub const fn for_kind(kind: Kind) -> Self {
        Self::new(ReportDomain::for_kind(kind), ReportScope::for_kind(kind))
    }

    /// Domain axis.
    #[must_use]
    pub const fn domain(self) -> ReportDomain {
        match self {
            Self::ConfigAuditReport | Self::ClusterConfigAuditReport => ReportDomain::ConfigAudit,
            Self::RbacAssessmentReport | Self::ClusterRbacAssessmentReport => {
                ReportDomain::RbacAssessment
            }
        }
    }

    /// Scope axis.
    #[must_use]
    pub const fn scope(self) -> ReportScope {
        match self {
            Self::ConfigAuditReport | Self::RbacAssessmentReport => ReportScope::Namespaced,
            Self::ClusterConfigAuditReport | Self::ClusterRbacAssessmentReport => {
                ReportScope::Cluster
            }
        }
    }

    /// Collection name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfigAuditReport => "ConfigAuditReport",
            Self::ClusterConfigAuditReport => "ClusterConfigAuditReport",
            Self::RbacAssessmentReport => "RbacAssessmentReport",
            Self::ClusterRbacAssessmentReport => "ClusterRbacAssessmentReport",
        }
    }
}

impl fmt::Display for ReportCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Critical.
    Critical,
    /// High.
    High,
    /// Medium.
    Medium,
    /// Low.
    Low,
    /// Unknown or unset.
    Unknown,
}

/// Result of one evaluated rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    /// Rule identifier.
    #[serde(rename = "checkID")]
    pub id: String,
    /// Short rule summary.
    pub title: String,
    /// Rule explanation.
    pub description: String,
    /// Rule severity.
    pub severity: Severity,
    /// Check category.
    pub category: String,
    /// True if the object passed the rule.
    pub success: bool,
    /// Messages produced by the rule.
    #[serde(default)]
    pub messages: Vec<String>,
}

/// Failed checks counted per severity. Passed checks are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Failed critical checks.
    pub critical_count: u32,
    /// Failed high checks.
    pub high_count: u32,
    /// Failed medium checks.
    pub medium_count: u32,
    /// Failed low checks.
    pub low_count: u32,
}

impl Summary {
    /// Buckets failed checks by severity.
    #[must_use]
    pub fn from_checks(checks: &[Check]) -> Self {
        checks
            .iter()
            .filter(|c| !c.success)
            .fold(Self::default(), |mut summary, check| {
                match check.severity {
                    Severity::Critical => summary.critical_count += 1,
                    Severity::High => summary.high_count += 1,
                    Severity::Medium => summary.medium_count += 1,
                    Severity::Low => summary.low_count += 1,
                    Severity::Unknown => {}
                }
                summary
            })
    }
}

/// Identity of the scanner that produced a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scanner {
    /// Scanner name.
    pub name: String,
    /// Scanner vendor.
    pub vendor: String,
    /// Scanner version.
    pub version: String,
}

/// Scanner name written on every report.
pub const SCANNER_NAME: &str = "Warden";
/// Scanner vendor written on every report.
pub const SCANNER_VENDOR: &str = "Warden";

/// Version metadata of the running build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Release version.
    pub version: String,
    /// Source revision.
    pub commit: String,
    /// Build date.
    pub date: String,
}

impl BuildInfo {
    /// Build info of this crate, from compile-time metadata.
    #[must_use]
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: option_env!("WARDEN_BUILD_COMMIT").unwrap_or("none").to_string(),
            date: option_env!("WARDEN_BUILD_DATE").unwrap_or("unknown").to_string(),
        }
    }

    /// Scanner identity for reports produced by this build.
    #[must_use]
    pub fn scanner(&self) -> Scanner {
        Scanner {
            name: SCANNER_NAME.to_string(),
            vendor: SCANNER_VENDOR.to_string(),
            version: self.version.clone(),
        }
    }
}

/// Payload of a generic configuration audit report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigAuditReportData {
    /// When the evaluation ran.
    pub update_timestamp: DateTime<Utc>,
    /// Scanner identity.
    pub scanner: Scanner,
    /// Failed checks per severity.
    pub summary: Summary,
    /// Check results in rule order.
    pub checks: Vec<Check>,
}

/// Payload of an RBAC assessment report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RbacAssessmentReportData {
    /// When the evaluation ran.
    pub update_timestamp: DateTime<Utc>,
    /// Scanner identity.
    pub scanner: Scanner,
    /// Failed checks per severity.
    pub summary: Summary,
    /// Check results in rule order.
    pub checks: Vec<Check>,
}

/// Report payload, tagged by domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum ReportData {
    /// Generic configuration audit.
    ConfigAudit(ConfigAuditReportData),
    /// RBAC assessment.
    RbacAssessment(RbacAssessmentReportData),
}

impl ReportData {
    /// Domain of this payload.
    #[must_use]
    pub const fn domain(&self) -> ReportDomain {
        match self {
            Self::ConfigAudit(_) => ReportDomain::ConfigAudit,
            Self::RbacAssessment(_) => ReportDomain::RbacAssessment,
        }
    }

    /// Check results.
    #[must_use]
    pub fn checks(&self) -> &[Check] {
        match self {
            Self::ConfigAudit(d) => &d.checks,
            Self::RbacAssessment(d) => &d.checks,
        }
    }

    /// Severity summary.
    #[must_use]
    pub const fn summary(&self) -> &Summary {
        match self {
            Self::ConfigAudit(d) => &d.summary,
            Self::RbacAssessment(d) => &d.summary,
        }
    }
}

/// A stored compliance report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Collection the report belongs to.
    pub collection: ReportCollection,
    /// Report metadata: name, namespace, hash labels, owner reference.
    pub metadata: ObjectMeta,
    /// Report payload.
    pub data: ReportData,
}

impl Report {
    /// Returns the key identifying this report within its collection.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            namespace: self.metadata.namespace.clone(),
            name: self.metadata.name.clone(),
        }
    }

    /// Returns the label value for `key`, if present.
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.get(key).map(String::as_str)
    }
}
