//! Object model for watched cluster objects.
//!
//! The engine never talks to a concrete cluster client. It sees objects as a
//! [`Resource`]: a typed [`Kind`], the metadata the reconcile logic inspects
//! ([`ObjectMeta`]) and an opaque JSON body from which content hashes are
//! computed.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Kinds known to the engine.
///
/// Every kind with a registration row is listed here, plus `Deployment`, which
/// is only ever looked up as the owner of a `ReplicaSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    /// `v1/Pod`.
    Pod,
    /// `apps/v1/Deployment`.
    Deployment,
    /// `apps/v1/ReplicaSet`.
    ReplicaSet,
    /// `v1/ReplicationController`.
    ReplicationController,
    /// `apps/v1/StatefulSet`.
    StatefulSet,
    /// `apps/v1/DaemonSet`.
    DaemonSet,
    /// `batch/v1/CronJob`.
    CronJob,
    /// `batch/v1/Job`.
    Job,
    /// `v1/Service`.
    Service,
    /// `v1/ConfigMap`.
    ConfigMap,
    /// `rbac.authorization.k8s.io/v1/Role`.
    Role,
    /// `rbac.authorization.k8s.io/v1/RoleBinding`.
    RoleBinding,
    /// `networking.k8s.io/v1/NetworkPolicy`.
    NetworkPolicy,
    /// `networking.k8s.io/v1/Ingress`.
    Ingress,
    /// `v1/ResourceQuota`.
    ResourceQuota,
    /// `v1/LimitRange`.
    LimitRange,
    /// `rbac.authorization.k8s.io/v1/ClusterRole`.
    ClusterRole,
    /// `rbac.authorization.k8s.io/v1/ClusterRoleBinding`.
    ClusterRoleBinding,
    /// `apiextensions.k8s.io/v1/CustomResourceDefinition`.
    CustomResourceDefinition,
    /// `policy/v1beta1/PodSecurityPolicy`.
    PodSecurityPolicy,
}

impl Kind {
    /// All known kinds, in declaration order.
    pub const ALL: [Self; 20] = [
        Self::Pod,
        Self::Deployment,
        Self::ReplicaSet,
        Self::ReplicationController,
        Self::StatefulSet,
        Self::DaemonSet,
        Self::CronJob,
        Self::Job,
        Self::Service,
        Self::ConfigMap,
        Self::Role,
        Self::RoleBinding,
        Self::NetworkPolicy,
        Self::Ingress,
        Self::ResourceQuota,
        Self::LimitRange,
        Self::ClusterRole,
        Self::ClusterRoleBinding,
        Self::CustomResourceDefinition,
        Self::PodSecurityPolicy,
    ];

    /// Returns the canonical kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pod => "Pod",
            Self::Deployment => "Deployment",
            Self::ReplicaSet => "ReplicaSet",
            Self::ReplicationController => "ReplicationController",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
            Self::CronJob => "CronJob",
            Self::Job => "Job",
            Self::Service => "Service",
            Self::ConfigMap => "ConfigMap",
            Self::Role => "Role",
            Self::RoleBinding => "RoleBinding",
            Self::NetworkPolicy => "NetworkPolicy",
            Self::Ingress => "Ingress",
            Self::ResourceQuota => "ResourceQuota",
            Self::LimitRange => "LimitRange",
            Self::ClusterRole => "ClusterRole",
            Self::ClusterRoleBinding => "ClusterRoleBinding",
            Self::CustomResourceDefinition => "CustomResourceDefinition",
            Self::PodSecurityPolicy => "PodSecurityPolicy",
        }
    }

    /// Returns the API group version serving this kind.
    #[must_use]
    pub const fn api_version(self) -> &'static str {
        match self {
            Self::Pod
            | Self::ReplicationController
            | Self::Service
            | Self::ConfigMap
            | Self::ResourceQuota
            | Self::LimitRange => "v1",
            Self::Deployment | Self::ReplicaSet | Self::StatefulSet | Self::DaemonSet => "apps/v1",
            Self::CronJob | Self::Job => "batch/v1",
            Self::Role | Self::RoleBinding | Self::ClusterRole | Self::ClusterRoleBinding => {
                "rbac.authorization.k8s.io/v1"
            }
            Self::NetworkPolicy | Self::Ingress => "networking.k8s.io/v1",
            Self::CustomResourceDefinition => "apiextensions.k8s.io/v1",
            Self::PodSecurityPolicy => "policy/v1beta1",
        }
    }

    /// Returns true for kinds that live outside any namespace.
    #[must_use]
    pub const fn is_cluster_scoped(self) -> bool {
        matches!(
            self,
            Self::ClusterRole
                | Self::ClusterRoleBinding
                | Self::CustomResourceDefinition
                | Self::PodSecurityPolicy
        )
    }

    /// Returns true for access-control kinds, which are assessed separately.
    #[must_use]
    pub const fn is_rbac(self) -> bool {
        matches!(
            self,
            Self::Role | Self::RoleBinding | Self::ClusterRole | Self::ClusterRoleBinding
        )
    }

    /// Returns true for workload kinds (the `Workload` policy selector).
    #[must_use]
    pub const fn is_workload(self) -> bool {
        matches!(
            self,
            Self::Pod
                | Self::Deployment
                | Self::ReplicaSet
                | Self::ReplicationController
                | Self::StatefulSet
                | Self::DaemonSet
                | Self::CronJob
                | Self::Job
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown kind: {s}")))
    }
}

/// Identifies a watched object or a report owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Object kind.
    pub kind: Kind,
    /// Namespace, `None` for cluster-scoped objects.
    pub namespace: Option<String>,
    /// Object name.
    pub name: String,
}

impl ObjectRef {
    /// Creates a reference to a namespaced object.
    #[must_use]
    pub fn namespaced(kind: Kind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Creates a reference to a cluster-scoped object.
    #[must_use]
    pub fn cluster(kind: Kind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.into(),
        }
    }

    /// Builds a reference from a kind and a watch key.
    ///
    /// The namespace is dropped for cluster-scoped kinds, and an empty
    /// namespace is treated as absent.
    #[must_use]
    pub fn from_key(kind: Kind, key: &ObjectKey) -> Self {
        let namespace = if kind.is_cluster_scoped() {
            None
        } else {
            key.namespace.clone().filter(|ns| !ns.is_empty())
        };
        Self {
            kind,
            namespace,
            name: key.name.clone(),
        }
    }

    /// Returns the watch key for this reference.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Namespace and name of an object, as carried by watch events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Namespace, `None` for cluster-scoped objects.
    pub namespace: Option<String>,
    /// Object name.
    pub name: String,
}

impl ObjectKey {
    /// Creates a namespaced key.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Creates a cluster-scoped key.
    #[must_use]
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Link from a dependent object to the object that caused its creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    /// API version of the owner.
    pub api_version: String,
    /// Kind of the owner. Kept as a string: owners may be kinds the engine
    /// does not watch.
    pub kind: String,
    /// Name of the owner.
    pub name: String,
    /// UID of the owner.
    pub uid: String,
    /// True when the owner is the managing controller.
    #[serde(default)]
    pub controller: bool,
    /// True when the owner cannot be deleted before this dependent.
    #[serde(default)]
    pub block_owner_deletion: bool,
}

impl OwnerReference {
    /// Returns the owner kind if it is one the engine knows.
    #[must_use]
    pub fn known_kind(&self) -> Option<Kind> {
        self.kind.parse().ok()
    }
}

/// Metadata the reconcile logic inspects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name.
    pub name: String,
    /// Namespace, `None` for cluster-scoped objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Unique identifier assigned by the store.
    #[serde(default)]
    pub uid: String,
    /// Labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Annotations.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Owner references.
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
    /// Set once deletion has been requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

/// A watched cluster object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Object kind.
    pub kind: Kind,
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Everything except metadata (`spec`, `rules`, `data`, ...).
    #[serde(default)]
    pub body: serde_json::Value,
}

impl Resource {
    /// Creates a resource with empty metadata apart from its identity.
    #[must_use]
    pub fn new(object: &ObjectRef, body: serde_json::Value) -> Self {
        Self {
            kind: object.kind,
            metadata: ObjectMeta {
                name: object.name.clone(),
                namespace: object.namespace.clone(),
                ..ObjectMeta::default()
            },
            body,
        }
    }

    /// Returns the reference identifying this object.
    #[must_use]
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            kind: self.kind,
            namespace: self.metadata.namespace.clone(),
            name: self.metadata.name.clone(),
        }
    }

    /// Returns the managing controller of this object, if any.
    #[must_use]
    pub fn controller_of(&self) -> Option<&OwnerReference> {
        self.metadata.owner_references.iter().find(|o| o.controller)
    }

    /// Returns true once deletion has been requested.
    #[must_use]
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Returns the label value for `key`, if present.
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.get(key).map(String::as_str)
    }

    /// Returns the annotation value for `key`, if present.
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }
}
