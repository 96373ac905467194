//! Ownership-based redundancy elimination.
//!
//! Some objects are covered by a report on a related object and are skipped:
//!
//! - a `Pod` controlled by a built-in workload controller
//! - a `ReplicaSet` that is not the active revision of its `Deployment`, when
//!   only current revisions are scanned
//! - a `Job` spawned by a `CronJob`
//!
//! Owner lookup failures are errors, never silent skips.

use std::fmt;

use warden_core::labels::DEPLOYMENT_REVISION_ANNOTATION;
use warden_core::{CancelToken, Kind, ObjectRef, OwnerReference, Resource};

use crate::error::{Error, Result};
use crate::store::ObjectResolver;

/// Returns true for owner kinds that manage pods on their own and are
/// evaluated in their place.
#[must_use]
pub fn is_built_in_workload_controller(owner: &OwnerReference) -> bool {
    matches!(
        owner.known_kind(),
        Some(
            Kind::ReplicaSet
                | Kind::ReplicationController
                | Kind::StatefulSet
                | Kind::DaemonSet
                | Kind::Job
        )
    )
}

/// Why an object was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A pod managed by a built-in workload controller.
    ManagedByWorkload {
        /// Kind of the controlling owner.
        controller_kind: String,
    },
    /// A replica set that is not its deployment's current revision.
    InactiveReplicaSet,
    /// A job spawned by a cron job.
    ManagedByCronJob,
}

impl SkipReason {
    /// Short label value for metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ManagedByWorkload { .. } => "managed_by_workload",
            Self::InactiveReplicaSet => "inactive_replica_set",
            Self::ManagedByCronJob => "managed_by_cronjob",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManagedByWorkload { controller_kind } => {
                write!(f, "pod managed by built-in workload {controller_kind}")
            }
            Self::InactiveReplicaSet => f.write_str("replica set is not the active revision"),
            Self::ManagedByCronJob => f.write_str("job managed by cron job"),
        }
    }
}

/// Decides whether an object is redundant.
pub struct OwnershipResolver<'a> {
    objects: &'a dyn ObjectResolver,
    scan_only_current_revisions: bool,
}

impl<'a> OwnershipResolver<'a> {
    /// Creates a resolver reading owners through `objects`.
    #[must_use]
    pub fn new(objects: &'a dyn ObjectResolver, scan_only_current_revisions: bool) -> Self {
        Self {
            objects,
            scan_only_current_revisions,
        }
    }

    /// Returns the reason `resource` should be skipped, or `None` to evaluate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ownership`] if an owner lookup fails, or
    /// [`Error::Cancelled`] if `cancel` fires during the lookup.
    pub async fn skip_reason(
        &self,
        resource: &Resource,
        cancel: &CancelToken,
    ) -> Result<Option<SkipReason>> {
        let controller = resource.controller_of();
        match (resource.kind, controller) {
            (Kind::Pod, Some(owner)) if is_built_in_workload_controller(owner) => {
                Ok(Some(SkipReason::ManagedByWorkload {
                    controller_kind: owner.kind.clone(),
                }))
            }
            (Kind::ReplicaSet, Some(owner)) if self.scan_only_current_revisions => {
                if self.is_active_replica_set(resource, owner, cancel).await? {
                    Ok(None)
                } else {
                    Ok(Some(SkipReason::InactiveReplicaSet))
                }
            }
            (Kind::Job, Some(owner)) if owner.known_kind() == Some(Kind::CronJob) => {
                Ok(Some(SkipReason::ManagedByCronJob))
            }
            _ => Ok(None),
        }
    }

    /// Returns true if `replica_set` carries the same revision as its
    /// controlling deployment. Replica sets controlled by anything else are
    /// always active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ownership`] if the deployment cannot be fetched.
    pub async fn is_active_replica_set(
        &self,
        replica_set: &Resource,
        controller: &OwnerReference,
        cancel: &CancelToken,
    ) -> Result<bool> {
        if controller.known_kind() != Some(Kind::Deployment) {
            return Ok(true);
        }
        let deployment_ref = ObjectRef {
            kind: Kind::Deployment,
            namespace: replica_set.metadata.namespace.clone(),
            name: controller.name.clone(),
        };
        let deployment = cancel
            .run(self.objects.get(&deployment_ref))
            .await
            .map_err(|source| {
                if source.is_cancelled() {
                    Error::Cancelled
                } else {
                    Error::Ownership {
                        object: replica_set.object_ref(),
                        source,
                    }
                }
            })?;

        let deployment_revision = deployment.annotation(DEPLOYMENT_REVISION_ANNOTATION);
        let replica_set_revision = replica_set.annotation(DEPLOYMENT_REVISION_ANNOTATION);
        Ok(replica_set_revision == deployment_revision)
    }
}
