//! External collaborators of the reconcile logic.
//!
//! The engine never owns state. It reads watched objects through an
//! [`ObjectResolver`], reads the policy bundle through a
//! [`PolicyConfigSource`] and reads and writes reports through a
//! [`ReportStore`]. Every implementation must signal absence with
//! [`warden_core::Error::NotFound`] so callers can tell it apart from
//! transport failures.
//!
//! ## Design Principles
//!
//! - **Store is the source of truth**: no in-process locks guard reconcile
//!   logic; concurrent writers are arbitrated by the store
//! - **Upsert writes**: [`ReportStore::write`] replaces the whole report
//!   object, so labels and payload always change together
//! - **Testability**: [`memory::InMemoryReportStore`] backs the test suites

pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use warden_core::{LabelSelector, ObjectKey, ObjectRef, Resource, Result};

use crate::report::{Report, ReportCollection, ReportDomain};

/// Read access to the watched object cache.
#[async_trait]
pub trait ObjectResolver: Send + Sync {
    /// Fetches an object.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the object does not exist, or another
    /// error if the cache cannot be read.
    async fn get(&self, object: &ObjectRef) -> Result<Resource>;
}

/// Read access to the policy config object.
#[async_trait]
pub trait PolicyConfigSource: Send + Sync {
    /// Fetches the data of the named config object.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the object does not exist, or another
    /// error if it cannot be read.
    async fn get_config(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>>;
}

/// Storage for compliance reports, spanning every collection it serves.
///
/// ## Thread Safety
///
/// All methods are `Send + Sync`; distinct keys are reconciled concurrently.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Finds the report owned by `owner` in `collection`.
    ///
    /// Matches on the resource kind, name and namespace labels. Returns
    /// `None` if no report exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn find_by_owner(
        &self,
        collection: ReportCollection,
        owner: &ObjectRef,
    ) -> Result<Option<Report>>;

    /// Lists reports in `collection` matching `selector`, in key order.
    ///
    /// At most `limit` items are returned when a limit is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn list(
        &self,
        collection: ReportCollection,
        selector: &LabelSelector,
        limit: Option<usize>,
    ) -> Result<Vec<Report>>;

    /// Creates or replaces a report, keyed by its collection, namespace and name.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn write(&self, report: &Report) -> Result<()>;

    /// Deletes a report.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the report does not exist, or another
    /// error if the delete fails.
    async fn delete(&self, collection: ReportCollection, key: &ObjectKey) -> Result<()>;
}

/// Report writers, one per domain.
///
/// Each [`crate::report::ReportData`] arm is persisted through its own
/// store; both scopes of a domain share it.
#[derive(Clone)]
pub struct ReportStores {
    /// Store for generic configuration audit reports.
    pub config_audit: Arc<dyn ReportStore>,
    /// Store for RBAC assessment reports.
    pub rbac_assessment: Arc<dyn ReportStore>,
}

impl ReportStores {
    /// Creates the store pair.
    #[must_use]
    pub fn new(config_audit: Arc<dyn ReportStore>, rbac_assessment: Arc<dyn ReportStore>) -> Self {
        Self {
            config_audit,
            rbac_assessment,
        }
    }

    /// Returns the store serving `domain`.
    #[must_use]
    pub fn for_domain(&self, domain: ReportDomain) -> &dyn ReportStore {
        match domain {
            ReportDomain::ConfigAudit => self.config_audit.as_ref(),
            ReportDomain::RbacAssessment => self.rbac_assessment.as_ref(),
        }
    }

    /// Returns the store serving `collection`.
    #[must_use]
    pub fn for_collection(&self, collection: ReportCollection) -> &dyn ReportStore {
        self.for_domain(collection.domain())
    }
}

impl std::fmt::Debug for ReportStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportStores").finish_non_exhaustive()
    }
}
