//! In-memory report store for testing.
//!
//! Records every operation for assertions and supports failure injection per
//! operation. Owner cascades are simulated with
//! [`InMemoryReportStore::remove_owned_by`].

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use warden_core::labels::{RESOURCE_KIND, RESOURCE_NAME, RESOURCE_NAMESPACE, label_value_for};
use warden_core::{Error, LabelSelector, ObjectKey, ObjectRef, Result};

use super::ReportStore;
use crate::report::{Report, ReportCollection};

/// Store operation kinds, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// [`ReportStore::find_by_owner`].
    FindByOwner,
    /// [`ReportStore::list`].
    List,
    /// [`ReportStore::write`].
    Write,
    /// [`ReportStore::delete`].
    Delete,
}

/// How an injected failure surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// A storage error.
    Storage,
    /// A not-found error, as if a concurrent actor removed the target first.
    NotFound,
}

/// Record of a store operation for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Lookup by owner.
    FindByOwner {
        /// Collection searched.
        collection: ReportCollection,
        /// Owner looked up.
        owner: ObjectRef,
    },
    /// Selector listing.
    List {
        /// Collection listed.
        collection: ReportCollection,
        /// Rendered selector.
        selector: String,
        /// Requested limit.
        limit: Option<usize>,
        /// Items returned.
        returned: usize,
    },
    /// Upsert.
    Write {
        /// Collection written.
        collection: ReportCollection,
        /// Report key.
        key: ObjectKey,
    },
    /// Delete.
    Delete {
        /// Collection deleted from.
        collection: ReportCollection,
        /// Report key.
        key: ObjectKey,
    },
}

/// In-memory implementation of [`ReportStore`].
///
/// Uses `RwLock` for synchronization. Reports are kept in key order so
/// limited listings are deterministic.
#[derive(Debug, Default)]
pub struct InMemoryReportStore {
    reports: RwLock<BTreeMap<(ReportCollection, ObjectKey), Report>>,
    operations: RwLock<Vec<StoreOp>>,
    failures: RwLock<Vec<(Operation, Failure)>>,
    latency: Option<Duration>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

impl InMemoryReportStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose calls each take `latency` to complete.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Makes every subsequent `operation` fail with `failure`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn inject_failure(&self, operation: Operation, failure: Failure) -> Result<()> {
        self.failures
            .write()
            .map_err(poison_err)?
            .push((operation, failure));
        Ok(())
    }

    /// Clears injected failures.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn clear_failures(&self) -> Result<()> {
        self.failures.write().map_err(poison_err)?.clear();
        Ok(())
    }

    /// Returns all recorded operations.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn operations(&self) -> Result<Vec<StoreOp>> {
        Ok(self.operations.read().map_err(poison_err)?.clone())
    }

    /// Clears recorded operations.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn clear_operations(&self) -> Result<()> {
        self.operations.write().map_err(poison_err)?.clear();
        Ok(())
    }

    /// Returns the number of recorded writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn write_count(&self) -> Result<usize> {
        Ok(self
            .operations
            .read()
            .map_err(poison_err)?
            .iter()
            .filter(|op| matches!(op, StoreOp::Write { .. }))
            .count())
    }

    /// Returns the number of recorded deletes.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn delete_count(&self) -> Result<usize> {
        Ok(self
            .operations
            .read()
            .map_err(poison_err)?
            .iter()
            .filter(|op| matches!(op, StoreOp::Delete { .. }))
            .count())
    }

    /// Returns the number of reports in `collection`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn report_count(&self, collection: ReportCollection) -> Result<usize> {
        Ok(self
            .reports
            .read()
            .map_err(poison_err)?
            .keys()
            .filter(|(c, _)| *c == collection)
            .count())
    }

    /// Returns every stored report, in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn reports(&self) -> Result<Vec<Report>> {
        Ok(self
            .reports
            .read()
            .map_err(poison_err)?
            .values()
            .cloned()
            .collect())
    }

    /// Inserts a report without recording an operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn seed(&self, report: Report) -> Result<()> {
        self.reports
            .write()
            .map_err(poison_err)?
            .insert((report.collection, report.key()), report);
        Ok(())
    }

    /// Removes every report whose owner reference carries `owner_uid`,
    /// without recording an operation. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn remove_owned_by(&self, owner_uid: &str) -> Result<usize> {
        let mut reports = self.reports.write().map_err(poison_err)?;
        let before = reports.len();
        reports.retain(|_, r| {
            !r.metadata
                .owner_references
                .iter()
                .any(|o| o.uid == owner_uid)
        });
        Ok(before - reports.len())
    }

    fn record(&self, op: StoreOp) -> Result<()> {
        self.operations.write().map_err(poison_err)?.push(op);
        Ok(())
    }

    fn check_failure(&self, operation: Operation, target: &dyn std::fmt::Display) -> Result<()> {
        let failures = self.failures.read().map_err(poison_err)?;
        match failures.iter().find(|(op, _)| *op == operation) {
            Some((_, Failure::Storage)) => Err(Error::storage(format!(
                "injected {operation:?} failure for {target}"
            ))),
            Some((_, Failure::NotFound)) => Err(Error::not_found("report", target)),
            None => Ok(()),
        }
    }

    async fn maybe_delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn owned_by(report: &Report, owner: &ObjectRef) -> bool {
    report.label(RESOURCE_KIND) == Some(owner.kind.as_str())
        && report.label(RESOURCE_NAME) == Some(label_value_for(&owner.name).as_str())
        && report.label(RESOURCE_NAMESPACE) == owner.namespace.as_deref()
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn find_by_owner(
        &self,
        collection: ReportCollection,
        owner: &ObjectRef,
    ) -> Result<Option<Report>> {
        self.maybe_delay().await;
        self.check_failure(Operation::FindByOwner, owner)?;
        self.record(StoreOp::FindByOwner {
            collection,
            owner: owner.clone(),
        })?;

        let reports = self.reports.read().map_err(poison_err)?;
        Ok(reports
            .iter()
            .find(|((c, _), r)| *c == collection && owned_by(r, owner))
            .map(|(_, r)| r.clone()))
    }

    async fn list(
        &self,
        collection: ReportCollection,
        selector: &LabelSelector,
        limit: Option<usize>,
    ) -> Result<Vec<Report>> {
        self.maybe_delay().await;
        self.check_failure(Operation::List, &collection)?;

        let matched: Vec<Report> = {
            let reports = self.reports.read().map_err(poison_err)?;
            reports
                .iter()
                .filter(|((c, _), r)| *c == collection && selector.matches(&r.metadata.labels))
                .map(|(_, r)| r.clone())
                .take(limit.unwrap_or(usize::MAX))
                .collect()
        };
        self.record(StoreOp::List {
            collection,
            selector: selector.to_string(),
            limit,
            returned: matched.len(),
        })?;
        Ok(matched)
    }

    async fn write(&self, report: &Report) -> Result<()> {
        self.maybe_delay().await;
        let key = report.key();
        self.check_failure(Operation::Write, &key)?;
        self.record(StoreOp::Write {
            collection: report.collection,
            key: key.clone(),
        })?;

        self.reports
            .write()
            .map_err(poison_err)?
            .insert((report.collection, key), report.clone());
        Ok(())
    }

    async fn delete(&self, collection: ReportCollection, key: &ObjectKey) -> Result<()> {
        self.maybe_delay().await;
        self.check_failure(Operation::Delete, key)?;
        self.record(StoreOp::Delete {
            collection,
            key: key.clone(),
        })?;

        self.reports
            .write()
            .map_err(poison_err)?
            .remove(&(collection, key.clone()))
            .map(|_| ())
            .ok_or_else(|| Error::not_found(collection, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use warden_core::labels::{PLUGIN_CONFIG_HASH, RESOURCE_SPEC_HASH};
    use warden_core::{Kind, ObjectMeta, OwnerReference};

    use crate::report::{ConfigAuditReportData, ReportData, Scanner, Summary};

    fn report(name: &str, config_hash: &str) -> Report {
        let mut labels = BTreeMap::new();
        labels.insert(RESOURCE_KIND.to_string(), "Pod".to_string());
        labels.insert(RESOURCE_NAME.to_string(), name.to_string());
        labels.insert(RESOURCE_NAMESPACE.to_string(), "default".to_string());
        labels.insert(RESOURCE_SPEC_HASH.to_string(), "s".to_string());
        labels.insert(PLUGIN_CONFIG_HASH.to_string(), config_hash.to_string());
        Report {
            collection: ReportCollection::ConfigAuditReport,
            metadata: ObjectMeta {
                name: format!("pod-{name}"),
                namespace: Some("default".into()),
                labels,
                owner_references: vec![OwnerReference {
                    api_version: "v1".into(),
                    kind: "Pod".into(),
                    name: name.into(),
                    uid: format!("uid-{name}"),
                    controller: true,
                    block_owner_deletion: false,
                }],
                ..ObjectMeta::default()
            },
            data: ReportData::ConfigAudit(ConfigAuditReportData {
                update_timestamp: Utc::now(),
                scanner: Scanner {
                    name: "Warden".into(),
                    vendor: "Warden".into(),
                    version: "dev".into(),
                },
                summary: Summary::default(),
                checks: Vec::new(),
            }),
        }
    }

    #[tokio::test]
    async fn write_then_find_by_owner() -> Result<()> {
        let store = InMemoryReportStore::new();
        store.write(&report("web", "h1")).await?;

        let owner = ObjectRef::namespaced(Kind::Pod, "default", "web");
        let found = store
            .find_by_owner(ReportCollection::ConfigAuditReport, &owner)
            .await?;
        assert_eq!(found.map(|r| r.metadata.name), Some("pod-web".to_string()));

        let other = store
            .find_by_owner(ReportCollection::ClusterConfigAuditReport, &owner)
            .await?;
        assert!(other.is_none());
        assert_eq!(store.write_count()?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn list_honors_selector_and_limit() -> Result<()> {
        let store = InMemoryReportStore::new();
        for i in 0..5 {
            store.seed(report(&format!("p{i}"), "old"))?;
        }
        store.seed(report("fresh", "new"))?;

        let selector: LabelSelector = "plugin-config-hash!=new,warden.resource.kind=Pod".parse()?;
        let all = store
            .list(ReportCollection::ConfigAuditReport, &selector, None)
            .await?;
        assert_eq!(all.len(), 5);

        let capped = store
            .list(ReportCollection::ConfigAuditReport, &selector, Some(3))
            .await?;
        assert_eq!(capped.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() -> Result<()> {
        let store = InMemoryReportStore::new();
        let err = store
            .delete(ReportCollection::ConfigAuditReport, &ObjectKey::new("default", "x"))
            .await;
        assert!(matches!(err, Err(e) if e.is_not_found()));
        Ok(())
    }

    #[tokio::test]
    async fn injected_failures_surface() -> Result<()> {
        let store = InMemoryReportStore::new();
        store.inject_failure(Operation::Write, Failure::Storage)?;
        assert!(store.write(&report("web", "h")).await.is_err());
        assert_eq!(store.write_count()?, 0);

        store.clear_failures()?;
        store.write(&report("web", "h")).await?;
        assert_eq!(store.write_count()?, 1);
        Ok(())
    }

    #[test]
    fn cascade_removes_owned_reports() -> Result<()> {
        let store = InMemoryReportStore::new();
        store.seed(report("a", "h"))?;
        store.seed(report("b", "h"))?;
        assert_eq!(store.remove_owned_by("uid-a")?, 1);
        assert_eq!(store.report_count(ReportCollection::ConfigAuditReport)?, 1);
        assert!(store.operations()?.is_empty());
        Ok(())
    }
}
