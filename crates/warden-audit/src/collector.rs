//! Stale report collection.
//!
//! When the policy bundle changes, reports of a kind whose
//! `plugin-config-hash` differs from the kind's current hash are stale. They
//! are deleted in bounded batches: each pass deletes at most `batch_limit`
//! reports per collection and reports whether more remain, so a sweep of `N`
//! reports takes `ceil(N / batch_limit)` passes.
//!
//! Remaining work is detected by fetching `batch_limit + 1` items. Reports
//! removed concurrently by someone else make this an over-estimate at worst,
//! which costs one extra empty pass.

use tracing::{debug, info};

use warden_core::labels::{PLUGIN_CONFIG_HASH, RESOURCE_KIND};
use warden_core::{CancelToken, Kind, LabelSelector};

use crate::error::{Error, Result};
use crate::report::{ReportCollection, ReportDomain, ReportScope};
use crate::store::ReportStores;

/// Builds the selector matching reports of `kind` not produced under `current_hash`.
///
/// # Errors
///
/// Returns [`Error::Computation`] if the hash or kind is not a valid label value.
pub fn stale_selector(kind: Kind, current_hash: &str) -> Result<LabelSelector> {
    LabelSelector::new()
        .not_equal(PLUGIN_CONFIG_HASH, current_hash)
        .and_then(|s| s.equal(RESOURCE_KIND, kind.as_str()))
        .map_err(|e| Error::computation("stale report selector", e))
}

/// Returns the collections swept for reports of `scope`.
#[must_use]
pub fn collections_for(scope: ReportScope, rbac_enabled: bool) -> Vec<ReportCollection> {
    let mut collections = vec![ReportCollection::new(ReportDomain::ConfigAudit, scope)];
    if rbac_enabled {
        collections.push(ReportCollection::new(ReportDomain::RbacAssessment, scope));
    }
    collections
}

/// Result of one pass over one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionSweep {
    /// Collection swept.
    pub collection: ReportCollection,
    /// Items returned by the capped listing.
    pub fetched: usize,
    /// Reports deleted by this pass.
    pub deleted: usize,
    /// True if the listing returned more than the batch limit.
    pub pending: bool,
}

/// Result of one collector pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Per-collection results, in sweep order.
    pub sweeps: Vec<CollectionSweep>,
}

impl SweepOutcome {
    /// True if any collection has work left.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.sweeps.iter().any(|s| s.pending)
    }

    /// Total reports deleted.
    #[must_use]
    pub fn deleted(&self) -> usize {
        self.sweeps.iter().map(|s| s.deleted).sum()
    }
}

/// Deletes stale reports in bounded batches.
pub struct StaleReportCollector<'a> {
    stores: &'a ReportStores,
    batch_limit: usize,
    rbac_enabled: bool,
}

impl<'a> StaleReportCollector<'a> {
    /// Creates a collector.
    #[must_use]
    pub fn new(stores: &'a ReportStores, batch_limit: usize, rbac_enabled: bool) -> Self {
        Self {
            stores,
            batch_limit,
            rbac_enabled,
        }
    }

    /// Runs one pass for `kind` against `current_hash`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Computation`] if the selector cannot be built,
    /// [`Error::Persistence`] if a list or delete fails for a reason other
    /// than absence, or [`Error::Cancelled`] if cancellation fires between
    /// deletions.
    pub async fn collect(
        &self,
        kind: Kind,
        current_hash: &str,
        cancel: &CancelToken,
    ) -> Result<SweepOutcome> {
        let selector = stale_selector(kind, current_hash)?;
        let mut outcome = SweepOutcome::default();
        for collection in collections_for(ReportScope::for_kind(kind), self.rbac_enabled) {
            outcome
                .sweeps
                .push(self.sweep(collection, &selector, cancel).await?);
        }

        if outcome.deleted() > 0 || outcome.pending() {
            info!(
                %kind,
                %selector,
                deleted = outcome.deleted(),
                pending = outcome.pending(),
                "collected stale reports"
            );
        }
        Ok(outcome)
    }

    async fn sweep(
        &self,
        collection: ReportCollection,
        selector: &LabelSelector,
        cancel: &CancelToken,
    ) -> Result<CollectionSweep> {
        let store = self.stores.for_collection(collection);
        let fetch_limit = self.batch_limit.saturating_add(1);
        let items = cancel
            .run(store.list(collection, selector, Some(fetch_limit)))
            .await
            .map_err(|e| Error::persistence("listing", collection.as_str(), e))?;

        let mut deleted = 0;
        for report in items.iter().take(self.batch_limit) {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let key = report.key();
            match cancel.run(store.delete(collection, &key)).await {
                Ok(()) => {
                    deleted += 1;
                    debug!(%collection, report = %key, "deleted stale report");
                }
                Err(e) if e.is_not_found() => {
                    debug!(%collection, report = %key, "stale report already gone");
                }
                Err(e) => {
                    return Err(Error::persistence(
                        "deleting",
                        format!("{collection} {key}"),
                        e,
                    ));
                }
            }
        }

        Ok(CollectionSweep {
            collection,
            fetched: items.len(),
            deleted,
            pending: items.len() > self.batch_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_shape() -> Result<()> {
        let selector = stale_selector(Kind::Pod, "abc123")?;
        assert_eq!(
            selector.to_string(),
            "plugin-config-hash!=abc123,warden.resource.kind=Pod"
        );
        assert!(matches!(
            stale_selector(Kind::Pod, "not a hash"),
            Err(Error::Computation { .. })
        ));
        Ok(())
    }

    #[test]
    fn collections_follow_scope_and_rbac_flag() {
        assert_eq!(
            collections_for(ReportScope::Namespaced, true),
            vec![
                ReportCollection::ConfigAuditReport,
                ReportCollection::RbacAssessmentReport
            ]
        );
        assert_eq!(
            collections_for(ReportScope::Cluster, false),
            vec![ReportCollection::ClusterConfigAuditReport]
        );
    }
}
