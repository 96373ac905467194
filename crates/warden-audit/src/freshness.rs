//! Report cache-hit decision.
//!
//! A report is fresh iff it exists and both of its hash labels equal the
//! hashes computed from the current object and policy bundle. Any mismatch,
//! including a missing report, forces re-evaluation.

use tracing::debug;

use warden_core::labels::{PLUGIN_CONFIG_HASH, RESOURCE_SPEC_HASH};
use warden_core::{CancelToken, ObjectRef};

use crate::error::{Error, Result};
use crate::report::{Report, ReportCollection};
use crate::store::ReportStores;

/// Returns true if `report` was produced from inputs with these hashes.
#[must_use]
pub fn is_fresh_report(report: &Report, spec_hash: &str, config_hash: &str) -> bool {
    report.label(RESOURCE_SPEC_HASH) == Some(spec_hash)
        && report.label(PLUGIN_CONFIG_HASH) == Some(config_hash)
}

/// Looks up the existing report for an owner and compares its hashes.
pub struct FreshnessChecker<'a> {
    stores: &'a ReportStores,
}

impl<'a> FreshnessChecker<'a> {
    /// Creates a checker reading from `stores`.
    #[must_use]
    pub fn new(stores: &'a ReportStores) -> Self {
        Self { stores }
    }

    /// Returns true if a fresh report for `owner` exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if the lookup fails for a reason other
    /// than absence, or [`Error::Cancelled`].
    pub async fn has_fresh_report(
        &self,
        owner: &ObjectRef,
        spec_hash: &str,
        config_hash: &str,
        cancel: &CancelToken,
    ) -> Result<bool> {
        let collection = ReportCollection::for_kind(owner.kind);
        let store = self.stores.for_collection(collection);

        let existing = match cancel.run(store.find_by_owner(collection, owner)).await {
            Ok(report) => report,
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                return Err(Error::persistence(
                    "getting",
                    format!("{collection} for {owner}"),
                    e,
                ));
            }
        };

        let fresh = existing
            .as_ref()
            .is_some_and(|r| is_fresh_report(r, spec_hash, config_hash));
        debug!(
            %owner,
            %collection,
            exists = existing.is_some(),
            fresh,
            "checked report freshness"
        );
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use chrono::Utc;
    use warden_core::labels::{RESOURCE_KIND, RESOURCE_NAME, RESOURCE_NAMESPACE};
    use warden_core::{Kind, ObjectMeta};

    use crate::report::{ConfigAuditReportData, ReportData, Scanner, Summary};
    use crate::store::memory::{Failure, InMemoryReportStore, Operation};

    fn labelled(spec: &str, config: &str) -> Report {
        let labels: BTreeMap<String, String> = [
            (RESOURCE_SPEC_HASH, spec),
            (PLUGIN_CONFIG_HASH, config),
            (RESOURCE_KIND, "Pod"),
            (RESOURCE_NAME, "web"),
            (RESOURCE_NAMESPACE, "default"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Report {
            collection: ReportCollection::ConfigAuditReport,
            metadata: ObjectMeta {
                name: "pod-web".into(),
                namespace: Some("default".into()),
                labels,
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

    fn stores(store: Arc<InMemoryReportStore>) -> ReportStores {
        ReportStores::new(store, Arc::new(InMemoryReportStore::new()))
    }

    #[test]
    fn both_hashes_must_match() {
        let r = labelled("abc", "xyz");
        assert!(is_fresh_report(&r, "abc", "xyz"));
        assert!(!is_fresh_report(&r, "abd", "xyz"));
        assert!(!is_fresh_report(&r, "abc", "xyw"));
    }

    #[tokio::test]
    async fn cache_hit_and_miss() -> Result<()> {
        let store = Arc::new(InMemoryReportStore::new());
        store.seed(labelled("abc", "xyz"))?;
        let stores = stores(store);
        let checker = FreshnessChecker::new(&stores);
        let cancel = CancelToken::never();

        let owner = ObjectRef::namespaced(Kind::Pod, "default", "web");
        assert!(checker.has_fresh_report(&owner, "abc", "xyz", &cancel).await?);
        assert!(!checker.has_fresh_report(&owner, "abc", "new", &cancel).await?);

        let absent = ObjectRef::namespaced(Kind::Pod, "default", "api");
        assert!(!checker.has_fresh_report(&absent, "abc", "xyz", &cancel).await?);
        Ok(())
    }

    #[tokio::test]
    async fn lookup_failure_propagates() -> Result<()> {
        let store = Arc::new(InMemoryReportStore::new());
        store.inject_failure(Operation::FindByOwner, Failure::Storage)?;
        let stores = stores(store);
        let checker = FreshnessChecker::new(&stores);

        let owner = ObjectRef::namespaced(Kind::Pod, "default", "web");
        let out = checker
            .has_fresh_report(&owner, "a", "b", &CancelToken::never())
            .await;
        assert!(matches!(out, Err(Error::Persistence { .. })));
        Ok(())
    }
}
