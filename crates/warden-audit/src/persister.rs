//! Report construction and persistence.
//!
//! A report is built in full before it is written: the hash labels always
//! describe the inputs that produced the payload, even if the write races
//! with cancellation.

use std::collections::BTreeMap;

use tracing::debug;

use warden_core::hash::compute_str_hash;
use warden_core::labels::{
    MANAGED_BY, MANAGED_BY_WARDEN, PLUGIN_CONFIG_HASH, RESOURCE_KIND, RESOURCE_NAME,
    RESOURCE_NAMESPACE, RESOURCE_SPEC_HASH, label_value_for,
};
use warden_core::{CancelToken, Kind, ObjectMeta, OwnerReference, Resource};

use crate::error::{Error, Result};
use crate::report::{Report, ReportCollection, ReportData, ReportScope};
use crate::store::ReportStores;

const MAX_REPORT_NAME_LEN: usize = 63;

/// Returns the report name for an owner: `<kind>-<name>`, with the name
/// replaced by its hash when the result would be too long.
#[must_use]
pub fn report_name(kind: Kind, name: &str) -> String {
    let kind = kind.as_str().to_ascii_lowercase();
    let full = format!("{kind}-{name}");
    if full.len() > MAX_REPORT_NAME_LEN {
        format!("{kind}-{}", compute_str_hash(name))
    } else {
        full
    }
}

/// Builds a report for one owner.
#[derive(Debug)]
pub struct ReportBuilder<'a> {
    owner: &'a Resource,
    spec_hash: String,
    config_hash: String,
    data: Option<ReportData>,
}

impl<'a> ReportBuilder<'a> {
    /// Starts a report owned by `owner`.
    #[must_use]
    pub fn new(owner: &'a Resource) -> Self {
        Self {
            owner,
            spec_hash: String::new(),
            config_hash: String::new(),
            data: None,
        }
    }

    /// Sets the resource spec hash label.
    #[must_use]
    pub fn resource_spec_hash(mut self, hash: impl Into<String>) -> Self {
        self.spec_hash = hash.into();
        self
    }

    /// Sets the policy config hash label.
    #[must_use]
    pub fn plugin_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn data(mut self, data: ReportData) -> Self {
        self.data = Some(data);
        self
    }

    /// Builds the report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Computation`] if a hash label is missing or the
    /// payload was not set.
    pub fn build(self) -> Result<Report> {
        if self.spec_hash.is_empty() || self.config_hash.is_empty() {
            return Err(Error::computation("report labels", "hash label missing"));
        }
        let data = self
            .data
            .ok_or_else(|| Error::computation("report", "payload missing"))?;

        let kind = self.owner.kind;
        let collection = ReportCollection::new(data.domain(), ReportScope::for_kind(kind));
        let namespace = match collection.scope() {
            ReportScope::Namespaced => self.owner.metadata.namespace.clone(),
            ReportScope::Cluster => None,
        };

        let mut labels = BTreeMap::from([
            (RESOURCE_KIND.to_string(), kind.as_str().to_string()),
            (
                RESOURCE_NAME.to_string(),
                label_value_for(&self.owner.metadata.name),
            ),
            (RESOURCE_SPEC_HASH.to_string(), self.spec_hash),
            (PLUGIN_CONFIG_HASH.to_string(), self.config_hash),
            (MANAGED_BY.to_string(), MANAGED_BY_WARDEN.to_string()),
        ]);
        if let Some(ns) = &namespace {
            labels.insert(RESOURCE_NAMESPACE.to_string(), label_value_for(ns));
        }

        Ok(Report {
            collection,
            metadata: ObjectMeta {
                name: report_name(kind, &self.owner.metadata.name),
                namespace,
                labels,
                owner_references: vec![OwnerReference {
                    api_version: kind.api_version().to_string(),
                    kind: kind.as_str().to_string(),
                    name: self.owner.metadata.name.clone(),
                    uid: self.owner.metadata.uid.clone(),
                    controller: true,
                    block_owner_deletion: false,
                }],
                ..ObjectMeta::default()
            },
            data,
        })
    }
}

/// Writes reports through the store matching their domain.
pub struct ReportPersister<'a> {
    stores: &'a ReportStores,
}

impl<'a> ReportPersister<'a> {
    /// Creates a persister writing to `stores`.
    #[must_use]
    pub fn new(stores: &'a ReportStores) -> Self {
        Self { stores }
    }

    /// Upserts `report`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if the write fails, or
    /// [`Error::Cancelled`].
    pub async fn write(&self, report: &Report, cancel: &CancelToken) -> Result<()> {
        let store = self.stores.for_domain(report.data.domain());
        cancel.run(store.write(report)).await.map_err(|e| {
            Error::persistence(
                "writing",
                format!("{} {}", report.collection, report.key()),
                e,
            )
        })?;
        debug!(
            collection = %report.collection,
            report = %report.key(),
            "wrote report"
        );
        Ok(())
    }
}
