//! # warden-audit
//!
//! Level-triggered reconciliation of compliance reports.
//!
//! For every watched object the engine keeps at most one report, tagged with
//! the hash of the object's spec and the hash of the policies applied to it.
//! A report is rewritten only when either hash changes, and reports left
//! behind by a policy change are collected in bounded batches.
//!
//! ## Components
//!
//! - **Admission** ([`predicate`]): composable filters over watch events
//! - **Ownership** ([`ownership`]): skips objects covered by a related owner
//! - **Policies** ([`policy`]): bundle loading, applicability and hashing
//! - **Freshness** ([`freshness`]): the cache-hit decision
//! - **Evaluation** ([`evaluator`]): rule results to report payloads
//! - **Persistence** ([`persister`]): report construction and writes
//! - **Collection** ([`collector`]): batched stale-report deletion
//! - **Routing** ([`controller`], [`registry`]): entry points and watch routes
//!
//! ## Example
//!
//! ```rust
//! use warden_audit::prelude::*;
//! use warden_core::Kind;
//!
//! assert_eq!(
//!     ReportCollection::for_kind(Kind::ClusterRole),
//!     ReportCollection::ClusterRbacAssessmentReport
//! );
//! assert_eq!(report_name(Kind::Pod, "web"), "pod-web");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod collector;
pub mod config;
pub mod controller;
pub mod error;
pub mod evaluator;
pub mod freshness;
pub mod metrics;
pub mod ownership;
pub mod persister;
pub mod policy;
pub mod predicate;
pub mod registry;
pub mod report;
pub mod store;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::collector::{CollectionSweep, StaleReportCollector, SweepOutcome};
    pub use crate::config::{AuditConfig, InstallMode};
    pub use crate::controller::{ReconcileOutcome, ResourceController, Route, RouteTarget};
    pub use crate::error::{Error, Result};
    pub use crate::evaluator::{RuleEngine, RuleResult, RuleStatus};
    pub use crate::persister::{ReportBuilder, report_name};
    pub use crate::policy::Policies;
    pub use crate::predicate::Predicate;
    pub use crate::report::{
        BuildInfo, Check, Report, ReportCollection, ReportData, ReportDomain, ReportScope,
        Severity, Summary,
    };
    pub use crate::store::{ObjectResolver, PolicyConfigSource, ReportStore, ReportStores};
}

pub use config::AuditConfig;
pub use controller::{ReconcileOutcome, ResourceController};
pub use error::{Error, Result};
