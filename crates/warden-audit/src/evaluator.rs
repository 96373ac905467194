//! Compliance evaluation.
//!
//! The rule engine itself is external: it receives policy modules and an
//! object and returns one [`RuleResult`] per rule. This module maps those
//! results to checks and wraps them in the [`ReportData`] variant matching
//! the object's domain.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use warden_core::{CancelToken, Resource};

use crate::error::{Error, Result};
use crate::policy::Policies;
use crate::report::{
    BuildInfo, CHECK_CATEGORY, Check, ConfigAuditReportData, RbacAssessmentReportData, ReportData,
    ReportDomain, Severity, Summary,
};

/// Outcome of one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    /// The object satisfies the rule.
    Passed,
    /// The object violates the rule.
    Failed,
    /// The rule was waived for this object.
    Exception,
}

/// Result of one rule, as returned by the rule engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
    /// Rule identifier.
    pub id: String,
    /// Short rule summary.
    pub title: String,
    /// Rule explanation.
    pub description: String,
    /// Rule severity.
    pub severity: Severity,
    /// Rule outcome.
    pub status: RuleStatus,
    /// Messages produced by the rule.
    pub messages: Vec<String>,
}

impl RuleResult {
    /// Maps the result to a report check. Only passed rules succeed; a
    /// waived rule still counts toward the summary.
    #[must_use]
    pub fn into_check(self) -> Check {
        Check {
            id: self.id,
            title: self.title,
            description: self.description,
            severity: self.severity,
            category: CHECK_CATEGORY.to_string(),
            success: self.status == RuleStatus::Passed,
            messages: self.messages,
        }
    }
}

/// External policy rule engine.
#[async_trait]
pub trait RuleEngine: Send + Sync {
    /// Runs `modules` (and built-in rules, if requested) against `resource`.
    ///
    /// Results are returned in rule order.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    async fn evaluate(
        &self,
        modules: &BTreeMap<String, String>,
        use_builtin_policies: bool,
        resource: &Resource,
    ) -> warden_core::Result<Vec<RuleResult>>;
}

/// Runs policies and shapes report data.
pub struct Evaluator<'a> {
    engine: &'a dyn RuleEngine,
    build_info: &'a BuildInfo,
}

impl<'a> Evaluator<'a> {
    /// Creates an evaluator delegating to `engine`.
    #[must_use]
    pub fn new(engine: &'a dyn RuleEngine, build_info: &'a BuildInfo) -> Self {
        Self { engine, build_info }
    }

    /// Evaluates `resource` and returns the report data for its domain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPoliciesApplicable`] if no policy covers the kind,
    /// [`Error::PolicyConfig`] for a malformed bundle, [`Error::Evaluation`]
    /// if the rule engine fails, or [`Error::Cancelled`].
    pub async fn evaluate(
        &self,
        policies: &Policies,
        resource: &Resource,
        cancel: &CancelToken,
    ) -> Result<ReportData> {
        let kind = resource.kind;
        if !policies.use_builtin_policies() && policies.policies_by_kind(kind)?.is_empty() {
            return Err(Error::NoPoliciesApplicable { kind });
        }
        let modules = policies.modules_for_kind(kind)?;

        let results = cancel
            .run(
                self.engine
                    .evaluate(&modules, policies.use_builtin_policies(), resource),
            )
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    Error::Cancelled
                } else {
                    Error::Evaluation {
                        object: resource.object_ref(),
                        source: e,
                    }
                }
            })?;

        let checks: Vec<Check> = results.into_iter().map(RuleResult::into_check).collect();
        Ok(self.report_data(ReportDomain::for_kind(kind), checks))
    }

    fn report_data(&self, domain: ReportDomain, checks: Vec<Check>) -> ReportData {
        let update_timestamp = Utc::now();
        let scanner = self.build_info.scanner();
        let summary = Summary::from_checks(&checks);
        match domain {
            ReportDomain::ConfigAudit => ReportData::ConfigAudit(ConfigAuditReportData {
                update_timestamp,
                scanner,
                summary,
                checks,
            }),
            ReportDomain::RbacAssessment => ReportData::RbacAssessment(RbacAssessmentReportData {
                update_timestamp,
                scanner,
                summary,
                checks,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{Kind, ObjectRef};

    struct Fixed(Vec<RuleResult>);

    #[async_trait]
    impl RuleEngine for Fixed {
        async fn evaluate(
            &self,
            _modules: &BTreeMap<String, String>,
            _use_builtin_policies: bool,
            _resource: &Resource,
        ) -> warden_core::Result<Vec<RuleResult>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl RuleEngine for Broken {
        async fn evaluate(
            &self,
            _modules: &BTreeMap<String, String>,
            _use_builtin_policies: bool,
            _resource: &Resource,
        ) -> warden_core::Result<Vec<RuleResult>> {
            Err(warden_core::Error::Internal {
                message: "compile error in policy.a.rego".into(),
            })
        }
    }

    fn rule(id: &str, severity: Severity, status: RuleStatus) -> RuleResult {
        RuleResult {
            id: id.into(),
            title: id.into(),
            description: String::new(),
            severity,
            status,
            messages: vec![format!("{id} message")],
        }
    }

    fn policies() -> Policies {
        Policies::new(
            [
                ("policy.a.rego".to_string(), "package a".to_string()),
                ("policy.a.kinds".to_string(), "*".to_string()),
            ]
            .into_iter()
            .collect(),
            false,
        )
    }

    #[tokio::test]
    async fn maps_results_to_domain_variant() -> Result<()> {
        let engine = Fixed(vec![
            rule("KSV001", Severity::High, RuleStatus::Failed),
            rule("KSV002", Severity::Low, RuleStatus::Passed),
            rule("KSV003", Severity::Critical, RuleStatus::Exception),
        ]);
        let build = BuildInfo::default();
        let evaluator = Evaluator::new(&engine, &build);
        let cancel = CancelToken::never();

        let pod = Resource::new(
            &ObjectRef::namespaced(Kind::Pod, "default", "web"),
            serde_json::Value::Null,
        );
        let data = evaluator.evaluate(&policies(), &pod, &cancel).await?;
        assert_eq!(data.domain(), ReportDomain::ConfigAudit);
        assert_eq!(
            data.checks().iter().map(|c| c.success).collect::<Vec<_>>(),
            vec![false, true, false]
        );
        assert_eq!(data.summary().high_count, 1);
        assert_eq!(data.summary().critical_count, 1);
        assert_eq!(data.summary().low_count, 0);
        assert!(data.checks().iter().all(|c| c.category == CHECK_CATEGORY));

        let role = Resource::new(
            &ObjectRef::cluster(Kind::ClusterRole, "admin"),
            serde_json::Value::Null,
        );
        let data = evaluator.evaluate(&policies(), &role, &cancel).await?;
        assert!(matches!(data, ReportData::RbacAssessment(_)));
        Ok(())
    }

    #[test]
    fn exception_is_not_success_and_is_summarized() {
        let check = rule("KSV017", Severity::Critical, RuleStatus::Exception).into_check();
        assert!(!check.success);

        let summary = Summary::from_checks(std::slice::from_ref(&check));
        assert_eq!(summary.critical_count, 1);
    }

    #[tokio::test]
    async fn no_policies_is_distinguished() {
        let engine = Fixed(Vec::new());
        let build = BuildInfo::default();
        let evaluator = Evaluator::new(&engine, &build);
        let pod = Resource::new(
            &ObjectRef::namespaced(Kind::Pod, "default", "web"),
            serde_json::Value::Null,
        );
        let out = evaluator
            .evaluate(&Policies::empty(false), &pod, &CancelToken::never())
            .await;
        assert!(matches!(out, Err(Error::NoPoliciesApplicable { kind: Kind::Pod })));
    }

    #[tokio::test]
    async fn engine_failure_is_evaluation_error() {
        let build = BuildInfo::default();
        let evaluator = Evaluator::new(&Broken, &build);
        let pod = Resource::new(
            &ObjectRef::namespaced(Kind::Pod, "default", "web"),
            serde_json::Value::Null,
        );
        let out = evaluator
            .evaluate(&policies(), &pod, &CancelToken::never())
            .await;
        match out {
            Err(Error::Evaluation { source, .. }) => {
                assert!(source.to_string().contains("policy.a.rego"));
            }
            other => panic!("expected evaluation error, got {other:?}"),
        }
    }
}
