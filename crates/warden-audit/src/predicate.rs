//! Event admission predicates.
//!
//! Each check is a pure function over a [`Resource`], wrapped in a
//! [`Predicate`] value so routes can compose them with [`Predicate::not`] and
//! [`Predicate::all`]. A route reconciles an event only if its composed
//! predicate holds.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use warden_core::Resource;
use warden_core::labels::{LEADER_ELECTION_ANNOTATION, MANAGED_BY, MANAGED_BY_WARDEN};

use crate::config::{AuditConfig, InstallMode};
use crate::error::{Error, Result};

type Check = dyn Fn(&Resource) -> bool + Send + Sync;

/// A named, composable boolean filter over watched objects.
#[derive(Clone)]
pub struct Predicate {
    name: String,
    check: Arc<Check>,
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate").field("name", &self.name).finish()
    }
}

impl Predicate {
    /// Wraps a check function.
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Resource) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// A predicate that admits everything.
    #[must_use]
    pub fn always() -> Self {
        Self::new("always", |_| true)
    }

    /// Returns the predicate's name, e.g. `not(managed_by_warden)`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluates the predicate.
    #[must_use]
    pub fn evaluate(&self, resource: &Resource) -> bool {
        (self.check)(resource)
    }

    /// Logical negation.
    #[must_use]
    pub fn not(self) -> Self {
        let name = format!("not({})", self.name);
        Self::new(name, move |r| !self.evaluate(r))
    }

    /// Logical conjunction of all `predicates`. Empty input admits everything.
    #[must_use]
    pub fn all(predicates: Vec<Self>) -> Self {
        let name = format!(
            "all({})",
            predicates
                .iter()
                .map(Self::name)
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self::new(name, move |r| predicates.iter().all(|p| p.evaluate(r)))
    }

    /// Returns the name of the first predicate in `predicates` rejecting `resource`.
    #[must_use]
    pub fn first_rejection<'a>(predicates: &'a [Self], resource: &Resource) -> Option<&'a str> {
        predicates
            .iter()
            .find(|p| !p.evaluate(resource))
            .map(Self::name)
    }
}

/// True for objects carrying this system's management marker.
#[must_use]
pub fn is_managed_by_warden(resource: &Resource) -> bool {
    resource.label(MANAGED_BY) == Some(MANAGED_BY_WARDEN)
}

/// True for leader-election bookkeeping objects.
#[must_use]
pub fn is_leader_election_resource(resource: &Resource) -> bool {
    resource.annotation(LEADER_ELECTION_ANNOTATION).is_some()
}

/// True for objects whose deletion has been requested.
#[must_use]
pub fn is_being_terminated(resource: &Resource) -> bool {
    resource.is_being_deleted()
}

/// [`is_managed_by_warden`] as a predicate.
#[must_use]
pub fn managed_by_warden() -> Predicate {
    Predicate::new("managed_by_warden", is_managed_by_warden)
}

/// [`is_leader_election_resource`] as a predicate.
#[must_use]
pub fn leader_election_resource() -> Predicate {
    Predicate::new("leader_election_resource", is_leader_election_resource)
}

/// [`is_being_terminated`] as a predicate.
#[must_use]
pub fn being_terminated() -> Predicate {
    Predicate::new("being_terminated", is_being_terminated)
}

/// Admits objects with exactly this name.
#[must_use]
pub fn has_name(name: impl Into<String>) -> Predicate {
    let name = name.into();
    Predicate::new(format!("has_name({name})"), move |r| r.metadata.name == name)
}

/// Admits objects in exactly this namespace.
#[must_use]
pub fn in_namespace(namespace: impl Into<String>) -> Predicate {
    let namespace = namespace.into();
    Predicate::new(format!("in_namespace({namespace})"), move |r| {
        r.metadata.namespace.as_deref() == Some(namespace.as_str())
    })
}

/// Admits objects in namespaces the configured install mode covers.
///
/// # Errors
///
/// Returns a configuration error if the install mode cannot be resolved.
pub fn install_mode(config: &AuditConfig) -> Result<Predicate> {
    let (mode, operator_namespace, targets) = config.resolve_install_mode()?;
    let excluded = config.exclude_namespaces();

    let predicate = match mode {
        InstallMode::AllNamespaces if excluded.is_empty() => Predicate::always(),
        InstallMode::AllNamespaces => {
            let excluded = exclusion_matcher(&excluded)?;
            Predicate::new("install_mode(all_namespaces)", move |r| {
                let namespace = r.metadata.namespace.as_deref().unwrap_or_default();
                !excluded.is_match(namespace)
            })
        }
        InstallMode::OwnNamespace => Predicate::new("install_mode(own_namespace)", move |r| {
            r.metadata.namespace.as_deref() == Some(operator_namespace.as_str())
        }),
        InstallMode::SingleNamespace | InstallMode::MultiNamespace => {
            Predicate::new("install_mode(target_namespaces)", move |r| {
                r.metadata
                    .namespace
                    .as_deref()
                    .is_some_and(|ns| targets.iter().any(|t| t == ns))
            })
        }
    };
    Ok(predicate)
}

/// Compiles exclusion globs into one anchored regex. `*` matches any run of
/// characters; everything else is literal.
fn exclusion_matcher(patterns: &[String]) -> Result<Regex> {
    let alternatives: Vec<String> = patterns
        .iter()
        .map(|p| regex::escape(p).replace(r"\*", ".*"))
        .collect();
    let source = format!("^(?:{})$", alternatives.join("|"));
    Regex::new(&source)
        .map_err(|e| Error::configuration(format!("invalid namespace exclusion pattern: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use warden_core::{Kind, ObjectRef};

    fn object(namespace: &str, name: &str) -> Resource {
        Resource::new(
            &ObjectRef::namespaced(Kind::ConfigMap, namespace, name),
            serde_json::Value::Null,
        )
    }

    #[test]
    fn base_checks() {
        let mut r = object("default", "cfg");
        assert!(!is_managed_by_warden(&r));
        assert!(!is_leader_election_resource(&r));
        assert!(!is_being_terminated(&r));

        r.metadata
            .labels
            .insert(MANAGED_BY.into(), MANAGED_BY_WARDEN.into());
        r.metadata
            .annotations
            .insert(LEADER_ELECTION_ANNOTATION.into(), "{}".into());
        r.metadata.deletion_timestamp = Some(Utc::now());
        assert!(is_managed_by_warden(&r));
        assert!(is_leader_election_resource(&r));
        assert!(is_being_terminated(&r));
    }

    #[test]
    fn combinators_compose() {
        let r = object("default", "cfg");
        let chain = Predicate::all(vec![
            managed_by_warden().not(),
            being_terminated().not(),
            has_name("cfg"),
            in_namespace("default"),
        ]);
        assert!(chain.evaluate(&r));
        assert!(!has_name("other").evaluate(&r));
        assert!(!in_namespace("kube-system").evaluate(&r));
        assert!(Predicate::all(Vec::new()).evaluate(&r));
        assert_eq!(managed_by_warden().not().name(), "not(managed_by_warden)");
    }

    #[test]
    fn first_rejection_names_the_failing_check() {
        let r = object("default", "cfg");
        let chain = vec![being_terminated().not(), has_name("policies")];
        assert_eq!(Predicate::first_rejection(&chain, &r), Some("has_name(policies)"));
    }

    #[test]
    fn install_mode_filters_namespaces() {
        let all = AuditConfig {
            exclude_namespaces: "kube-*,istio-system".into(),
            ..AuditConfig::default()
        };
        let p = install_mode(&all).expect("predicate");
        assert!(p.evaluate(&object("apps", "x")));
        assert!(!p.evaluate(&object("kube-public", "x")));
        assert!(!p.evaluate(&object("istio-system", "x")));
        assert!(p.evaluate(&object("istio-system-2", "x")));

        let own = AuditConfig {
            operator_namespace: "warden-system".into(),
            target_namespaces: "warden-system".into(),
            ..AuditConfig::default()
        };
        let p = install_mode(&own).expect("predicate");
        assert!(p.evaluate(&object("warden-system", "x")));
        assert!(!p.evaluate(&object("apps", "x")));

        let multi = AuditConfig {
            target_namespaces: "apps,web".into(),
            ..AuditConfig::default()
        };
        let p = install_mode(&multi).expect("predicate");
        assert!(p.evaluate(&object("web", "x")));
        assert!(!p.evaluate(&object("db", "x")));
    }

    #[test]
    fn exclusion_wildcards_match_anywhere_in_the_name() {
        let config = AuditConfig {
            exclude_namespaces: "kube-*-system, *-test,team.a".into(),
            ..AuditConfig::default()
        };
        let p = install_mode(&config).expect("predicate");

        assert!(!p.evaluate(&object("kube-node-system", "x")));
        assert!(p.evaluate(&object("kube-public", "x")));
        assert!(!p.evaluate(&object("payments-test", "x")));
        assert!(p.evaluate(&object("test-payments", "x")));
        assert!(!p.evaluate(&object("team.a", "x")));
        assert!(p.evaluate(&object("teamxa", "x")), "dots are literal");
    }
}
