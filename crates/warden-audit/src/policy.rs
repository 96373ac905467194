//! Policy bundle loading, applicability and hashing.
//!
//! The bundle is the data of a single config object:
//!
//! ```text
//! policy.<name>.rego    rule module body
//! policy.<name>.kinds   comma-separated kinds; `*` for any, `Workload` for workload kinds
//! library.<name>.rego   shared module, loaded with every policy
//! ```
//!
//! [`Policies::hash`] covers the libraries plus the policies applicable to
//! one kind, so editing a policy for `Pod` leaves `Service` reports fresh.

use std::collections::BTreeMap;

use tracing::debug;

use warden_core::hash::compute_hash;
use warden_core::{CancelToken, Kind, Resource};

use crate::error::{Error, Result};
use crate::store::PolicyConfigSource;

const POLICY_PREFIX: &str = "policy.";
const LIBRARY_PREFIX: &str = "library.";
const REGO_SUFFIX: &str = ".rego";
const KINDS_SUFFIX: &str = ".kinds";
const ANY_KIND: &str = "*";
const WORKLOAD_KINDS: &str = "Workload";

/// A loaded policy bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policies {
    data: BTreeMap<String, String>,
    use_builtin_policies: bool,
}

impl Policies {
    /// Wraps config data.
    #[must_use]
    pub fn new(data: BTreeMap<String, String>, use_builtin_policies: bool) -> Self {
        Self {
            data,
            use_builtin_policies,
        }
    }

    /// An empty bundle.
    #[must_use]
    pub fn empty(use_builtin_policies: bool) -> Self {
        Self::new(BTreeMap::new(), use_builtin_policies)
    }

    /// True if the rule engine also runs its built-in policies.
    #[must_use]
    pub const fn use_builtin_policies(&self) -> bool {
        self.use_builtin_policies
    }

    /// Returns the shared library modules, keyed by config key.
    #[must_use]
    pub fn libraries(&self) -> BTreeMap<String, String> {
        self.data
            .iter()
            .filter(|(k, _)| k.starts_with(LIBRARY_PREFIX) && k.ends_with(REGO_SUFFIX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Returns the policy modules applicable to `kind`, keyed by config key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PolicyConfig`] if a `.rego` entry has no `.kinds`
    /// entry or the reverse.
    pub fn policies_by_kind(&self, kind: Kind) -> Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        for (key, body) in &self.data {
            let Some(policy) = key
                .strip_prefix(POLICY_PREFIX)
                .and_then(|k| k.strip_suffix(REGO_SUFFIX))
            else {
                continue;
            };
            let kinds_key = format!("{POLICY_PREFIX}{policy}{KINDS_SUFFIX}");
            let kinds = self.data.get(&kinds_key).ok_or_else(|| Error::PolicyConfig {
                message: format!("kinds not defined for policy: {key}"),
            })?;
            if kinds_match(kinds, kind) {
                out.insert(key.clone(), body.clone());
            }
        }

        for key in self.data.keys() {
            let Some(policy) = key
                .strip_prefix(POLICY_PREFIX)
                .and_then(|k| k.strip_suffix(KINDS_SUFFIX))
            else {
                continue;
            };
            let rego_key = format!("{POLICY_PREFIX}{policy}{REGO_SUFFIX}");
            if !self.data.contains_key(&rego_key) {
                return Err(Error::PolicyConfig {
                    message: format!("expected policy not found: {rego_key}"),
                });
            }
        }
        Ok(out)
    }

    /// Returns the libraries plus the policies applicable to `kind`.
    ///
    /// # Errors
    ///
    /// See [`Policies::policies_by_kind`].
    pub fn modules_for_kind(&self, kind: Kind) -> Result<BTreeMap<String, String>> {
        let mut modules = self.libraries();
        modules.extend(self.policies_by_kind(kind)?);
        Ok(modules)
    }

    /// Hash of the modules applicable to `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PolicyConfig`] for a malformed bundle, or
    /// [`Error::Computation`] if hashing fails.
    pub fn hash(&self, kind: Kind) -> Result<String> {
        let modules = self.modules_for_kind(kind)?;
        compute_hash(&modules).map_err(|e| Error::computation("policy config hash", e))
    }

    /// Returns whether any policy applies to `resource`, with the reason when none does.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PolicyConfig`] for a malformed bundle.
    pub fn applicable(&self, resource: &Resource, rbac_enabled: bool) -> Result<(bool, String)> {
        let kind = resource.kind;
        if kind.is_rbac() && !rbac_enabled {
            return Ok((false, format!("rbac assessment disabled for kind {kind}")));
        }
        if self.use_builtin_policies {
            return Ok((true, String::new()));
        }
        if self.policies_by_kind(kind)?.is_empty() {
            return Ok((false, format!("no policies found for kind {kind}")));
        }
        Ok((true, String::new()))
    }
}

fn kinds_match(kinds: &str, kind: Kind) -> bool {
    kinds.split(',').map(str::trim).any(|k| match k {
        ANY_KIND => true,
        WORKLOAD_KINDS => kind.is_workload(),
        other => other == kind.as_str(),
    })
}

/// Loads the policy bundle from its config object.
pub struct PolicyLoader<'a> {
    source: &'a dyn PolicyConfigSource,
    namespace: &'a str,
    name: &'a str,
    use_builtin_policies: bool,
}

impl<'a> PolicyLoader<'a> {
    /// Creates a loader for the config object `namespace/name`.
    #[must_use]
    pub fn new(
        source: &'a dyn PolicyConfigSource,
        namespace: &'a str,
        name: &'a str,
        use_builtin_policies: bool,
    ) -> Self {
        Self {
            source,
            namespace,
            name,
            use_builtin_policies,
        }
    }

    /// Fetches and wraps the bundle. A missing config object yields an empty bundle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PolicyLoad`] if the fetch fails for a reason other
    /// than absence, or [`Error::Cancelled`].
    pub async fn load(&self, cancel: &CancelToken) -> Result<Policies> {
        match cancel
            .run(self.source.get_config(self.namespace, self.name))
            .await
        {
            Ok(data) => Ok(Policies::new(data, self.use_builtin_policies)),
            Err(e) if e.is_not_found() => {
                debug!(
                    namespace = self.namespace,
                    name = self.name,
                    "policy config not found, using empty policy set"
                );
                Ok(Policies::empty(self.use_builtin_policies))
            }
            Err(e) if e.is_cancelled() => Err(Error::Cancelled),
            Err(source) => Err(Error::PolicyLoad {
                namespace: self.namespace.to_string(),
                name: self.name.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::ObjectRef;

    fn bundle(pairs: &[(&str, &str)]) -> Policies {
        Policies::new(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            false,
        )
    }

    fn object(kind: Kind) -> Resource {
        let r = if kind.is_cluster_scoped() {
            ObjectRef::cluster(kind, "x")
        } else {
            ObjectRef::namespaced(kind, "default", "x")
        };
        Resource::new(&r, serde_json::Value::Null)
    }

    #[test]
    fn kinds_selectors() -> Result<()> {
        let p = bundle(&[
            ("policy.privileged.rego", "deny[msg] { true }"),
            ("policy.privileged.kinds", "Workload"),
            ("policy.any.rego", "deny[msg] { false }"),
            ("policy.any.kinds", "*"),
            ("policy.svc.rego", "deny[msg] { input.spec.type == \"NodePort\" }"),
            ("policy.svc.kinds", "Service, Ingress"),
            ("library.kubernetes.rego", "package lib.kubernetes"),
        ]);
        assert_eq!(p.policies_by_kind(Kind::Pod)?.len(), 2);
        assert_eq!(p.policies_by_kind(Kind::Service)?.len(), 2);
        assert_eq!(p.policies_by_kind(Kind::ConfigMap)?.len(), 1);
        assert_eq!(p.modules_for_kind(Kind::ConfigMap)?.len(), 2);
        Ok(())
    }

    #[test]
    fn unpaired_entries_are_rejected() {
        let no_kinds = bundle(&[("policy.a.rego", "x")]);
        assert!(matches!(
            no_kinds.policies_by_kind(Kind::Pod),
            Err(Error::PolicyConfig { .. })
        ));
        let no_rego = bundle(&[("policy.a.kinds", "Pod")]);
        assert!(matches!(
            no_rego.policies_by_kind(Kind::Pod),
            Err(Error::PolicyConfig { .. })
        ));
    }

    #[test]
    fn hash_tracks_only_applicable_policies() -> Result<()> {
        let before = bundle(&[
            ("policy.pod.rego", "v1"),
            ("policy.pod.kinds", "Pod"),
            ("policy.svc.rego", "v1"),
            ("policy.svc.kinds", "Service"),
        ]);
        let after = bundle(&[
            ("policy.pod.rego", "v2"),
            ("policy.pod.kinds", "Pod"),
            ("policy.svc.rego", "v1"),
            ("policy.svc.kinds", "Service"),
        ]);
        assert_ne!(before.hash(Kind::Pod)?, after.hash(Kind::Pod)?);
        assert_eq!(before.hash(Kind::Service)?, after.hash(Kind::Service)?);
        assert_eq!(before.hash(Kind::Pod)?, before.hash(Kind::Pod)?);
        Ok(())
    }

    #[test]
    fn applicability() -> Result<()> {
        let empty = Policies::empty(false);
        let (ok, reason) = empty.applicable(&object(Kind::Service), true)?;
        assert!(!ok);
        assert_eq!(reason, "no policies found for kind Service");

        let builtin = Policies::empty(true);
        assert!(builtin.applicable(&object(Kind::Service), true)?.0);
        assert!(!builtin.applicable(&object(Kind::ClusterRole), false)?.0);

        let rbac = bundle(&[("policy.r.rego", "x"), ("policy.r.kinds", "Role")]);
        assert!(rbac.applicable(&object(Kind::Role), true)?.0);
        assert!(!rbac.applicable(&object(Kind::Role), false)?.0);
        Ok(())
    }
}
