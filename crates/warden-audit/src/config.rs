//! Engine configuration.
//!
//! [`AuditConfig`] carries every option the reconcile logic consumes. It is
//! injected into [`crate::controller::ResourceController`] once at startup.
//! [`AuditConfig::from_env`] reads `WARDEN_*` variables with strict
//! validation; unset variables fall back to the defaults below.

use std::time::Duration;

use crate::error::{Error, Result};

const ENV_OPERATOR_NAMESPACE: &str = "WARDEN_OPERATOR_NAMESPACE";
const ENV_TARGET_NAMESPACES: &str = "WARDEN_TARGET_NAMESPACES";
const ENV_EXCLUDE_NAMESPACES: &str = "WARDEN_EXCLUDE_NAMESPACES";
const ENV_POLICIES_CONFIG_NAME: &str = "WARDEN_POLICIES_CONFIG_NAME";
const ENV_BATCH_DELETE_LIMIT: &str = "WARDEN_BATCH_DELETE_LIMIT";
const ENV_BATCH_DELETE_DELAY_SECS: &str = "WARDEN_BATCH_DELETE_DELAY_SECS";
const ENV_SCAN_ONLY_CURRENT_REVISIONS: &str = "WARDEN_SCAN_ONLY_CURRENT_REVISIONS";
const ENV_RBAC_ASSESSMENT_ENABLED: &str = "WARDEN_RBAC_ASSESSMENT_ENABLED";
const ENV_SCAN_RETRY_AFTER_SECS: &str = "WARDEN_SCAN_RETRY_AFTER_SECS";
const ENV_USE_BUILTIN_POLICIES: &str = "WARDEN_USE_BUILTIN_POLICIES";

/// Default name of the policy config object.
pub const DEFAULT_POLICIES_CONFIG_NAME: &str = "warden-policies-config";
const DEFAULT_OPERATOR_NAMESPACE: &str = "warden-system";
const DEFAULT_BATCH_DELETE_LIMIT: u64 = 10;
const DEFAULT_BATCH_DELETE_DELAY_SECS: u64 = 10;
const DEFAULT_SCAN_RETRY_AFTER_SECS: u64 = 30;

/// Which namespaces the engine is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    /// Only the operator's own namespace.
    OwnNamespace,
    /// One namespace other than the operator's.
    SingleNamespace,
    /// An explicit list of namespaces.
    MultiNamespace,
    /// Every namespace, minus exclusions.
    AllNamespaces,
}

/// Configuration consumed by the reconcile logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    /// Namespace the operator runs in; holds the policy config object.
    pub operator_namespace: String,
    /// Comma-separated namespaces to watch. Empty means all namespaces.
    pub target_namespaces: String,
    /// Comma-separated namespace globs to skip in all-namespaces mode. `*`
    /// matches any run of characters, e.g. `kube-*` or `*-test`.
    pub exclude_namespaces: String,
    /// Name of the policy config object.
    pub policies_config_name: String,
    /// Maximum report deletions per collection per collector pass.
    pub batch_delete_limit: usize,
    /// Delay before re-invoking a collector pass that left work pending.
    pub batch_delete_delay: Duration,
    /// Skip ReplicaSets that are not the active revision of their Deployment.
    pub scan_only_current_revisions: bool,
    /// Evaluate RBAC kinds and maintain the RBAC report collections.
    pub rbac_assessment_enabled: bool,
    /// Delay before re-checking applicability of an object with no policies.
    pub scan_retry_after: Duration,
    /// Treat every kind as covered by built-in policies, even with an empty bundle.
    pub use_builtin_policies: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            operator_namespace: DEFAULT_OPERATOR_NAMESPACE.to_string(),
            target_namespaces: String::new(),
            exclude_namespaces: String::new(),
            policies_config_name: DEFAULT_POLICIES_CONFIG_NAME.to_string(),
            batch_delete_limit: 10,
            batch_delete_delay: Duration::from_secs(DEFAULT_BATCH_DELETE_DELAY_SECS),
            scan_only_current_revisions: true,
            rbac_assessment_enabled: true,
            scan_retry_after: Duration::from_secs(DEFAULT_SCAN_RETRY_AFTER_SECS),
            use_builtin_policies: false,
        }
    }
}

impl AuditConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value is malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads configuration with a custom environment source.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value is malformed: non-positive
    /// integers, non-boolean flags or an empty operator namespace.
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let string = |key: &str, default: String| get_env(key).unwrap_or(default);

        let batch_delete_limit =
            parse_positive_u64_env(&get_env, ENV_BATCH_DELETE_LIMIT, DEFAULT_BATCH_DELETE_LIMIT)?;
        let batch_delete_limit = usize::try_from(batch_delete_limit).map_err(|_| {
            Error::configuration(format!(
                "{ENV_BATCH_DELETE_LIMIT} value {batch_delete_limit} exceeds supported range"
            ))
        })?;

        let config = Self {
            operator_namespace: string(ENV_OPERATOR_NAMESPACE, defaults.operator_namespace),
            target_namespaces: string(ENV_TARGET_NAMESPACES, defaults.target_namespaces),
            exclude_namespaces: string(ENV_EXCLUDE_NAMESPACES, defaults.exclude_namespaces),
            policies_config_name: string(ENV_POLICIES_CONFIG_NAME, defaults.policies_config_name),
            batch_delete_limit,
            batch_delete_delay: Duration::from_secs(parse_positive_u64_env(
                &get_env,
                ENV_BATCH_DELETE_DELAY_SECS,
                DEFAULT_BATCH_DELETE_DELAY_SECS,
            )?),
            scan_only_current_revisions: parse_bool_env(
                &get_env,
                ENV_SCAN_ONLY_CURRENT_REVISIONS,
                defaults.scan_only_current_revisions,
            )?,
            rbac_assessment_enabled: parse_bool_env(
                &get_env,
                ENV_RBAC_ASSESSMENT_ENABLED,
                defaults.rbac_assessment_enabled,
            )?,
            scan_retry_after: Duration::from_secs(parse_positive_u64_env(
                &get_env,
                ENV_SCAN_RETRY_AFTER_SECS,
                DEFAULT_SCAN_RETRY_AFTER_SECS,
            )?),
            use_builtin_policies: parse_bool_env(
                &get_env,
                ENV_USE_BUILTIN_POLICIES,
                defaults.use_builtin_policies,
            )?,
        };
        config.resolve_install_mode()?;
        Ok(config)
    }

    /// Returns the parsed target namespace list.
    #[must_use]
    pub fn target_namespaces(&self) -> Vec<String> {
        split_list(&self.target_namespaces)
    }

    /// Returns the parsed exclusion pattern list.
    #[must_use]
    pub fn exclude_namespaces(&self) -> Vec<String> {
        split_list(&self.exclude_namespaces)
    }

    /// Resolves the install mode from the operator and target namespaces.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the operator namespace is empty.
    pub fn resolve_install_mode(&self) -> Result<(InstallMode, String, Vec<String>)> {
        let operator_namespace = self.operator_namespace.trim();
        if operator_namespace.is_empty() {
            return Err(Error::configuration(format!(
                "{ENV_OPERATOR_NAMESPACE} must not be blank"
            )));
        }
        let targets = self.target_namespaces();
        let mode = match targets.as_slice() {
            [] => InstallMode::AllNamespaces,
            [only] if only == operator_namespace => InstallMode::OwnNamespace,
            [_] => InstallMode::SingleNamespace,
            _ => InstallMode::MultiNamespace,
        };
        Ok((mode, operator_namespace.to_string(), targets))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_positive_u64_env<F>(get_env: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get_env(key) else {
        return Ok(default);
    };

    let parsed = raw.trim().parse::<u64>().map_err(|_| {
        Error::configuration(format!("{key} must be a positive integer, got '{raw}'"))
    })?;
    if parsed == 0 {
        return Err(Error::configuration(format!(
            "{key} must be greater than zero"
        )));
    }
    Ok(parsed)
}

fn parse_bool_env<F>(get_env: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get_env(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::configuration(format!(
            "{key} must be a boolean, got '{raw}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<AuditConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AuditConfig::from_env_with(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let config = from_pairs(&[]).expect("default config");
        assert_eq!(config, AuditConfig::default());
        assert_eq!(config.batch_delete_limit, 10);
        assert_eq!(config.scan_retry_after, Duration::from_secs(30));
    }

    #[test]
    fn parses_overrides() {
        let config = from_pairs(&[
            (ENV_BATCH_DELETE_LIMIT, "25"),
            (ENV_BATCH_DELETE_DELAY_SECS, "3"),
            (ENV_RBAC_ASSESSMENT_ENABLED, "false"),
            (ENV_TARGET_NAMESPACES, "team-a, team-b"),
        ])
        .expect("overridden config");
        assert_eq!(config.batch_delete_limit, 25);
        assert_eq!(config.batch_delete_delay, Duration::from_secs(3));
        assert!(!config.rbac_assessment_enabled);
        assert_eq!(config.target_namespaces(), vec!["team-a", "team-b"]);
    }

    #[test]
    fn rejects_zero_and_garbage() {
        assert!(from_pairs(&[(ENV_BATCH_DELETE_LIMIT, "0")]).is_err());
        assert!(from_pairs(&[(ENV_SCAN_RETRY_AFTER_SECS, "soon")]).is_err());
        assert!(from_pairs(&[(ENV_USE_BUILTIN_POLICIES, "maybe")]).is_err());
        assert!(from_pairs(&[(ENV_OPERATOR_NAMESPACE, " ")]).is_err());
    }

    #[test]
    fn install_mode_resolution() {
        let mode = |targets: &str| {
            AuditConfig {
                operator_namespace: "warden-system".into(),
                target_namespaces: targets.into(),
                ..AuditConfig::default()
            }
            .resolve_install_mode()
            .map(|(mode, _, _)| mode)
            .ok()
        };
        assert_eq!(mode(""), Some(InstallMode::AllNamespaces));
        assert_eq!(mode("warden-system"), Some(InstallMode::OwnNamespace));
        assert_eq!(mode("apps"), Some(InstallMode::SingleNamespace));
        assert_eq!(mode("apps,web"), Some(InstallMode::MultiNamespace));
    }
}
