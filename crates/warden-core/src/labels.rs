//! Label keys and equality-based label selectors.
//!
//! Reports are found and collected purely through labels. A [`LabelSelector`]
//! is a conjunction of `key=value` / `key!=value` requirements with the usual
//! cluster semantics: `key!=value` also matches objects that lack `key`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::hash::compute_str_hash;

/// Hash of the spec of the object a report was produced for.
pub const RESOURCE_SPEC_HASH: &str = "resource-spec-hash";
/// Hash of the policy modules a report was produced with.
pub const PLUGIN_CONFIG_HASH: &str = "plugin-config-hash";
/// Kind of the report owner.
pub const RESOURCE_KIND: &str = "warden.resource.kind";
/// Name of the report owner.
pub const RESOURCE_NAME: &str = "warden.resource.name";
/// Namespace of the report owner.
pub const RESOURCE_NAMESPACE: &str = "warden.resource.namespace";
/// Standard management marker.
pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
/// Value of [`MANAGED_BY`] on everything this system creates.
pub const MANAGED_BY_WARDEN: &str = "warden";
/// Annotation present on leader-election bookkeeping objects.
pub const LEADER_ELECTION_ANNOTATION: &str = "control-plane.alpha.kubernetes.io/leader";
/// Annotation holding the rollout revision of a Deployment and its ReplicaSets.
pub const DEPLOYMENT_REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";

const MAX_LABEL_VALUE_LEN: usize = 63;

/// Returns true if `value` is a syntactically valid label value.
///
/// Valid values are empty, or at most 63 characters of `[A-Za-z0-9._-]`
/// beginning and ending with an alphanumeric character.
#[must_use]
pub fn is_valid_label_value(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    let bytes = value.as_bytes();
    value.len() <= MAX_LABEL_VALUE_LEN
        && bytes.first().is_some_and(u8::is_ascii_alphanumeric)
        && bytes.last().is_some_and(u8::is_ascii_alphanumeric)
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// Returns `value` if it is a valid label value, otherwise its short hash.
#[must_use]
pub fn label_value_for(value: &str) -> String {
    if is_valid_label_value(value) {
        value.to_string()
    } else {
        compute_str_hash(value)
    }
}

/// Comparison operator of a selector requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `key=value`; the label must be present with this value.
    Equals,
    /// `key!=value`; the label must be absent or carry another value.
    NotEquals,
}

/// A single selector requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Label key.
    pub key: String,
    /// Operator.
    pub operator: Operator,
    /// Label value.
    pub value: String,
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let actual = labels.get(&self.key).map(String::as_str);
        match self.operator {
            Operator::Equals => actual == Some(self.value.as_str()),
            Operator::NotEquals => actual != Some(self.value.as_str()),
        }
    }
}

/// Conjunction of label requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Creates an empty selector (matches everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `key=value` requirement.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the key or value is malformed.
    pub fn equal(self, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        self.push(key.into(), Operator::Equals, value.into())
    }

    /// Adds a `key!=value` requirement.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the key or value is malformed.
    pub fn not_equal(self, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        self.push(key.into(), Operator::NotEquals, value.into())
    }

    /// Builds a selector matching every `(key, value)` pair exactly.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if any key or value is malformed.
    pub fn from_equalities<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        pairs
            .into_iter()
            .try_fold(Self::new(), |selector, (k, v)| selector.equal(k, v))
    }

    fn push(mut self, key: String, operator: Operator, value: String) -> Result<Self> {
        if key.is_empty() || key.contains([',', '=', '!', ' ']) {
            return Err(Error::InvalidInput(format!("invalid label key: {key:?}")));
        }
        if !is_valid_label_value(&value) {
            return Err(Error::InvalidInput(format!(
                "invalid label value for {key}: {value:?}"
            )));
        }
        self.requirements.push(Requirement {
            key,
            operator,
            value,
        });
        Ok(self)
    }

    /// Returns the requirements of this selector.
    #[must_use]
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Returns true if `labels` satisfy every requirement.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            let op = match r.operator {
                Operator::Equals => "=",
                Operator::NotEquals => "!=",
            };
            write!(f, "{}{op}{}", r.key, r.value)?;
        }
        Ok(())
    }
}

impl FromStr for LabelSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .try_fold(Self::new(), |selector, part| {
                if let Some((k, v)) = part.split_once("!=") {
                    selector.not_equal(k.trim(), v.trim())
                } else if let Some((k, v)) = part.split_once("==").or_else(|| part.split_once('='))
                {
                    selector.equal(k.trim(), v.trim())
                } else {
                    Err(Error::InvalidInput(format!(
                        "unsupported selector requirement: {part}"
                    )))
                }
            })
    }
}
