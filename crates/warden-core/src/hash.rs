//! Content hashes used as cache-invalidation keys.
//!
//! Both hashes written onto reports come from here:
//!
//! - **resource spec hash**: [`compute_spec_hash`] over the spec-relevant
//!   projection of a watched object
//! - **policy config hash**: [`compute_hash`] over the policy modules applicable
//!   to a kind
//!
//! Hashes are label values, so they are kept short: the first
//! [`HASH_BYTES`] bytes of a SHA-256 digest over canonical JSON, hex encoded.
//! They are not cryptographic guarantees.

use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::canonical_json::{CanonicalJsonError, to_canonical_bytes};
use crate::object::{Kind, Resource};

/// Digest bytes kept in a hash label (20 hex chars).
pub const HASH_BYTES: usize = 10;

/// Computes the short content hash of any serializable value.
///
/// # Errors
///
/// Returns an error if the value cannot be rendered as canonical JSON.
pub fn compute_hash<T: Serialize>(value: &T) -> Result<String, CanonicalJsonError> {
    let bytes = to_canonical_bytes(value)?;
    let digest = Sha256::digest(&bytes);
    Ok(hex::encode(digest.get(..HASH_BYTES).unwrap_or(&digest)))
}

/// Computes the short hash of a plain string, hashing its UTF-8 bytes directly.
#[must_use]
pub fn compute_str_hash(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(digest.get(..HASH_BYTES).unwrap_or(&digest))
}

/// Computes the hash of the mutable specification of `resource`.
///
/// Metadata (labels, annotations, resource versions, status) is excluded, so
/// no-op writes keep the hash stable.
///
/// # Errors
///
/// Returns an error if the projected spec cannot be rendered as canonical JSON.
pub fn compute_spec_hash(resource: &Resource) -> Result<String, CanonicalJsonError> {
    compute_hash(&spec_projection(resource))
}

fn spec_projection(resource: &Resource) -> Value {
    let field = |name: &str| resource.body.get(name).cloned().unwrap_or(Value::Null);
    match resource.kind {
        Kind::Role | Kind::ClusterRole => json!({ "rules": field("rules") }),
        Kind::RoleBinding | Kind::ClusterRoleBinding => json!({
            "subjects": field("subjects"),
            "roleRef": field("roleRef"),
        }),
        Kind::ConfigMap => json!({
            "data": field("data"),
            "binaryData": field("binaryData"),
        }),
        _ => json!({ "spec": field("spec") }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectRef;

    fn pod(body: Value) -> Resource {
        Resource::new(&ObjectRef::namespaced(Kind::Pod, "default", "web"), body)
    }

    #[test]
    fn hash_is_short_and_stable() {
        let a = compute_hash(&json!({"b": 1, "a": 2})).unwrap_or_default();
        let b = compute_hash(&json!({"a": 2, "b": 1})).unwrap_or_default();
        assert_eq!(a, b);
        assert_eq!(a.len(), HASH_BYTES * 2);
    }

    #[test]
    fn spec_hash_ignores_metadata_and_status() {
        let mut first = pod(json!({"spec": {"containers": [{"image": "nginx"}]}}));
        let second = pod(json!({
            "spec": {"containers": [{"image": "nginx"}]},
            "status": {"phase": "Running"}
        }));
        first
            .metadata
            .labels
            .insert("team".to_string(), "payments".to_string());

        assert_eq!(
            compute_spec_hash(&first).ok(),
            compute_spec_hash(&second).ok()
        );
    }

    #[test]
    fn spec_hash_changes_with_spec() {
        let first = pod(json!({"spec": {"containers": [{"image": "nginx:1.24"}]}}));
        let second = pod(json!({"spec": {"containers": [{"image": "nginx:1.25"}]}}));
        assert_ne!(
            compute_spec_hash(&first).ok(),
            compute_spec_hash(&second).ok()
        );
    }

    #[test]
    fn role_hash_uses_rules() {
        let role = |verbs: Value| {
            Resource::new(
                &ObjectRef::namespaced(Kind::Role, "default", "reader"),
                json!({"rules": [{"verbs": verbs}], "spec": {"ignored": true}}),
            )
        };
        assert_ne!(
            compute_spec_hash(&role(json!(["get"]))).ok(),
            compute_spec_hash(&role(json!(["get", "list"]))).ok()
        );
    }

    #[test]
    fn str_hash_is_label_safe() {
        let h = compute_str_hash(&"x".repeat(300));
        assert_eq!(h.len(), HASH_BYTES * 2);
        assert_eq!(h, compute_str_hash(&"x".repeat(300)));
        assert_ne!(h, compute_str_hash("x"));
    }

    #[test]
    fn float_in_spec_is_a_hash_failure() {
        assert!(compute_spec_hash(&pod(json!({"spec": {"weight": 0.25}}))).is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::{BTreeMap, HashMap};

        proptest! {
            #[test]
            fn policy_hash_ignores_insertion_order(
                pairs in prop::collection::vec(
                    ("policy\\.[a-z]{1,8}\\.rego", "[a-z ]{0,24}"),
                    1..10
                )
            ) {
                let unordered: HashMap<String, String> = pairs.iter().cloned().collect();
                let ordered: BTreeMap<String, String> = pairs.iter().cloned().collect();

                let from_unordered = compute_hash(&unordered)
                    .unwrap_or_else(|e| panic!("failed to hash map: {e}"));
                let from_ordered = compute_hash(&ordered)
                    .unwrap_or_else(|e| panic!("failed to hash map: {e}"));

                prop_assert_eq!(from_unordered, from_ordered);
            }

            #[test]
            fn spec_hash_ignores_metadata(
                image in "[a-z]{1,10}:[0-9]{1,3}",
                label in "[a-z]{1,10}",
            ) {
                let bare = pod(json!({"spec": {"containers": [{"image": image}]}}));
                let mut labelled = bare.clone();
                labelled.metadata.labels.insert("team".to_string(), label);

                prop_assert_eq!(
                    compute_spec_hash(&bare).ok(),
                    compute_spec_hash(&labelled).ok()
                );
            }
        }
    }
}
