//! Error types for the reconciliation engine.
//!
//! Every variant here is a reconcile failure the caller retries with backoff.
//! Expected absence (missing object, missing config, missing report, already
//! deleted target, no applicable policy) never reaches this type: it is
//! normalized to a successful [`crate::controller::ReconcileOutcome`].
//! [`Error::NoPoliciesApplicable`] is the one exception: the evaluator raises
//! it and the controller turns it into a no-op.

use warden_core::{Kind, ObjectRef};

/// The result type used throughout warden-audit.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reconciling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The watched object could not be fetched for a reason other than absence.
    #[error("getting {object} from cache")]
    ResolveObject {
        /// The object that was fetched.
        object: ObjectRef,
        /// The underlying failure.
        #[source]
        source: warden_core::Error,
    },

    /// The owner of an object could not be resolved.
    #[error("failed checking current revision of {object}")]
    Ownership {
        /// The object whose ownership was being resolved.
        object: ObjectRef,
        /// The underlying failure.
        #[source]
        source: warden_core::Error,
    },

    /// A hash or label selector could not be computed.
    #[error("computing {what}: {message}")]
    Computation {
        /// What was being computed.
        what: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// The policy config object could not be fetched.
    #[error("failed getting policies from {namespace}/{name}")]
    PolicyLoad {
        /// Namespace of the policy config object.
        namespace: String,
        /// Name of the policy config object.
        name: String,
        /// The underlying failure.
        #[source]
        source: warden_core::Error,
    },

    /// The policy bundle is malformed.
    #[error("invalid policy config: {message}")]
    PolicyConfig {
        /// Description of the problem.
        message: String,
    },

    /// The rule engine failed.
    #[error("evaluating {object}")]
    Evaluation {
        /// The object being evaluated.
        object: ObjectRef,
        /// The engine failure.
        #[source]
        source: warden_core::Error,
    },

    /// No policy applies to the kind. Normalized to a no-op by the controller.
    #[error("no policies found for kind {kind}")]
    NoPoliciesApplicable {
        /// The kind without policies.
        kind: Kind,
    },

    /// A report write or delete failed for a reason other than absence.
    #[error("{operation} report {report}")]
    Persistence {
        /// The operation that failed (`writing`, `deleting`, `listing`, ...).
        operation: &'static str,
        /// The report (or collection) involved.
        report: String,
        /// The underlying failure.
        #[source]
        source: warden_core::Error,
    },

    /// The pass was abandoned because cancellation fired.
    #[error("reconcile cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// An error from warden-core.
    #[error(transparent)]
    Core(#[from] warden_core::Error),
}

impl Error {
    /// Creates a computation error.
    #[must_use]
    pub fn computation(what: &'static str, message: impl ToString) -> Self {
        Self::Computation {
            what,
            message: message.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a persistence error, mapping core cancellation to [`Error::Cancelled`].
    #[must_use]
    pub fn persistence(
        operation: &'static str,
        report: impl Into<String>,
        source: warden_core::Error,
    ) -> Self {
        if source.is_cancelled() {
            return Self::Cancelled;
        }
        Self::Persistence {
            operation,
            report: report.into(),
            source,
        }
    }

    /// Returns true if the failure was caused by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::ResolveObject { source, .. }
            | Self::Ownership { source, .. }
            | Self::PolicyLoad { source, .. }
            | Self::Evaluation { source, .. }
            | Self::Persistence { source, .. }
            | Self::Core(source) => source.is_cancelled(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn persistence_error_keeps_source() {
        let err = Error::persistence(
            "deleting",
            "configauditreport default/pod-web",
            warden_core::Error::storage("connection reset"),
        );
        assert_eq!(
            err.to_string(),
            "deleting report configauditreport default/pod-web"
        );
        let source = StdError::source(&err).expect("source kept");
        assert!(source.to_string().contains("connection reset"));
    }

    #[test]
    fn evaluation_error_chains_engine_failure() {
        let err = Error::Evaluation {
            object: warden_core::ObjectRef::namespaced(Kind::Pod, "default", "web"),
            source: warden_core::Error::Internal {
                message: "compile error in policy.a.rego".into(),
            },
        };

        assert!(!err.to_string().contains("compile error"));
        let source = StdError::source(&err).expect("engine failure kept as source");
        assert!(source.to_string().contains("compile error in policy.a.rego"));
    }

    #[test]
    fn cancellation_is_normalized() {
        let err = Error::persistence("writing", "r", warden_core::Error::Cancelled);
        assert!(matches!(err, Error::Cancelled));
        assert!(Error::Core(warden_core::Error::Cancelled).is_cancelled());
    }

    #[test]
    fn no_policies_display() {
        let err = Error::NoPoliciesApplicable { kind: Kind::Service };
        assert_eq!(err.to_string(), "no policies found for kind Service");
    }
}
