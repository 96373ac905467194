//! # warden-core
//!
//! Shared primitives for the warden compliance-reconciliation engine.
//!
//! - **Object model**: kinds, object references, metadata and owner links
//! - **Labels**: label keys written onto reports and equality selectors
//! - **Hashing**: canonical-JSON content hashes used as cache keys
//! - **Cancellation**: cooperative cancellation for reconcile passes
//! - **Errors**: store/cache errors with a distinguished not-found variant
//! - **Observability**: logging initialization and span helpers
//!
//! ## Example
//!
//! ```rust
//! use warden_core::prelude::*;
//! use serde_json::json;
//!
//! let pod = Resource::new(
//!     &ObjectRef::namespaced(Kind::Pod, "default", "web"),
//!     json!({"spec": {"containers": [{"image": "nginx"}]}}),
//! );
//! let hash = compute_spec_hash(&pod).expect("integer-only spec");
//! assert_eq!(hash.len(), 20);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod cancel;
pub mod canonical_json;
pub mod error;
pub mod hash;
pub mod labels;
pub mod object;
pub mod observability;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::cancel::{CancelHandle, CancelToken};
    pub use crate::error::{Error, Result};
    pub use crate::hash::{compute_hash, compute_spec_hash};
    pub use crate::labels::LabelSelector;
    pub use crate::object::{Kind, ObjectKey, ObjectMeta, ObjectRef, OwnerReference, Resource};
}

pub use cancel::{CancelHandle, CancelToken};
pub use error::{Error, Result};
pub use labels::LabelSelector;
pub use object::{Kind, ObjectKey, ObjectMeta, ObjectRef, OwnerReference, Resource};
pub use observability::{LogFormat, init_logging, reconcile_span};
