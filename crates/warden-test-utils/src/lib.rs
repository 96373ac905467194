//! Shared test utilities for warden integration tests.
//!
//! This crate provides:
//! - [`MemoryCluster`]: object cache and policy config source with owner cascades
//! - [`ScriptedRuleEngine`]: deterministic rule engine with a call counter
//! - [`TestEnv`]: a controller wired to in-memory collaborators
//! - Factory functions for watched objects and policy bundles
//! - Custom assertion helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_test_utils::{TestEnv, fixtures};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let env = TestEnv::new();
//!     env.cluster.apply(fixtures::pod("default", "web", "nginx:1.25"));
//!     // ... reconcile ...
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod cluster;
pub mod engine;
pub mod env;
pub mod fixtures;

pub use assertions::*;
pub use cluster::MemoryCluster;
pub use engine::ScriptedRuleEngine;
pub use env::TestEnv;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("warden=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
