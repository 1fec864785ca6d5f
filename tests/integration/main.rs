// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Integration tests against a live cluster.
//!
//! The cluster from the current kubeconfig needs the Ironic and
//! IronicDatabase CRDs (`ironic-standalone-operator crdgen | kubectl apply -f -`).
//! Every test is `#[ignore]`d; run them with
//! `cargo test --test integration -- --ignored`.
//!
//! Each test gets its own namespace and an operator watching only that
//! namespace, so tests run in parallel. Reaching Ready pulls the real Ironic
//! and MariaDB images.

#[path = "../common/mod.rs"]
mod common;

mod assertions;
mod namespace;
mod operator;
mod wait;

mod database_tests;
mod ironic_tests;

pub use assertions::*;
pub use common::*;
pub use namespace::*;
pub use operator::*;
pub use wait::*;

use kube::Client;

/// Client for the cluster in the current kubeconfig, with test logging set up.
pub async fn test_client() -> Client {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("ironic_standalone_operator=debug")
        .with_test_writer()
        .try_init();
    Client::try_default()
        .await
        .expect("integration tests need a reachable cluster")
}
