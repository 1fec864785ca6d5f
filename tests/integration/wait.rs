//! Waiting on records and the objects the operator creates for them.
//!
//! All waits are built on `kube::runtime::wait::await_condition`, bounded by
//! a timeout so a stuck reconcile fails the test instead of hanging it.

use std::fmt::Debug;
use std::time::Duration;

use ironic_standalone_operator::controller::status::is_ready;
use ironic_standalone_operator::crd::{Ironic, IronicDatabase};
use kube::Resource;
use kube::api::Api;
use kube::runtime::wait::{self, await_condition};
use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("condition not met within {0:?}")]
    Timeout(Duration),

    #[error("object disappeared while waiting")]
    Gone,

    #[error(transparent)]
    Watch(#[from] wait::Error),
}

/// Wait until `name` exists and satisfies `condition`.
pub async fn wait_for_condition<K, F>(
    api: &Api<K>,
    name: &str,
    condition: F,
    limit: Duration,
) -> Result<K, WaitError>
where
    K: Resource + Clone + Debug + Send + DeserializeOwned + 'static,
    F: Fn(&K) -> bool,
{
    let matched = move |obj: Option<&K>| obj.is_some_and(&condition);
    let found = tokio::time::timeout(limit, await_condition(api.clone(), name, matched))
        .await
        .map_err(|_| WaitError::Timeout(limit))??;
    found.ok_or(WaitError::Gone)
}

/// Wait until `name` exists.
pub async fn wait_for_resource<K>(api: &Api<K>, name: &str, limit: Duration) -> Result<K, WaitError>
where
    K: Resource + Clone + Debug + Send + DeserializeOwned + 'static,
{
    wait_for_condition(api, name, |_| true, limit).await
}

/// Wait until `name` no longer exists, finalizers included.
pub async fn wait_for_deletion<K>(api: &Api<K>, name: &str, limit: Duration) -> Result<(), WaitError>
where
    K: Resource + Clone + Debug + Send + DeserializeOwned + 'static,
{
    let gone = |obj: Option<&K>| obj.is_none();
    tokio::time::timeout(limit, await_condition(api.clone(), name, gone))
        .await
        .map_err(|_| WaitError::Timeout(limit))??;
    Ok(())
}

/// Ready for the generation the user last wrote.
pub fn ironic_ready(ironic: &Ironic) -> bool {
    ironic.status.as_ref().is_some_and(|s| {
        s.observed_generation == ironic.metadata.generation && is_ready(&s.conditions)
    })
}

pub fn database_ready(database: &IronicDatabase) -> bool {
    database
        .status
        .as_ref()
        .is_some_and(|s| is_ready(&s.conditions))
}

pub fn has_finalizer<K: Resource>(resource: &K) -> bool {
    ironic_standalone_operator::controller::common::has_finalizer(resource)
}
