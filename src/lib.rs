//! ironic-standalone-operator library crate
//!
//! This module exports the controllers, CRD definitions, resource generators,
//! webhooks and the operator configuration.

pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod resources;
pub mod webhooks;

pub use config::OperatorConfig;
pub use health::HealthState;
pub use webhooks::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, run_webhook_server,
};

use std::sync::Arc;

use futures::{Stream, StreamExt};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::runtime::controller::{self as runtime_controller, Action};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{Controller, WatchStreamExt, metadata_watcher, predicates, reflector, watcher};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use controller::common::crd_installed;
use controller::context::Context;
use controller::error::Error;
use controller::{database_reconciler, ironic_reconciler};
use crd::{Ironic, IronicDatabase};
use resources::common::{LABEL_ENVIRONMENT, LABEL_ENVIRONMENT_VALUE};
use resources::service_monitor::{MONITORING_GROUP, SERVICE_MONITOR_KIND};

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Create the default watcher configuration for all controllers.
///
/// This ensures consistent behavior across all controllers:
/// - `any_semantic()`: More reliable resource discovery in test environments
fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Create a filtered stream for a resource type with standard optimizations.
///
/// This creates a reflector-backed stream that:
/// - Maintains an in-memory cache via reflector
/// - Uses automatic retry with exponential backoff on errors
/// - Converts watch events to objects (Added/Modified only)
/// - Filters out status-only updates via generation predicate
///
/// Returns the reflector store (for cache lookups) and the filtered stream.
fn create_filtered_stream<K>(
    api: Api<K>,
    watcher_config: WatcherConfig,
) -> (
    reflector::Store<K>,
    impl Stream<Item = Result<K, watcher::Error>>,
)
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, watcher_config))
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicates::generation);
    (reader, stream)
}

/// Ironics in `store` that read the Secret `secret`.
fn ironics_using_secret(store: &Store<Ironic>, secret: &Secret) -> Vec<ObjectRef<Ironic>> {
    let namespace = secret.namespace();
    let name = secret.name_any();
    store
        .state()
        .iter()
        .filter(|ironic| ironic.namespace() == namespace)
        .filter(|ironic| ironic_reconciler::referenced_secrets(ironic).contains(&name))
        .map(|ironic| ObjectRef::from_obj(ironic.as_ref()))
        .collect()
}

/// Ironics in `store` backed by the managed database `database`.
fn ironics_using_database(
    store: &Store<Ironic>,
    database: &IronicDatabase,
) -> Vec<ObjectRef<Ironic>> {
    store
        .state()
        .iter()
        .filter(|ironic| database_reconciler::uses_database(ironic, database))
        .map(|ironic| ObjectRef::from_obj(ironic.as_ref()))
        .collect()
}

/// Log the outcome of one reconcile. NotFound after a deletion is expected.
async fn log_result<K>(
    result: Result<(ObjectRef<K>, Action), runtime_controller::Error<Error, watcher::Error>>,
) where
    K: Resource,
    K::DynamicType: std::fmt::Debug,
{
    match result {
        Ok((obj, _action)) => {
            debug!("Reconciled: {}", obj.name);
        }
        Err(e) => {
            // ObjectNotFound/NotFound errors are expected after deletion when
            // related watch events trigger reconciliation for a deleted object.
            let is_not_found = match &e {
                runtime_controller::Error::ObjectNotFound(_) => true,
                runtime_controller::Error::ReconcilerFailed(err, _) => err.is_not_found(),
                _ => false,
            };
            if is_not_found {
                debug!("Object no longer exists (likely deleted): {:?}", e);
            } else {
                error!("Reconciliation error: {:?}", e);
            }
        }
    }
}

/// Run both controllers with the given configuration.
///
/// The watch scope is `config.watch_namespace` (cluster-wide when unset).
/// If health_state is provided, metrics will be recorded for reconciliations.
pub async fn run_controllers(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
) {
    let namespace = config.watch_namespace.clone();
    run_controllers_scoped(client, config, health_state, namespace.as_deref()).await
}

/// Run the Ironic and IronicDatabase controllers with optional namespace
/// scoping.
///
/// When `namespace` is `Some(ns)`, only watches resources in that namespace.
/// When `namespace` is `None`, watches resources cluster-wide.
///
/// Use the scoped version for integration tests to enable parallel test execution.
pub async fn run_controllers_scoped(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
    namespace: Option<&str>,
) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    info!(
        "Starting controllers for Ironic and IronicDatabase resources (scope: {})",
        scope_msg
    );

    let service_monitor_available =
        crd_installed(&client, MONITORING_GROUP, SERVICE_MONITOR_KIND).await;
    info!(available = service_monitor_available, "ServiceMonitor support");

    let concurrency = config.max_concurrent_reconciles;
    let controller_config = runtime_controller::Config::default().concurrency(concurrency);
    let watcher_config = default_watcher_config();

    // Secrets carrying the environment label are cached and trigger the
    // Ironics that read them. Unlabeled Secrets are read from the API.
    let secrets: Api<Secret> = scoped_api(client.clone(), namespace);
    let secret_watcher_config = watcher_config
        .clone()
        .labels(&format!("{}={}", LABEL_ENVIRONMENT, LABEL_ENVIRONMENT_VALUE));
    let (secret_store, secret_writer) = reflector::store();
    let secret_stream = reflector(secret_writer, watcher(secrets, secret_watcher_config))
        .default_backoff()
        .touched_objects();

    let ctx = Arc::new(
        Context::new(client.clone(), Arc::new(config), health_state.clone())
            .with_secret_store(secret_store)
            .with_service_monitor(service_monitor_available),
    );

    if let Some(ref state) = health_state {
        state.set_controllers_running(true);
    }

    let ironics: Api<Ironic> = scoped_api(client.clone(), namespace);
    let (ironic_store, ironic_stream) = create_filtered_stream(ironics, watcher_config.clone());
    let secret_index = ironic_store.clone();
    let database_index = ironic_store.clone();

    // Memory optimization: Services only need to be known to exist/change,
    // so they are watched through metadata_watcher. Deployments, DaemonSets
    // and Jobs keep full watchers since their status is read.
    let ironic_controller = Controller::for_stream(ironic_stream, ironic_store)
        .with_config(controller_config.clone())
        .owns(
            scoped_api::<Deployment>(client.clone(), namespace),
            watcher_config.clone(),
        )
        .owns(
            scoped_api::<DaemonSet>(client.clone(), namespace),
            watcher_config.clone(),
        )
        .owns(
            scoped_api::<Job>(client.clone(), namespace),
            watcher_config.clone(),
        )
        .owns_stream(
            metadata_watcher(
                scoped_api::<Service>(client.clone(), namespace),
                watcher_config.clone(),
            )
            .touched_objects(),
        )
        .watches_stream(secret_stream, move |secret| {
            ironics_using_secret(&secret_index, &secret)
        })
        .watches(
            scoped_api::<IronicDatabase>(client.clone(), namespace),
            watcher_config.clone(),
            move |database| ironics_using_database(&database_index, &database),
        )
        .run(
            ironic_reconciler::reconcile,
            ironic_reconciler::error_policy,
            ctx.clone(),
        )
        .for_each(log_result);

    let databases: Api<IronicDatabase> = scoped_api(client.clone(), namespace);
    let (database_store, database_stream) =
        create_filtered_stream(databases, watcher_config.clone());
    let database_controller = Controller::for_stream(database_stream, database_store)
        .with_config(controller_config)
        .owns(
            scoped_api::<Deployment>(client.clone(), namespace),
            watcher_config.clone(),
        )
        .owns_stream(
            metadata_watcher(scoped_api::<Service>(client, namespace), watcher_config)
                .touched_objects(),
        )
        .run(
            database_reconciler::reconcile,
            database_reconciler::error_policy,
            ctx,
        )
        .for_each(log_result);

    futures::join!(ironic_controller, database_controller);

    if let Some(ref state) = health_state {
        state.set_controllers_running(false);
    }
    error!("Controller streams ended unexpectedly");
}
