//! Reconciliation driver for Ironic records.
//!
//! One pass runs the pipeline in a fixed order: finalizer, validation,
//! version request, secrets, database, pre-upgrade job, workload, Service,
//! ServiceMonitor, post-upgrade job and finally the status write. Each step
//! either lets the pass continue or ends it with a [`Status`] that becomes
//! the Ready condition and the requeue decision.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{PodTemplateSpec, Secret, Service};
use kube::api::{DeleteParams, DynamicObject, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use tracing::{debug, error, info, warn};

use crate::controller::common::{FINALIZER, add_finalizer, has_finalizer, remove_finalizer};
use crate::controller::context::{Context, FIELD_MANAGER};
use crate::controller::error::{Error, Result};
use crate::controller::secrets::{
    acquire_config_map, acquire_current_secret, acquire_secret, check_tls_secret,
    create_credentials_secret, ensure_htpasswd, generate_credentials, new_credentials_secret,
};
use crate::controller::state_machine::{Observation, derive_phase};
use crate::controller::status::{ConditionBuilder, Status, conditions_equal, is_ready};
use crate::controller::validation::{check_downgrade, validate_ironic};
use crate::controller::version_info::VersionInfo;
use crate::crd::{CaKind, CaReference, Ironic, IronicDatabase, IronicStatus, Version, non_empty};
use crate::health::RecordLabels;
use crate::resources::common::{
    api_credentials_secret_name, ironic_deployment_name, ironic_service_monitor_name,
};
use crate::resources::ensure::{Outcome, create_or_update, delete_if_exists, with_template_hash};
use crate::resources::ironic_pod::{
    DatabaseConnection, IronicInputs, database_connection, ironic_pod_template,
};
use crate::resources::jobs::{Upgrade, UpgradePhase, job_status, pending_upgrade, upgrade_job};
use crate::resources::service_monitor::{
    generate_service_monitor, service_monitor_api_resource, wants_service_monitor,
};
use crate::resources::services::{cluster_ips, generate_ironic_service, mutate_service, service_status};
use crate::resources::workloads::{
    daemonset_status, deployment_status, generate_ironic_daemonset, generate_ironic_deployment,
    mutate_daemonset, mutate_deployment,
};

/// Kind label used in logs and metrics.
pub const KIND: &str = "Ironic";

/// Reconcile an Ironic record.
pub async fn reconcile(obj: Arc<Ironic>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let name = obj.name_any();
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;

    info!(name = %name, namespace = %namespace, "Reconciling Ironic");

    let mut observation = Observation::default();
    let result = reconcile_ironic(&obj, &ctx, &namespace, &mut observation).await;
    let phase = derive_phase(&observation);
    debug!(name = %name, namespace = %namespace, phase = %phase, "Reconcile finished");

    if let Some(ref health_state) = ctx.health_state {
        let record = RecordLabels::new(KIND, &namespace, &name);
        health_state
            .metrics
            .observe_reconcile(&record, start.elapsed(), phase);
        if result.is_ok() {
            health_state.mark_reconciled();
        }
    }

    result
}

/// Error policy for the controller.
pub fn error_policy(obj: Arc<Ironic>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    if let Some(ref health_state) = ctx.health_state {
        health_state
            .metrics
            .record_error(&RecordLabels::new(KIND, &namespace, &name));
    }

    if error.is_not_found() {
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_retryable() {
        warn!(name = %name, namespace = %namespace, error = %error, "Retryable error, will retry");
    } else {
        error!(name = %name, namespace = %namespace, error = %error, "Non-retryable error");
    }
    Action::requeue(error.requeue_after())
}

async fn reconcile_ironic(
    obj: &Ironic,
    ctx: &Context,
    namespace: &str,
    observation: &mut Observation,
) -> Result<Action> {
    let name = obj.name_any();
    let api: Api<Ironic> = Api::namespaced(ctx.client.clone(), namespace);

    if obj.metadata.deletion_timestamp.is_some() {
        observation.deleting = true;
        if has_finalizer(obj) {
            // Owned objects are garbage collected; only the finalizer is ours.
            info!(name = %name, namespace = %namespace, "Ironic deleted, removing finalizer");
            remove_finalizer(&api, &name, FINALIZER).await?;
        }
        observation.finalizer_removed = true;
        return Ok(Action::await_change());
    }

    if !has_finalizer(obj) {
        add_finalizer(&api, &name, FINALIZER).await?;
        let status = Status::updated("finalizer added");
        let action = status.action();
        observation.status = Some(status);
        return Ok(action);
    }
    observation.has_finalizer = true;

    if let Err(e) = validate_ironic(obj, None, &ctx.config) {
        return reject(ctx, &api, obj, observation, e, "ValidationFailed").await;
    }

    let version = VersionInfo::from_config(&ctx.config)
        .with_overrides(obj.spec.version.as_deref(), &obj.spec.images)?;
    let has_database = obj.spec.database.is_some();
    match version_request(obj.status.as_ref(), version.installed_version, has_database) {
        Ok(Some(requested)) => {
            info!(name = %name, namespace = %namespace, version = %requested, "New version requested");
            let status = Status::updated(format!("deploying version {}", requested));
            return report(ctx, &api, obj, observation, status, Some(requested), None).await;
        }
        Ok(None) => {}
        Err(e) => return reject(ctx, &api, obj, observation, e, "DowngradeRefused").await,
    }

    let (status, endpoints) = match deploy(obj, ctx, namespace, &version, observation).await {
        Ok(done) => done,
        Err(e) if e.is_user_error() => {
            return reject(ctx, &api, obj, observation, e, "InvalidReference").await;
        }
        Err(e @ Error::MissingReference { .. }) => {
            warn!(name = %name, namespace = %namespace, error = %e, "Referenced object missing");
            ctx.publish_warning_event(obj, "MissingReference", "Reconcile", Some(e.to_string()))
                .await;
            (Status::deployment_failed(e.to_string()), None)
        }
        Err(e) => return Err(e),
    };

    report(ctx, &api, obj, observation, status, None, endpoints).await
}

/// Report a user error: the record stays as it is until edited.
async fn reject(
    ctx: &Context,
    api: &Api<Ironic>,
    obj: &Ironic,
    observation: &mut Observation,
    error: Error,
    reason: &str,
) -> Result<Action> {
    if !error.is_user_error() {
        return Err(error);
    }
    warn!(name = %obj.name_any(), error = %error, "Ironic rejected");
    ctx.publish_warning_event(obj, reason, "Validate", Some(error.to_string()))
        .await;
    let status = Status::user_error(error.to_string());
    report(ctx, api, obj, observation, status, None, None).await
}

/// Ensure everything the Ironic record describes. Returns the folded status
/// and, once the Service exists, the API endpoints.
async fn deploy(
    obj: &Ironic,
    ctx: &Context,
    namespace: &str,
    version: &VersionInfo,
    observation: &mut Observation,
) -> Result<(Status, Option<Vec<String>>)> {
    let Some(api_secret) = api_credentials(obj, ctx).await? else {
        return Ok((Status::updated("API credentials generated"), None));
    };

    let tls_secret = match obj.spec.tls.certificate_name() {
        Some(secret_name) => {
            let secret = acquire_current_secret(ctx, obj, secret_name)
                .await?
                .ok_or_else(|| Error::missing("secret", secret_name))?;
            check_tls_secret(&secret)?;
            Some(secret)
        }
        None => None,
    };
    for ca in [&obj.spec.tls.bmc_ca, &obj.spec.tls.trusted_ca]
        .into_iter()
        .flatten()
    {
        acquire_ca(ctx, obj, ca).await?;
    }

    let database = match database(obj, ctx, namespace).await? {
        Ok(database) => database,
        Err(waiting) => return Ok((waiting, None)),
    };
    observation.secrets_ready = true;

    let installed = obj
        .status
        .as_ref()
        .and_then(|s| s.installed_version.as_deref());
    let upgrade = pending_upgrade(installed, version.installed_version, database.is_some());

    if let (Some(upgrade), Some(connection)) = (&upgrade, &database) {
        let status = upgrade_step(ctx, obj, namespace, version, connection, UpgradePhase::Pre, upgrade)
            .await?;
        if !status.is_ready() {
            observation.upgrade = Some(UpgradePhase::Pre);
            return Ok((status, None));
        }
    }

    let inputs = IronicInputs {
        ironic: obj,
        version,
        api_secret: &api_secret,
        tls_secret: tls_secret.as_ref(),
        database: database.as_ref(),
    };
    let template = with_template_hash(ironic_pod_template(&inputs))?;
    let workload = ensure_workload(ctx, obj, namespace, template).await?;

    let services: Api<Service> = Api::namespaced(ctx.client.clone(), namespace);
    let (service, outcome) =
        create_or_update(&services, generate_ironic_service(obj), mutate_service).await?;
    let endpoints = api_endpoints(obj, &cluster_ips(&service));
    let service = outcome
        .status("service")
        .unwrap_or_else(|| service_status(&service));

    ensure_service_monitor(ctx, obj, namespace).await?;

    let mut status = workload.combine(service);

    if let (Some(upgrade), Some(connection)) = (&upgrade, &database)
        && status.is_ready()
    {
        let post = upgrade_step(ctx, obj, namespace, version, connection, UpgradePhase::Post, upgrade)
            .await?;
        if !post.is_ready() {
            observation.upgrade = Some(UpgradePhase::Post);
        }
        status = status.combine(post);
    }

    Ok((status, Some(endpoints)))
}

/// The API credentials Secret, generated on first use. `None` means the
/// Secret was just created and the record updated to point at it.
async fn api_credentials(obj: &Ironic, ctx: &Context) -> Result<Option<Secret>> {
    let secret_name = obj.spec.api_credentials_name.trim();
    if secret_name.is_empty() {
        let generated = api_credentials_secret_name(obj);
        let secret =
            new_credentials_secret(obj, generated.clone(), "ironic", &generate_credentials(), true)?;
        create_credentials_secret(ctx, secret).await?;

        let name = obj.name_any();
        let namespace = obj.namespace().unwrap_or_default();
        let api: Api<Ironic> = Api::namespaced(ctx.client.clone(), &namespace);
        let patch = serde_json::json!({ "spec": { "apiCredentialsName": generated } });
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| Error::kube("update", format!("ironic {}/{}", namespace, name), e))?;
        ctx.publish_normal_event(
            obj,
            "CredentialsGenerated",
            "CreateSecret",
            Some(format!("Generated API credentials in secret {}", generated)),
        )
        .await;
        return Ok(None);
    }

    let secret = acquire_current_secret(ctx, obj, secret_name)
        .await?
        .ok_or_else(|| Error::missing("secret", secret_name))?;
    ensure_htpasswd(ctx, secret).await.map(Some)
}

async fn acquire_ca(ctx: &Context, obj: &Ironic, ca: &CaReference) -> Result<()> {
    let found = match ca.kind {
        CaKind::Secret => acquire_secret(ctx, obj, &ca.name).await?.is_some(),
        CaKind::ConfigMap => acquire_config_map(ctx, obj, &ca.name).await?.is_some(),
    };
    if found {
        Ok(())
    } else {
        Err(Error::missing(
            if ca.kind == CaKind::Secret {
                "secret"
            } else {
                "configmap"
            },
            ca.name.clone(),
        ))
    }
}

/// Resolve the database connection. The inner `Err` carries the status to
/// report while a managed database is not ready yet.
async fn database(
    obj: &Ironic,
    ctx: &Context,
    namespace: &str,
) -> Result<std::result::Result<Option<DatabaseConnection>, Status>> {
    let Some(spec) = &obj.spec.database else {
        return Ok(Ok(None));
    };

    let managed = match non_empty(&spec.ironic_database_name) {
        Some(db_name) => {
            let api: Api<IronicDatabase> = Api::namespaced(ctx.client.clone(), namespace);
            let db = api
                .get_opt(db_name)
                .await
                .map_err(|e| {
                    Error::kube("get", format!("ironicdatabase {}/{}", namespace, db_name), e)
                })?
                .ok_or_else(|| Error::missing("ironicdatabase", db_name))?;
            if !db
                .status
                .as_ref()
                .is_some_and(|s| is_ready(&s.conditions))
            {
                return Ok(Err(Status::in_progress(format!(
                    "waiting for database {} to become ready",
                    db_name
                ))));
            }
            Some(db)
        }
        None => None,
    };

    let connection = database_connection(obj, managed.as_ref(), &ctx.config.cluster_domain)
        .ok_or_else(|| Error::MissingField("spec.database.credentialsName".to_string()))?;
    acquire_secret(ctx, obj, &connection.credentials_name)
        .await?
        .ok_or_else(|| Error::missing("secret", connection.credentials_name.clone()))?;
    Ok(Ok(Some(connection)))
}

/// Ensure one upgrade job and read back its outcome.
async fn upgrade_step(
    ctx: &Context,
    obj: &Ironic,
    namespace: &str,
    version: &VersionInfo,
    database: &DatabaseConnection,
    phase: UpgradePhase,
    upgrade: &Upgrade,
) -> Result<Status> {
    let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), namespace);
    let desired = upgrade_job(obj, version, database, phase, upgrade);
    // Jobs are immutable once created.
    let (job, outcome) = create_or_update(&jobs, desired, |_, _| {}).await?;
    if outcome == Outcome::Created {
        if let Some(ref health_state) = ctx.health_state {
            health_state
                .metrics
                .record_upgrade_job(namespace, &obj.name_any(), phase);
        }
        ctx.publish_normal_event(
            obj,
            "UpgradeJobCreated",
            "CreateJob",
            Some(format!(
                "Started job {} for the upgrade from {} to {}",
                job.name_any(),
                upgrade.from,
                upgrade.to
            )),
        )
        .await;
    }
    let status = outcome
        .status("upgrade job")
        .unwrap_or_else(|| job_status(&job));
    if let Status::Fatal { message, .. } = &status {
        warn!(job = %job.name_any(), message = %message, "Upgrade job failed");
    }
    Ok(status)
}

/// Deployment in normal mode, DaemonSet in high-availability mode. The kind
/// not in use is removed.
async fn ensure_workload(
    ctx: &Context,
    obj: &Ironic,
    namespace: &str,
    template: PodTemplateSpec,
) -> Result<Status> {
    let name = ironic_deployment_name(obj);
    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), namespace);
    let daemonsets: Api<DaemonSet> = Api::namespaced(ctx.client.clone(), namespace);

    if obj.spec.high_availability {
        if delete_if_exists(&deployments, &name).await? {
            info!(name = %name, "Replaced deployment with daemonset");
        }
        let (daemonset, outcome) = create_or_update(
            &daemonsets,
            generate_ironic_daemonset(obj, template),
            mutate_daemonset,
        )
        .await?;
        Ok(outcome
            .status("daemonset")
            .unwrap_or_else(|| daemonset_status(&daemonset)))
    } else {
        if delete_if_exists(&daemonsets, &name).await? {
            info!(name = %name, "Replaced daemonset with deployment");
        }
        let (deployment, outcome) = create_or_update(
            &deployments,
            generate_ironic_deployment(obj, template),
            mutate_deployment,
        )
        .await?;
        Ok(outcome
            .status("deployment")
            .unwrap_or_else(|| deployment_status(&deployment)))
    }
}

async fn ensure_service_monitor(ctx: &Context, obj: &Ironic, namespace: &str) -> Result<()> {
    if !ctx.service_monitor_available {
        if wants_service_monitor(obj) {
            debug!(name = %obj.name_any(), "ServiceMonitor CRD not installed, skipping");
        }
        return Ok(());
    }

    let api: Api<DynamicObject> =
        Api::namespaced_with(ctx.client.clone(), namespace, &service_monitor_api_resource());
    let name = ironic_service_monitor_name(obj);
    if wants_service_monitor(obj) {
        let monitor = generate_service_monitor(obj);
        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&monitor),
        )
        .await
        .map_err(|e| Error::kube("apply", format!("servicemonitor {}/{}", namespace, name), e))?;
        return Ok(());
    }

    match api.delete(&name, &DeleteParams::background()).await {
        Ok(_) => {
            info!(name = %name, "Deleted ServiceMonitor");
            Ok(())
        }
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(Error::kube(
            "delete",
            format!("servicemonitor {}/{}", namespace, name),
            e,
        )),
    }
}

/// Write the status when it changed and turn `status` into an action.
async fn report(
    ctx: &Context,
    api: &Api<Ironic>,
    obj: &Ironic,
    observation: &mut Observation,
    status: Status,
    requested: Option<String>,
    endpoints: Option<Vec<String>>,
) -> Result<Action> {
    let name = obj.name_any();
    let next = next_status(obj, &status, requested, endpoints);
    let was_ready = obj
        .status
        .as_ref()
        .is_some_and(|s| is_ready(&s.conditions));

    if status_changed(obj.status.as_ref(), &next) {
        let patch = serde_json::json!({ "status": next });
        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| Error::kube("update status of", format!("ironic {}", name), e))?;
        debug!(name = %name, "Status updated");
    }

    if status.is_ready() && !was_ready {
        ctx.publish_normal_event(
            obj,
            "DeploymentAvailable",
            "Reconcile",
            next.installed_version
                .as_ref()
                .map(|v| format!("Ironic {} is available", v)),
        )
        .await;
    }

    let action = status.action();
    observation.status = Some(status);
    Ok(action)
}

/// Decide whether the resolved version is a new request. Returns the value
/// for `status.requestedVersion` when it changes, or a user error when the
/// change is a refused downgrade.
pub fn version_request(
    current: Option<&IronicStatus>,
    target: Version,
    has_database: bool,
) -> Result<Option<String>> {
    let requested = target.to_string();
    if current.and_then(|s| s.requested_version.as_deref()) == Some(requested.as_str()) {
        return Ok(None);
    }
    check_downgrade(
        current.and_then(|s| s.installed_version.as_deref()),
        target,
        has_database,
    )?;
    Ok(Some(requested))
}

/// The status to store after a pass ending with `status`.
///
/// `installedVersion` follows `requestedVersion` once everything is ready.
pub fn next_status(
    obj: &Ironic,
    status: &Status,
    requested: Option<String>,
    endpoints: Option<Vec<String>>,
) -> IronicStatus {
    let current = obj.status.clone().unwrap_or_default();
    let generation = obj.metadata.generation;

    let mut builder = ConditionBuilder::from_existing(&current.conditions);
    builder.status(status, KIND, generation);

    let mut next = IronicStatus {
        conditions: builder.build(),
        observed_generation: generation,
        ..current
    };
    if let Some(requested) = requested {
        next.requested_version = Some(requested);
    }
    if let Some(endpoints) = endpoints {
        next.endpoints = endpoints;
    }
    if status.is_ready() {
        next.installed_version = next.requested_version.clone();
    }
    next
}

fn status_changed(current: Option<&IronicStatus>, next: &IronicStatus) -> bool {
    let Some(current) = current else {
        return true;
    };
    !conditions_equal(&current.conditions, &next.conditions)
        || current.installed_version != next.installed_version
        || current.requested_version != next.requested_version
        || current.endpoints != next.endpoints
        || current.observed_generation != next.observed_generation
}

/// API URLs: the provisioning IP first, then the Service cluster IPs.
pub fn api_endpoints(obj: &Ironic, service_ips: &[IpAddr]) -> Vec<String> {
    let scheme = if obj.spec.tls.enabled() {
        "https"
    } else {
        "http"
    };
    let Ok(port) = u16::try_from(obj.spec.networking.api_port) else {
        return Vec::new();
    };

    let mut ips: Vec<IpAddr> = obj
        .spec
        .networking
        .ip_address()
        .and_then(|ip| ip.parse().ok())
        .into_iter()
        .collect();
    for ip in service_ips {
        if !ips.contains(ip) {
            ips.push(*ip);
        }
    }
    ips.into_iter()
        .map(|ip| format!("{}://{}", scheme, SocketAddr::new(ip, port)))
        .collect()
}

/// Names of the Secrets an Ironic reads. A change to any of them triggers
/// a reconcile of the record.
pub fn referenced_secrets(obj: &Ironic) -> Vec<String> {
    let spec = &obj.spec;
    let mut names = Vec::new();
    if !spec.api_credentials_name.trim().is_empty() {
        names.push(spec.api_credentials_name.trim().to_string());
    }
    if let Some(name) = spec.tls.certificate_name() {
        names.push(name.to_string());
    }
    for ca in [&spec.tls.bmc_ca, &spec.tls.trusted_ca].into_iter().flatten() {
        if ca.kind == CaKind::Secret {
            names.push(ca.name.clone());
        }
    }
    if let Some(db) = &spec.database {
        if let Some(name) = non_empty(&db.credentials_name) {
            names.push(name.to_string());
        } else if let Some(db_name) = non_empty(&db.ironic_database_name) {
            names.push(format!("{}-credentials", db_name));
        }
    }
    names.sort();
    names.dedup();
    names
}
