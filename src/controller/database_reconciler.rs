//! Reconciliation driver for IronicDatabase records.
//!
//! Creates the credentials Secret when none is given, then the MariaDB
//! Deployment and its Service. Deletion waits until no Ironic in the
//! namespace refers to the database any more.

use std::sync::Arc;
use std::time::Instant;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use tracing::{debug, error, info, warn};

use crate::controller::common::{FINALIZER, add_finalizer, has_finalizer, remove_finalizer};
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::secrets::{
    acquire_secret, check_tls_secret, create_credentials_secret, generate_credentials,
    get_secret, new_credentials_secret, read_credentials,
};
use crate::controller::state_machine::{Observation, derive_phase};
use crate::controller::status::{ConditionBuilder, Status, conditions_equal};
use crate::controller::validation::validate_ironic_database;
use crate::controller::version_info::VersionInfo;
use crate::crd::{Ironic, IronicDatabase, IronicDatabaseStatus, non_empty};
use crate::health::RecordLabels;
use crate::resources::common::{database_credentials_secret_name, database_service_dns_name};
use crate::resources::database_pod::database_pod_template;
use crate::resources::ensure::{create_or_update, with_template_hash};
use crate::resources::services::{generate_database_service, mutate_service, service_status};
use crate::resources::workloads::{
    deployment_status, generate_database_deployment, mutate_deployment,
};

/// Kind label used in logs and metrics.
pub const KIND: &str = "IronicDatabase";

/// Reconcile an IronicDatabase record.
pub async fn reconcile(obj: Arc<IronicDatabase>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let name = obj.name_any();
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;

    info!(name = %name, namespace = %namespace, "Reconciling IronicDatabase");

    let mut observation = Observation::default();
    let result = reconcile_database(&obj, &ctx, &namespace, &mut observation).await;
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
pub fn error_policy(obj: Arc<IronicDatabase>, error: &Error, ctx: Arc<Context>) -> Action {
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

async fn reconcile_database(
    obj: &IronicDatabase,
    ctx: &Context,
    namespace: &str,
    observation: &mut Observation,
) -> Result<Action> {
    let name = obj.name_any();
    let api: Api<IronicDatabase> = Api::namespaced(ctx.client.clone(), namespace);

    if obj.metadata.deletion_timestamp.is_some() {
        observation.deleting = true;
        return handle_deletion(obj, ctx, &api, namespace, observation).await;
    }

    if !has_finalizer(obj) {
        add_finalizer(&api, &name, FINALIZER).await?;
        let status = Status::updated("finalizer added");
        let action = status.action();
        observation.status = Some(status);
        return Ok(action);
    }
    observation.has_finalizer = true;

    if let Err(e) = validate_ironic_database(obj, None) {
        if !e.is_user_error() {
            return Err(e);
        }
        ctx.publish_warning_event(obj, "ValidationFailed", "Validate", Some(e.to_string()))
            .await;
        let status = Status::user_error(e.to_string());
        return report(ctx, &api, obj, observation, status, None).await;
    }

    let (status, credentials_name) = match deploy(obj, ctx, namespace, observation).await {
        Ok(done) => done,
        Err(e) if e.is_user_error() => {
            ctx.publish_warning_event(obj, "InvalidReference", "Validate", Some(e.to_string()))
                .await;
            (Status::user_error(e.to_string()), None)
        }
        Err(e @ Error::MissingReference { .. }) => {
            ctx.publish_warning_event(obj, "MissingReference", "Reconcile", Some(e.to_string()))
                .await;
            (Status::deployment_failed(e.to_string()), None)
        }
        Err(e) => return Err(e),
    };

    report(ctx, &api, obj, observation, status, credentials_name).await
}

/// Keep the finalizer while an Ironic still uses the database.
async fn handle_deletion(
    obj: &IronicDatabase,
    ctx: &Context,
    api: &Api<IronicDatabase>,
    namespace: &str,
    observation: &mut Observation,
) -> Result<Action> {
    let name = obj.name_any();
    if !has_finalizer(obj) {
        observation.finalizer_removed = true;
        return Ok(Action::await_change());
    }

    let ironics: Api<Ironic> = Api::namespaced(ctx.client.clone(), namespace);
    let users: Vec<String> = ironics
        .list(&ListParams::default())
        .await
        .map_err(|e| Error::kube("list", format!("ironics in {}", namespace), e))?
        .items
        .iter()
        .filter(|ironic| uses_database(ironic, obj))
        .map(ResourceExt::name_any)
        .collect();

    if !users.is_empty() {
        let message = format!(
            "database is still used by {}, delete them first",
            users.join(", ")
        );
        info!(name = %name, namespace = %namespace, users = ?users, "Deletion blocked");
        ctx.publish_warning_event(obj, "DatabaseInUse", "Delete", Some(message.clone()))
            .await;
        let status = Status::in_progress(message);
        let action = status.action();
        observation.status = Some(status);
        return Ok(action);
    }

    info!(name = %name, namespace = %namespace, "IronicDatabase deleted, removing finalizer");
    remove_finalizer(api, &name, FINALIZER).await?;
    observation.finalizer_removed = true;
    Ok(Action::await_change())
}

/// Name of the Secret holding the credentials of `database`.
pub fn database_credentials_in_use(database: &IronicDatabase) -> String {
    database
        .status
        .as_ref()
        .and_then(|s| non_empty(&s.credentials_name))
        .or_else(|| database.spec.credentials_name())
        .map(str::to_string)
        .unwrap_or_else(|| database_credentials_secret_name(database))
}

/// Whether an Ironic uses the managed database, either by name or through
/// its credentials Secret.
pub fn uses_database(ironic: &Ironic, database: &IronicDatabase) -> bool {
    let Some(spec) = &ironic.spec.database else {
        return false;
    };
    if ironic.namespace() != database.namespace() {
        return false;
    }
    non_empty(&spec.ironic_database_name) == Some(database.name_any().as_str())
        || non_empty(&spec.credentials_name)
            == Some(database_credentials_in_use(database).as_str())
}

/// Ensure the credentials, Deployment and Service of the database.
/// Returns the folded status and the credentials Secret in use.
async fn deploy(
    obj: &IronicDatabase,
    ctx: &Context,
    namespace: &str,
    observation: &mut Observation,
) -> Result<(Status, Option<String>)> {
    let Some(credentials_name) = credentials(obj, ctx, namespace).await? else {
        let generated = database_credentials_secret_name(obj);
        return Ok((
            Status::updated("database credentials generated"),
            Some(generated),
        ));
    };

    if let Some(tls) = obj.spec.tls_certificate_name() {
        let secret = acquire_secret(ctx, obj, tls)
            .await?
            .ok_or_else(|| Error::missing("secret", tls))?;
        check_tls_secret(&secret)?;
    }
    observation.secrets_ready = true;

    let version =
        VersionInfo::from_config(&ctx.config).with_database_image(obj.spec.image.as_deref());
    let template = with_template_hash(database_pod_template(obj, &version, &credentials_name))?;

    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), namespace);
    let (deployment, outcome) = create_or_update(
        &deployments,
        generate_database_deployment(obj, template),
        mutate_deployment,
    )
    .await?;
    let workload = outcome
        .status("deployment")
        .unwrap_or_else(|| deployment_status(&deployment));

    let services: Api<Service> = Api::namespaced(ctx.client.clone(), namespace);
    let (service, outcome) =
        create_or_update(&services, generate_database_service(obj), mutate_service).await?;
    let service = outcome
        .status("service")
        .unwrap_or_else(|| service_status(&service));

    Ok((workload.combine(service), Some(credentials_name)))
}

/// Name of the credentials Secret. `None` means it was generated during
/// this pass.
async fn credentials(
    obj: &IronicDatabase,
    ctx: &Context,
    namespace: &str,
) -> Result<Option<String>> {
    if let Some(name) = obj.spec.credentials_name() {
        let secret = acquire_secret(ctx, obj, name)
            .await?
            .ok_or_else(|| Error::missing("secret", name))?;
        read_credentials(&secret)?;
        return Ok(Some(name.to_string()));
    }

    let generated = database_credentials_secret_name(obj);
    if get_secret(ctx, namespace, &generated).await?.is_some() {
        return Ok(Some(generated));
    }
    let secret =
        new_credentials_secret(obj, generated.clone(), "database", &generate_credentials(), false)?;
    create_credentials_secret(ctx, secret).await?;
    ctx.publish_normal_event(
        obj,
        "CredentialsGenerated",
        "CreateSecret",
        Some(format!("Generated database credentials in secret {}", generated)),
    )
    .await;
    Ok(None)
}

async fn report(
    ctx: &Context,
    api: &Api<IronicDatabase>,
    obj: &IronicDatabase,
    observation: &mut Observation,
    status: Status,
    credentials_name: Option<String>,
) -> Result<Action> {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();
    let next = next_database_status(obj, &status, credentials_name, &ctx.config.cluster_domain);
    let unchanged = obj.status.as_ref().is_some_and(|current| {
        conditions_equal(&current.conditions, &next.conditions)
            && current.service_dns_name == next.service_dns_name
            && current.credentials_name == next.credentials_name
            && current.observed_generation == next.observed_generation
    });

    if !unchanged {
        let patch = serde_json::json!({ "status": next });
        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| {
                Error::kube(
                    "update status of",
                    format!("ironicdatabase {}/{}", namespace, name),
                    e,
                )
            })?;
        debug!(name = %name, "Status updated");
    }

    let action = status.action();
    observation.status = Some(status);
    Ok(action)
}

/// The status to store after a pass ending with `status`.
pub fn next_database_status(
    obj: &IronicDatabase,
    status: &Status,
    credentials_name: Option<String>,
    cluster_domain: &str,
) -> IronicDatabaseStatus {
    let current = obj.status.clone().unwrap_or_default();
    let generation = obj.metadata.generation;

    let mut builder = ConditionBuilder::from_existing(&current.conditions);
    builder.status(status, KIND, generation);

    IronicDatabaseStatus {
        conditions: builder.build(),
        service_dns_name: Some(database_service_dns_name(
            &obj.name_any(),
            &obj.namespace().unwrap_or_default(),
            cluster_domain,
        )),
        credentials_name: credentials_name.or(current.credentials_name),
        observed_generation: generation,
    }
}
