//! Deployments and DaemonSets.
//!
//! Ironic runs as a single-replica Deployment, or as a DaemonSet in
//! high-availability mode. Managed databases always use a Deployment.
//! Each workload is paired with a mutator for the ensurer and a status
//! read-back.

use k8s_openapi::api::apps::v1::{
    DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec, DeploymentStrategy,
};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use crate::controller::status::Status;
use crate::crd::{Ironic, IronicDatabase};
use crate::resources::common::{
    database_deployment_name, ironic_deployment_name, owned_metadata, selector_labels,
    standard_labels,
};
use crate::resources::ensure::{merge_metadata, sync_template};

fn deployment(
    metadata: ObjectMeta,
    selector_name: &str,
    template: PodTemplateSpec,
) -> Deployment {
    Deployment {
        metadata,
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            // Host ports cannot be shared between the old and the new pod.
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                rolling_update: None,
            }),
            selector: LabelSelector {
                match_labels: Some(selector_labels(selector_name)),
                ..Default::default()
            },
            template,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the single-replica Deployment running Ironic.
pub fn generate_ironic_deployment(ironic: &Ironic, template: PodTemplateSpec) -> Deployment {
    let name = ironic_deployment_name(ironic);
    deployment(
        owned_metadata(ironic, name.clone(), standard_labels(&ironic.name_any(), "ironic")),
        &name,
        template,
    )
}

/// Generate the DaemonSet running Ironic in high-availability mode.
pub fn generate_ironic_daemonset(ironic: &Ironic, template: PodTemplateSpec) -> DaemonSet {
    let name = ironic_deployment_name(ironic);
    DaemonSet {
        metadata: owned_metadata(
            ironic,
            name.clone(),
            standard_labels(&ironic.name_any(), "ironic"),
        ),
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(selector_labels(&name)),
                ..Default::default()
            },
            template,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the Deployment running a managed database.
pub fn generate_database_deployment(
    database: &IronicDatabase,
    template: PodTemplateSpec,
) -> Deployment {
    let name = database_deployment_name(&database.name_any());
    deployment(
        owned_metadata(
            database,
            name.clone(),
            standard_labels(&database.name_any(), "database"),
        ),
        &name,
        template,
    )
}

/// Mutator for Deployments. The selector is immutable and left alone.
pub fn mutate_deployment(existing: &mut Deployment, desired: &Deployment) {
    merge_metadata(&mut existing.metadata, &desired.metadata);
    let (Some(current), Some(wanted)) = (existing.spec.as_mut(), desired.spec.as_ref()) else {
        existing.spec = desired.spec.clone();
        return;
    };
    current.replicas = wanted.replicas;
    if current.strategy.as_ref().and_then(|s| s.type_.as_deref())
        != wanted.strategy.as_ref().and_then(|s| s.type_.as_deref())
    {
        current.strategy = wanted.strategy.clone();
    }
    sync_template(&mut current.template, &wanted.template);
}

/// Mutator for DaemonSets.
pub fn mutate_daemonset(existing: &mut DaemonSet, desired: &DaemonSet) {
    merge_metadata(&mut existing.metadata, &desired.metadata);
    let (Some(current), Some(wanted)) = (existing.spec.as_mut(), desired.spec.as_ref()) else {
        existing.spec = desired.spec.clone();
        return;
    };
    sync_template(&mut current.template, &wanted.template);
}

/// Read back the state of a Deployment.
///
/// Available once the controller observed the current generation and
/// reports `Available=True`. `ReplicaFailure=True` is fatal.
pub fn deployment_status(deployment: &Deployment) -> Status {
    let name = deployment.name_any();
    let Some(status) = &deployment.status else {
        return Status::in_progress(format!("deployment {} has no status yet", name));
    };
    let conditions = status.conditions.as_deref().unwrap_or_default();

    if let Some(failure) = conditions
        .iter()
        .find(|c| c.type_ == "ReplicaFailure" && c.status == "True")
    {
        return Status::deployment_failed(format!(
            "deployment {} failed: {}",
            name,
            failure.message.as_deref().unwrap_or("replica failure")
        ));
    }

    if status.observed_generation != deployment.metadata.generation {
        return Status::in_progress(format!(
            "deployment {} is being updated",
            name
        ));
    }

    let available = conditions
        .iter()
        .any(|c| c.type_ == "Available" && c.status == "True");
    if available {
        Status::Ready
    } else {
        Status::in_progress(format!("deployment {} is not available yet", name))
    }
}

/// Read back the state of a DaemonSet: available once the current
/// generation is observed and no pod is unavailable.
pub fn daemonset_status(daemonset: &DaemonSet) -> Status {
    let name = daemonset.name_any();
    let Some(status) = &daemonset.status else {
        return Status::in_progress(format!("daemonset {} has no status yet", name));
    };
    if status.observed_generation != daemonset.metadata.generation {
        return Status::in_progress(format!("daemonset {} is being updated", name));
    }
    match status.number_unavailable.unwrap_or(0) {
        0 => Status::Ready,
        unavailable => Status::in_progress(format!(
            "daemonset {} has {} unavailable pod(s)",
            name, unavailable
        )),
    }
}
