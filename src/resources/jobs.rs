//! Database upgrade jobs.
//!
//! A version change of an Ironic with a database runs two jobs: the schema
//! upgrade before the new version starts and the online data migrations
//! once it is running. Job names encode both versions so each upgrade gets
//! its own job and a finished one is never re-run.

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, SecretVolumeSource, Volume};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::controller::status::Status;
use crate::controller::version_info::VersionInfo;
use crate::crd::{Ironic, Version};
use crate::resources::common::{owned_metadata, standard_labels};
use crate::resources::container::{IRONIC_GROUP, IRONIC_USER, mount, security_context};
use crate::resources::ironic_pod::{DatabaseConnection, database_env};

/// Finished jobs are garbage collected after a day.
pub const JOB_TTL_SECONDS: i32 = 86_400;

const VOLUME_CERT_MARIADB: &str = "cert-mariadb";
const PATH_CERT_MARIADB: &str = "/certs/mariadb";

/// Which side of the rollout a job runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpgradePhase {
    /// `ironic-dbsync upgrade`, before the new version is deployed.
    Pre,
    /// `ironic-dbsync online_data_migrations`, once the new version runs.
    Post,
}

impl UpgradePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            UpgradePhase::Pre => "pre",
            UpgradePhase::Post => "post",
        }
    }

    fn command(self) -> &'static str {
        match self {
            UpgradePhase::Pre => "upgrade",
            UpgradePhase::Post => "online_data_migrations",
        }
    }

    fn component(self) -> &'static str {
        match self {
            UpgradePhase::Pre => "database-upgrade",
            UpgradePhase::Post => "online-data-migrations",
        }
    }
}

/// A version change that needs database migrations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upgrade {
    pub from: Version,
    pub to: Version,
}

/// The upgrade in progress, if any. Only records with a database and a
/// known installed version that differs from the target have one; a fresh
/// install lets Ironic create the schema itself.
pub fn pending_upgrade(
    installed: Option<&str>,
    target: Version,
    has_database: bool,
) -> Option<Upgrade> {
    if !has_database {
        return None;
    }
    let from: Version = installed?.trim().parse().ok()?;
    (from != target).then_some(Upgrade { from, to: target })
}

/// Name of the job running `phase` of `upgrade`.
pub fn upgrade_job_name(ironic: &Ironic, phase: UpgradePhase, upgrade: &Upgrade) -> String {
    format!(
        "{}-{}-{}-to-{}",
        ironic.name_any(),
        phase.as_str(),
        upgrade.from,
        upgrade.to
    )
}

/// Build the job running `phase` of `upgrade`.
pub fn upgrade_job(
    ironic: &Ironic,
    version: &VersionInfo,
    database: &DatabaseConnection,
    phase: UpgradePhase,
    upgrade: &Upgrade,
) -> Job {
    let labels = standard_labels(&ironic.name_any(), phase.component());

    let mut mounts = Vec::new();
    let mut volumes = Vec::new();
    if let Some(secret) = &database.tls_secret_name {
        mounts.push(mount(VOLUME_CERT_MARIADB, PATH_CERT_MARIADB, true));
        volumes.push(Volume {
            name: VOLUME_CERT_MARIADB.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret.clone()),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    let container = Container {
        name: "ironic-dbsync".to_string(),
        image: Some(version.ironic_image.clone()),
        command: Some(vec!["/bin/runironic-dbsync".to_string()]),
        args: Some(vec![phase.command().to_string()]),
        env: Some(database_env(database)),
        volume_mounts: (!mounts.is_empty()).then_some(mounts),
        security_context: Some(security_context(IRONIC_USER, IRONIC_GROUP, &[])),
        ..Default::default()
    };

    let node_selector = &ironic.spec.node_selector;
    Job {
        metadata: owned_metadata(
            ironic,
            upgrade_job_name(ironic, phase, upgrade),
            labels.clone(),
        ),
        spec: Some(JobSpec {
            ttl_seconds_after_finished: Some(JOB_TTL_SECONDS),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: (!volumes.is_empty()).then_some(volumes),
                    restart_policy: Some("OnFailure".to_string()),
                    node_selector: (!node_selector.is_empty()).then(|| node_selector.clone()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Read back the outcome of a job from its conditions.
pub fn job_status(job: &Job) -> Status {
    let name = job.name_any();
    let conditions = job
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default();
    for condition in conditions.iter().filter(|c| c.status == "True") {
        match condition.type_.as_str() {
            "Complete" => return Status::Ready,
            "Failed" => {
                return Status::deployment_failed(format!(
                    "job {} failed: {}",
                    name,
                    condition.message.as_deref().unwrap_or("no message")
                ));
            }
            _ => {}
        }
    }
    Status::in_progress(format!("job {} is running", name))
}
