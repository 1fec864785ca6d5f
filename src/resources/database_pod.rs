//! Pod template of a managed MariaDB.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, PodSpec, PodTemplateSpec, Probe,
    SecretVolumeSource, Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::controller::secrets::{KEY_PASSWORD, KEY_USERNAME};
use crate::controller::version_info::VersionInfo;
use crate::crd::{DEFAULT_DATABASE_NAME, IronicDatabase};
use crate::resources::common::{
    DATABASE_PORT, LABEL_OWNER, database_deployment_name, standard_labels,
};
use crate::resources::container::{
    MARIADB_USER, env, env_from_secret, exec_probe, host_port, mount, security_context,
};

const VOLUME_DATA: &str = "mariadb-data";
const VOLUME_CERT: &str = "cert-mariadb";
const PATH_DATA: &str = "/var/lib/mysql";
const PATH_CERT: &str = "/certs/mariadb";

/// Pod labels of a managed database.
pub fn database_pod_labels(database: &IronicDatabase) -> BTreeMap<String, String> {
    let mut labels = standard_labels(&database.name_any(), "database");
    labels.insert(
        LABEL_OWNER.to_string(),
        database_deployment_name(&database.name_any()),
    );
    labels
}

fn status_probe() -> Probe {
    exec_probe(vec![
        "sh".to_string(),
        "-c".to_string(),
        "mysqladmin status -u\"$MARIADB_USER\" -p\"$MARIADB_PASSWORD\"".to_string(),
    ])
}

/// Compose the pod template of the MariaDB Deployment. `credentials_name`
/// is the Secret holding the user name and password.
pub fn database_pod_template(
    database: &IronicDatabase,
    version: &VersionInfo,
    credentials_name: &str,
) -> PodTemplateSpec {
    let tls = database.spec.tls_certificate_name();

    let mut vars = vec![
        env("MARIADB_DATABASE", DEFAULT_DATABASE_NAME),
        env_from_secret("MARIADB_USER", credentials_name, KEY_USERNAME),
        env_from_secret("MARIADB_PASSWORD", credentials_name, KEY_PASSWORD),
        env("MARIADB_HOST", "%"),
    ];
    let mut mounts = vec![mount(VOLUME_DATA, PATH_DATA, false)];
    let mut volumes = vec![Volume {
        name: VOLUME_DATA.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }];
    if let Some(secret) = tls {
        vars.push(env("MARIADB_TLS_ENABLED", "true"));
        mounts.push(mount(VOLUME_CERT, PATH_CERT, true));
        volumes.push(Volume {
            name: VOLUME_CERT.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    let probe = status_probe();
    let container = Container {
        name: "mariadb".to_string(),
        image: Some(version.mariadb_image.clone()),
        env: Some(vars),
        ports: Some(vec![ContainerPort {
            host_port: None,
            ..host_port("mariadb", DATABASE_PORT)
        }]),
        volume_mounts: Some(mounts),
        liveness_probe: Some(probe.clone()),
        readiness_probe: Some(probe),
        security_context: Some(security_context(MARIADB_USER, MARIADB_USER, &[])),
        ..Default::default()
    };

    let node_selector = &database.spec.node_selector;
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(database_pod_labels(database)),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![container],
            volumes: Some(volumes),
            node_selector: (!node_selector.is_empty()).then(|| node_selector.clone()),
            ..Default::default()
        }),
    }
}
