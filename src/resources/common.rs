//! Common resource generation utilities.
//!
//! Names, labels and owner references shared by every generated object.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::crd::{Ironic, IronicDatabase};

/// Label identifying the pods of one workload. Also the selector.
pub const LABEL_OWNER: &str = "metal3.io/ironic-standalone-operator";

/// Label that makes a Secret or ConfigMap visible to the operator's caches.
pub const LABEL_ENVIRONMENT: &str = "environment.metal3.io/ironic-standalone-operator";

/// Value of [`LABEL_ENVIRONMENT`].
pub const LABEL_ENVIRONMENT_VALUE: &str = "true";

/// Value of `app.kubernetes.io/managed-by`.
pub const MANAGED_BY: &str = "ironic-standalone-operator";

/// Port of the database service.
pub const DATABASE_PORT: i32 = 3306;

/// Name of the Deployment or DaemonSet running Ironic.
pub fn ironic_deployment_name(ironic: &Ironic) -> String {
    format!("{}-service", ironic.name_any())
}

/// Name of the Service in front of Ironic.
pub fn ironic_service_name(ironic: &Ironic) -> String {
    ironic.name_any()
}

/// Name of the ServiceMonitor scraping Ironic.
pub fn ironic_service_monitor_name(ironic: &Ironic) -> String {
    ironic.name_any()
}

/// Name of the generated API credentials Secret.
pub fn api_credentials_secret_name(ironic: &Ironic) -> String {
    format!("{}-api-credentials", ironic.name_any())
}

/// Name of the Deployment running MariaDB.
pub fn database_deployment_name(db_name: &str) -> String {
    format!("{}-database", db_name)
}

/// Name of the Service in front of MariaDB.
pub fn database_service_name(db_name: &str) -> String {
    database_deployment_name(db_name)
}

/// Name of the generated database credentials Secret.
pub fn database_credentials_secret_name(database: &IronicDatabase) -> String {
    format!("{}-credentials", database.name_any())
}

/// Fully qualified DNS name of a managed database service.
pub fn database_service_dns_name(db_name: &str, namespace: &str, cluster_domain: &str) -> String {
    format!(
        "{}.{}.svc.{}",
        database_service_name(db_name),
        namespace,
        cluster_domain
    )
}

/// Labels applied to all managed objects of one record.
pub fn standard_labels(instance: &str, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), "ironic".to_string()),
        ("app.kubernetes.io/instance".to_string(), instance.to_string()),
        ("app.kubernetes.io/component".to_string(), component.to_string()),
        (
            "app.kubernetes.io/managed-by".to_string(),
            MANAGED_BY.to_string(),
        ),
    ])
}

/// Selector labels of a workload.
pub fn selector_labels(deployment_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(LABEL_OWNER.to_string(), deployment_name.to_string())])
}

/// Owner reference to a record. Only one owner of an object may be the
/// controller; shared objects such as credential Secrets use `controller: false`.
pub fn owner_reference<K>(resource: &K, controller: bool) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: resource.name_any(),
        uid: resource.uid().unwrap_or_default(),
        controller: controller.then_some(true),
        block_owner_deletion: controller.then_some(true),
    }
}

/// Metadata of an object controlled by a record.
pub fn owned_metadata<K>(
    resource: &K,
    name: String,
    labels: BTreeMap<String, String>,
) -> ObjectMeta
where
    K: Resource<DynamicType = ()>,
{
    ObjectMeta {
        name: Some(name),
        namespace: resource.namespace(),
        labels: Some(labels),
        owner_references: Some(vec![owner_reference(resource, true)]),
        ..Default::default()
    }
}

/// Make sure `meta` lists `owner`, comparing by UID. Returns true if it was added.
pub fn ensure_owner_reference(meta: &mut ObjectMeta, owner: OwnerReference) -> bool {
    let references = meta.owner_references.get_or_insert_with(Vec::new);
    if references.iter().any(|r| r.uid == owner.uid) {
        return false;
    }
    references.push(owner);
    true
}

/// Make sure `meta` carries the environment label. Returns true if it was added.
pub fn ensure_environment_label(meta: &mut ObjectMeta) -> bool {
    let labels = meta.labels.get_or_insert_with(BTreeMap::new);
    if labels.get(LABEL_ENVIRONMENT).map(String::as_str) == Some(LABEL_ENVIRONMENT_VALUE) {
        return false;
    }
    labels.insert(
        LABEL_ENVIRONMENT.to_string(),
        LABEL_ENVIRONMENT_VALUE.to_string(),
    );
    true
}
