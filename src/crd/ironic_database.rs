//! IronicDatabase Custom Resource Definition.
//!
//! A managed single-replica MariaDB for one or more Ironic records in the
//! same namespace.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;
use super::ironic::non_empty;

/// IronicDatabase deploys MariaDB for Ironic.
///
/// Example:
/// ```yaml
/// apiVersion: ironic.metal3.io/v1alpha1
/// kind: IronicDatabase
/// metadata:
///   name: ironic-db
/// spec:
///   tlsCertificateName: ironic-db-cert
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ironic.metal3.io",
    version = "v1alpha1",
    kind = "IronicDatabase",
    plural = "ironicdatabases",
    status = "IronicDatabaseStatus",
    namespaced,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IronicDatabaseSpec {
    /// MariaDB image override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Secret with database credentials (username, password).
    /// Generated automatically when empty. Cannot be changed once set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_name: Option<String>,

    /// Secret of type kubernetes.io/tls for the database server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_certificate_name: Option<String>,

    /// Node selector for the database pod.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
}

impl IronicDatabaseSpec {
    pub fn credentials_name(&self) -> Option<&str> {
        non_empty(&self.credentials_name)
    }

    pub fn tls_certificate_name(&self) -> Option<&str> {
        non_empty(&self.tls_certificate_name)
    }
}

/// Observed state of an IronicDatabase.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IronicDatabaseStatus {
    /// Conditions describing the current state.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Fully qualified DNS name of the database service.
    #[serde(default, rename = "serviceDNSName", skip_serializing_if = "Option::is_none")]
    pub service_dns_name: Option<String>,

    /// Credentials secret bound to this database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_name: Option<String>,

    /// The generation most recently observed by the controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
