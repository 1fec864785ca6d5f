//! ServiceMonitor generation for prometheus-operator integration.
//!
//! Scrapes the metrics port of the Ironic Service when the Prometheus
//! exporter is enabled. The CRD is optional: callers only create the
//! object after checking that `monitoring.coreos.com` is installed.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;
use kube::api::{ApiResource, GroupVersionKind};
use serde::{Deserialize, Serialize};

use crate::crd::{DEFAULT_SENSOR_COLLECTION_INTERVAL, Ironic};
use crate::resources::common::{
    ironic_service_monitor_name, owner_reference, standard_labels,
};

/// API group of prometheus-operator.
pub const MONITORING_GROUP: &str = "monitoring.coreos.com";
/// API version of ServiceMonitor.
pub const MONITORING_VERSION: &str = "v1";
/// Kind of ServiceMonitor.
pub const SERVICE_MONITOR_KIND: &str = "ServiceMonitor";

/// prometheus-operator ServiceMonitor, reduced to the fields we set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMonitor {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ServiceMonitorSpec,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMonitorSpec {
    /// Services to scrape.
    pub selector: LabelSelector,
    /// Ports to scrape on each Service.
    pub endpoints: Vec<Endpoint>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Name of the Service port.
    pub port: String,
    /// Scrape interval, e.g. `60s`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

/// ApiResource used to address ServiceMonitors through a dynamic API.
pub fn service_monitor_api_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind {
        group: MONITORING_GROUP.to_string(),
        version: MONITORING_VERSION.to_string(),
        kind: SERVICE_MONITOR_KIND.to_string(),
    })
}

/// Whether a ServiceMonitor should exist for this Ironic.
pub fn wants_service_monitor(ironic: &Ironic) -> bool {
    ironic
        .spec
        .prometheus_exporter
        .as_ref()
        .is_some_and(|p| p.enabled && !p.disable_service_monitor)
}

/// Generate the ServiceMonitor of an Ironic.
pub fn generate_service_monitor(ironic: &Ironic) -> ServiceMonitor {
    let labels = standard_labels(&ironic.name_any(), "ironic");
    let interval = ironic
        .spec
        .prometheus_exporter
        .as_ref()
        .and_then(|p| p.sensor_collection_interval)
        .unwrap_or(DEFAULT_SENSOR_COLLECTION_INTERVAL);

    ServiceMonitor {
        api_version: format!("{}/{}", MONITORING_GROUP, MONITORING_VERSION),
        kind: SERVICE_MONITOR_KIND.to_string(),
        metadata: ObjectMeta {
            name: Some(ironic_service_monitor_name(ironic)),
            namespace: ironic.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(ironic, true)]),
            ..Default::default()
        },
        spec: ServiceMonitorSpec {
            selector: LabelSelector {
                match_labels: Some(labels),
                ..Default::default()
            },
            endpoints: vec![Endpoint {
                port: "metrics".to_string(),
                interval: Some(format!("{}s", interval)),
            }],
        },
    }
}
