//! Service generation.
//!
//! Creates one ClusterIP Service per workload:
//! - **Ironic Service**: API, image server and (optionally) metrics ports
//! - **Database Service**: MariaDB on 3306

use std::net::IpAddr;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::controller::status::Status;
use crate::crd::{Ironic, IronicDatabase};
use crate::resources::common::{
    DATABASE_PORT, database_deployment_name, database_service_name, ironic_deployment_name,
    ironic_service_name, owned_metadata, selector_labels, standard_labels,
};
use crate::resources::ensure::merge_metadata;
use crate::resources::ironic_pod::EXPORTER_PORT;

fn tcp_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

/// Ports exposed by the Ironic Service.
pub fn ironic_service_ports(ironic: &Ironic) -> Vec<ServicePort> {
    let networking = &ironic.spec.networking;
    let mut ports = vec![
        tcp_port("api", networking.api_port),
        tcp_port("image-svc", networking.image_server_port),
    ];
    if ironic.spec.tls.virtual_media_tls() {
        ports.push(tcp_port("image-svc-tls", networking.image_server_tls_port));
    }
    if ironic.spec.high_availability {
        ports.push(tcp_port("json-rpc", networking.rpc_port));
    }
    if ironic
        .spec
        .prometheus_exporter
        .as_ref()
        .is_some_and(|p| p.enabled)
    {
        ports.push(tcp_port("metrics", EXPORTER_PORT));
    }
    ports
}

/// Generate the Service in front of Ironic.
pub fn generate_ironic_service(ironic: &Ironic) -> Service {
    Service {
        metadata: owned_metadata(
            ironic,
            ironic_service_name(ironic),
            standard_labels(&ironic.name_any(), "ironic"),
        ),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector_labels(&ironic_deployment_name(ironic))),
            ports: Some(ironic_service_ports(ironic)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the Service in front of a managed database.
pub fn generate_database_service(database: &IronicDatabase) -> Service {
    let name = database.name_any();
    Service {
        metadata: owned_metadata(
            database,
            database_service_name(&name),
            standard_labels(&name, "database"),
        ),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector_labels(&database_deployment_name(&name))),
            ports: Some(vec![tcp_port("mariadb", DATABASE_PORT)]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Copy the managed fields of a desired Service. Cluster IPs and other
/// server-assigned fields are kept.
pub fn mutate_service(existing: &mut Service, desired: &Service) {
    merge_metadata(&mut existing.metadata, &desired.metadata);
    let Some(wanted) = &desired.spec else {
        return;
    };
    let spec = existing.spec.get_or_insert_with(Default::default);
    spec.type_ = wanted.type_.clone();
    spec.selector = wanted.selector.clone();
    spec.ports = wanted.ports.clone();
}

/// Cluster IPs assigned to a Service, if any.
pub fn cluster_ips(service: &Service) -> Vec<IpAddr> {
    let Some(spec) = &service.spec else {
        return Vec::new();
    };
    let mut ips: Vec<&str> = spec.cluster_ips.iter().flatten().map(String::as_str).collect();
    if ips.is_empty()
        && let Some(ip) = &spec.cluster_ip
    {
        ips.push(ip);
    }
    ips.into_iter().filter_map(|ip| ip.parse().ok()).collect()
}

/// A Service is available once it has a cluster IP.
pub fn service_status(service: &Service) -> Status {
    if cluster_ips(service).is_empty() {
        Status::in_progress(format!(
            "service {} has no cluster IP yet",
            service.name_any()
        ))
    } else {
        Status::Ready
    }
}
