//! Resource assertion helpers for integration tests.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::Client;
use kube::api::Api;

/// Assert that a Deployment exists and return the names of its containers.
pub async fn assert_deployment_containers(
    client: Client,
    namespace: &str,
    name: &str,
) -> Vec<String> {
    let api: Api<Deployment> = Api::namespaced(client, namespace);
    let deployment = api
        .get(name)
        .await
        .unwrap_or_else(|e| panic!("Failed to get Deployment {}/{}: {}", namespace, name, e));
    deployment
        .spec
        .and_then(|s| s.template.spec)
        .map(|s| s.containers.into_iter().map(|c| c.name).collect())
        .unwrap_or_default()
}

/// Assert that a Service exists and exposes exactly `ports`.
pub async fn assert_service_ports(client: Client, namespace: &str, name: &str, ports: &[i32]) {
    let api: Api<Service> = Api::namespaced(client, namespace);
    let service = api
        .get(name)
        .await
        .unwrap_or_else(|e| panic!("Failed to get Service {}/{}: {}", namespace, name, e));
    let actual: Vec<i32> = service
        .spec
        .and_then(|s| s.ports)
        .unwrap_or_default()
        .iter()
        .map(|p| p.port)
        .collect();
    assert_eq!(
        actual, ports,
        "Service {}/{} ports mismatch",
        namespace, name
    );
}

/// Assert that an object is owned by the record with `uid`, with the
/// expected controller flag.
pub fn assert_owned_by(meta: &kube::api::ObjectMeta, uid: &str, controller: bool) {
    let owner = meta
        .owner_references
        .as_ref()
        .and_then(|refs| refs.iter().find(|r| r.uid == uid))
        .unwrap_or_else(|| panic!("{:?} is not owned by {}", meta.name, uid));
    assert_eq!(owner.controller.unwrap_or(false), controller);
}
