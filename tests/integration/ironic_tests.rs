//! Ironic records against a live cluster.

use std::time::Duration;

use ironic_standalone_operator::crd::{Ironic, IronicSpec};
use ironic_standalone_operator::resources::ironic_pod::ANNOTATION_API_SECRET_VERSION;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use kube::api::{Api, DeleteParams, PostParams};

use crate::{
    IronicBuilder, ScopedOperator, TestNamespace, assert_deployment_containers, assert_owned_by,
    assert_service_ports, has_finalizer, ironic_ready, test_client, wait_for_condition,
    wait_for_deletion, wait_for_resource,
};

const SHORT: Duration = Duration::from_secs(60);
// Image pulls and the ramdisk download dominate.
const LONG: Duration = Duration::from_secs(600);

fn record(namespace: &str, builder: IronicBuilder) -> Ironic {
    let mut ironic = builder.namespace(namespace).build();
    // Server-assigned fields must not be sent on create.
    ironic.metadata.uid = None;
    ironic.metadata.generation = None;
    ironic.status = None;
    ironic
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Kubernetes cluster with CRDs installed"]
async fn test_minimal_ironic_creates_resources() {
    let client = test_client().await;
    let ns = TestNamespace::create(client.clone(), "ironic-minimal").await;
    let _operator = ScopedOperator::start(client.clone(), ns.name()).await;

    let api: Api<Ironic> = ns.api();
    let created = api
        .create(
            &PostParams::default(),
            &record(ns.name(), IronicBuilder::new("ironic")),
        )
        .await
        .unwrap();
    let uid = created.uid().unwrap();

    // Credentials are generated and the record points at them.
    let ironic = wait_for_condition(
        &api,
        "ironic",
        |i: &Ironic| i.spec.api_credentials_name == "ironic-api-credentials",
        SHORT,
    )
    .await
    .unwrap();
    assert!(has_finalizer(&ironic));

    let secrets: Api<Secret> = ns.api();
    let secret = wait_for_resource(&secrets, "ironic-api-credentials", SHORT)
        .await
        .unwrap();
    assert_owned_by(&secret.metadata, &uid, false);
    let data = secret.data.unwrap();
    assert!(data.contains_key("htpasswd"));

    let deployments: Api<Deployment> = ns.api();
    let deployment = wait_for_resource(&deployments, "ironic-service", SHORT)
        .await
        .unwrap();
    assert_owned_by(&deployment.metadata, &uid, true);
    assert_eq!(
        assert_deployment_containers(client.clone(), ns.name(), "ironic-service").await,
        vec!["ironic", "httpd", "ramdisk-logs"]
    );
    assert_service_ports(client.clone(), ns.name(), "ironic", &[6385, 6180]).await;

    let ironic = wait_for_condition(&api, "ironic", ironic_ready, LONG)
        .await
        .unwrap();
    let status = ironic.status.unwrap();
    assert_eq!(status.installed_version.as_deref(), Some("latest"));
    assert!(!status.endpoints.is_empty());

    // The pod template carries the version of the Secret as last written.
    let secret = secrets.get("ironic-api-credentials").await.unwrap();
    let deployment = deployments.get("ironic-service").await.unwrap();
    let annotations = deployment
        .spec
        .and_then(|s| s.template.metadata)
        .and_then(|m| m.annotations)
        .unwrap_or_default();
    assert_eq!(
        annotations.get(ANNOTATION_API_SECRET_VERSION),
        secret.metadata.resource_version.as_ref()
    );
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Kubernetes cluster with CRDs installed"]
async fn test_invalid_ironic_reports_failure() {
    let client = test_client().await;
    let ns = TestNamespace::create(client.clone(), "ironic-invalid").await;
    let _operator = ScopedOperator::start(client.clone(), ns.name()).await;

    let api: Api<Ironic> = ns.api();
    // Without the webhook in front, the reconciler has to catch this.
    let ironic = record(ns.name(), IronicBuilder::new("ironic").high_availability());
    api.create(&PostParams::default(), &ironic).await.unwrap();

    let ironic = wait_for_condition(
        &api,
        "ironic",
        |i: &Ironic| {
            i.status
                .as_ref()
                .and_then(|s| s.conditions.iter().find(|c| c.r#type == "Ready"))
                .is_some_and(|c| c.reason == "DeploymentFailed")
        },
        SHORT,
    )
    .await
    .unwrap();
    let ready = crate::ready_condition(ironic.status.as_ref().unwrap()).unwrap();
    assert!(ready.message.contains("spec.highAvailability"));

    let deployments: Api<Deployment> = ns.api();
    assert!(deployments.get_opt("ironic-service").await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Kubernetes cluster with CRDs installed"]
async fn test_missing_tls_secret_waits() {
    let client = test_client().await;
    let ns = TestNamespace::create(client.clone(), "ironic-tls").await;
    let _operator = ScopedOperator::start(client.clone(), ns.name()).await;

    let api: Api<Ironic> = ns.api();
    let ironic = record(ns.name(), IronicBuilder::new("ironic").tls("ironic-tls"));
    api.create(&PostParams::default(), &ironic).await.unwrap();

    let ironic = wait_for_condition(
        &api,
        "ironic",
        |i: &Ironic| {
            i.status
                .as_ref()
                .and_then(|s| s.conditions.iter().find(|c| c.r#type == "Ready"))
                .is_some_and(|c| c.message.contains("ironic-tls"))
        },
        SHORT,
    )
    .await
    .unwrap();
    assert!(!ironic_ready(&ironic));

    let deployments: Api<Deployment> = ns.api();
    assert!(deployments.get_opt("ironic-service").await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Kubernetes cluster with CRDs installed"]
async fn test_deletion_releases_finalizer() {
    let client = test_client().await;
    let ns = TestNamespace::create(client.clone(), "ironic-delete").await;
    let _operator = ScopedOperator::start(client.clone(), ns.name()).await;

    let api: Api<Ironic> = ns.api();
    let ironic = Ironic::new("ironic", IronicSpec::default());
    api.create(&PostParams::default(), &ironic).await.unwrap();
    wait_for_condition(&api, "ironic", |i: &Ironic| has_finalizer(i), SHORT)
        .await
        .unwrap();

    api.delete("ironic", &DeleteParams::default()).await.unwrap();
    wait_for_deletion(&api, "ironic", SHORT).await.unwrap();
}
