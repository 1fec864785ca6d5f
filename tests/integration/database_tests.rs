//! IronicDatabase records against a live cluster.

use std::time::Duration;

use ironic_standalone_operator::crd::{Ironic, IronicDatabase};
use ironic_standalone_operator::resources::common::{LABEL_ENVIRONMENT, LABEL_ENVIRONMENT_VALUE};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use kube::api::{Api, DeleteParams, PostParams};

use crate::{
    IronicBuilder, IronicDatabaseBuilder, ScopedOperator, TestNamespace, assert_owned_by,
    database_ready, has_finalizer, test_client, wait_for_condition, wait_for_deletion,
    wait_for_resource,
};

const SHORT: Duration = Duration::from_secs(60);
const LONG: Duration = Duration::from_secs(300);

fn database_record(namespace: &str) -> IronicDatabase {
    let mut database = IronicDatabaseBuilder::new("idb").namespace(namespace).build();
    database.metadata.uid = None;
    database.metadata.generation = None;
    database
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Kubernetes cluster with CRDs installed"]
async fn test_database_becomes_ready() {
    let client = test_client().await;
    let ns = TestNamespace::create(client.clone(), "idb-ready").await;
    let _operator = ScopedOperator::start(client.clone(), ns.name()).await;

    let api: Api<IronicDatabase> = ns.api();
    let created = api
        .create(&PostParams::default(), &database_record(ns.name()))
        .await
        .unwrap();
    let uid = created.uid().unwrap();

    let secrets: Api<Secret> = ns.api();
    let secret = wait_for_resource(&secrets, "idb-credentials", SHORT)
        .await
        .unwrap();
    assert_owned_by(&secret.metadata, &uid, false);

    let deployments: Api<Deployment> = ns.api();
    let deployment = wait_for_resource(&deployments, "idb-database", SHORT)
        .await
        .unwrap();
    assert_owned_by(&deployment.metadata, &uid, true);

    let database = wait_for_condition(&api, "idb", database_ready, LONG)
        .await
        .unwrap();
    let status = database.status.unwrap();
    assert_eq!(status.credentials_name.as_deref(), Some("idb-credentials"));
    assert_eq!(
        status.service_dns_name,
        Some(format!("idb-database.{}.svc.cluster.local", ns.name()))
    );
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Kubernetes cluster with CRDs installed"]
async fn test_database_in_use_blocks_deletion() {
    let client = test_client().await;
    let ns = TestNamespace::create(client.clone(), "idb-in-use").await;
    let _operator = ScopedOperator::start(client.clone(), ns.name()).await;

    let databases: Api<IronicDatabase> = ns.api();
    databases
        .create(&PostParams::default(), &database_record(ns.name()))
        .await
        .unwrap();
    wait_for_condition(&databases, "idb", |d: &IronicDatabase| has_finalizer(d), SHORT)
        .await
        .unwrap();

    let ironics: Api<Ironic> = ns.api();
    let mut ironic = IronicBuilder::new("ironic")
        .namespace(ns.name())
        .managed_database("idb")
        .build();
    ironic.metadata.uid = None;
    ironic.metadata.generation = None;
    ironics
        .create(&PostParams::default(), &ironic)
        .await
        .unwrap();

    databases
        .delete("idb", &DeleteParams::default())
        .await
        .unwrap();
    let database = wait_for_condition(
        &databases,
        "idb",
        |d: &IronicDatabase| {
            d.status.as_ref().is_some_and(|s| {
                s.conditions
                    .iter()
                    .any(|c| c.message.contains("still used by ironic"))
            })
        },
        SHORT,
    )
    .await
    .unwrap();
    assert!(database.metadata.deletion_timestamp.is_some());
    assert!(has_finalizer(&database));

    // Once the Ironic is gone the database follows.
    ironics
        .delete("ironic", &DeleteParams::default())
        .await
        .unwrap();
    wait_for_deletion(&ironics, "ironic", SHORT).await.unwrap();
    wait_for_deletion(&databases, "idb", SHORT).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Kubernetes cluster with CRDs installed"]
async fn test_ironic_co_owns_database_credentials() {
    let client = test_client().await;
    let ns = TestNamespace::create(client.clone(), "idb-owners").await;
    let _operator = ScopedOperator::start(client.clone(), ns.name()).await;

    let databases: Api<IronicDatabase> = ns.api();
    let database = databases
        .create(&PostParams::default(), &database_record(ns.name()))
        .await
        .unwrap();
    let database_uid = database.uid().unwrap();
    wait_for_condition(&databases, "idb", database_ready, LONG)
        .await
        .unwrap();

    let ironics: Api<Ironic> = ns.api();
    let mut ironic = IronicBuilder::new("ironic")
        .namespace(ns.name())
        .managed_database("idb")
        .build();
    ironic.metadata.uid = None;
    ironic.metadata.generation = None;
    let ironic_uid = ironics
        .create(&PostParams::default(), &ironic)
        .await
        .unwrap()
        .uid()
        .unwrap();

    let secrets: Api<Secret> = ns.api();
    let secret = wait_for_condition(
        &secrets,
        "idb-credentials",
        |s: &Secret| s.owner_references().iter().any(|o| o.uid == ironic_uid),
        SHORT,
    )
    .await
    .unwrap();
    assert_owned_by(&secret.metadata, &database_uid, false);
    assert_owned_by(&secret.metadata, &ironic_uid, false);
    assert_eq!(
        secret.labels().get(LABEL_ENVIRONMENT).map(String::as_str),
        Some(LABEL_ENVIRONMENT_VALUE)
    );
}
