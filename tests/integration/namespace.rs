//! Throw-away namespaces, one per test.
//!
//! Dropping a [`TestNamespace`] deletes every Ironic and IronicDatabase in
//! it, strips their finalizers (the scoped operator is already gone by
//! then) and deletes the namespace in the background. Teardown blocks the
//! dropping thread, so tests need the multi-threaded runtime:
//! `#[tokio::test(flavor = "multi_thread")]`.

use std::fmt::Debug;

use ironic_standalone_operator::crd::{Ironic, IronicDatabase};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

const MANAGED_BY: &str = "app.kubernetes.io/managed-by";

pub struct TestNamespace {
    client: Client,
    name: String,
}

impl TestNamespace {
    /// Create `<prefix>-<8 hex chars>`.
    pub async fn create(client: Client, prefix: &str) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!("{}-{}", prefix, suffix.get(..8).unwrap_or(&suffix));

        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                labels: Some([(MANAGED_BY.to_string(), "integration-test".to_string())].into()),
                ..Default::default()
            },
            ..Default::default()
        };
        Api::<Namespace>::all(client.clone())
            .create(&PostParams::default(), &namespace)
            .await
            .unwrap_or_else(|e| panic!("failed to create namespace {}: {}", name, e));
        tracing::info!(namespace = %name, "Created test namespace");

        Self { client, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.name)
    }

    async fn teardown(client: Client, name: String) {
        purge::<Ironic>(&client, &name).await;
        purge::<IronicDatabase>(&client, &name).await;

        match Api::<Namespace>::all(client)
            .delete(&name, &DeleteParams::background())
            .await
        {
            Ok(_) => tracing::debug!(namespace = %name, "Namespace deletion started"),
            Err(kube::Error::Api(e)) if e.code == 404 => {}
            Err(e) => tracing::warn!(namespace = %name, "Failed to delete namespace: {}", e),
        }
    }
}

/// Delete all records of kind `K` in `namespace` and release them.
async fn purge<K>(client: &Client, namespace: &str)
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    <K as Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    if let Err(e) = api
        .delete_collection(&DeleteParams::default(), &ListParams::default())
        .await
    {
        tracing::debug!(namespace = %namespace, "Failed to delete records: {}", e);
    }

    let Ok(remaining) = api.list(&ListParams::default()).await else {
        return;
    };
    let release = Patch::Merge(json!({ "metadata": { "finalizers": null } }));
    for record in remaining.items.iter().filter(|r| !r.finalizers().is_empty()) {
        let name = record.name_any();
        if let Err(e) = api.patch(&name, &PatchParams::default(), &release).await {
            tracing::warn!(namespace = %namespace, name = %name, "Failed to release record: {}", e);
        }
    }
}

impl Drop for TestNamespace {
    fn drop(&mut self) {
        let client = self.client.clone();
        let name = std::mem::take(&mut self.name);
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(Self::teardown(client, name));
        });
    }
}
