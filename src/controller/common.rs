//! Shared controller helpers.
//!
//! Finalizer handling and CRD discovery used by both the Ironic and the
//! IronicDatabase controllers.

use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::controller::error::{Error, Result};

/// Finalizer held by the operator on every record it manages.
pub const FINALIZER: &str = "ironic.metal3.io";

/// Whether the record carries our finalizer.
pub fn has_finalizer<T: Resource>(resource: &T) -> bool {
    resource.finalizers().iter().any(|f| f == FINALIZER)
}

/// Add `finalizer` unless the record already has it.
pub async fn add_finalizer<T>(api: &Api<T>, name: &str, finalizer: &str) -> Result<()>
where
    T: Resource + Clone + DeserializeOwned + std::fmt::Debug,
    <T as Resource>::DynamicType: Default,
{
    let resource = api
        .get(name)
        .await
        .map_err(|e| Error::kube("get", name.to_string(), e))?;
    if resource.finalizers().iter().any(|f| f == finalizer) {
        return Ok(());
    }
    let mut finalizers = resource.finalizers().to_vec();
    finalizers.push(finalizer.to_string());
    patch_finalizers(api, &resource, finalizers, "add finalizer to").await?;
    debug!(name = %name, finalizer = %finalizer, "Added finalizer");
    Ok(())
}

/// Drop `finalizer`. A record that is already gone is not an error.
pub async fn remove_finalizer<T>(api: &Api<T>, name: &str, finalizer: &str) -> Result<()>
where
    T: Resource + Clone + DeserializeOwned + std::fmt::Debug,
    <T as Resource>::DynamicType: Default,
{
    let Some(resource) = api
        .get_opt(name)
        .await
        .map_err(|e| Error::kube("get", name.to_string(), e))?
    else {
        return Ok(());
    };
    let finalizers: Vec<String> = resource
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != finalizer)
        .cloned()
        .collect();
    if finalizers.len() == resource.finalizers().len() {
        return Ok(());
    }
    patch_finalizers(api, &resource, finalizers, "remove finalizer from").await?;
    debug!(name = %name, finalizer = %finalizer, "Removed finalizer");
    Ok(())
}

/// Replace the finalizer list. The patch carries the resourceVersion that
/// was read, so a concurrent change yields 409 and the pass is retried.
async fn patch_finalizers<T>(
    api: &Api<T>,
    resource: &T,
    finalizers: Vec<String>,
    operation: &'static str,
) -> Result<()>
where
    T: Resource + Clone + DeserializeOwned + std::fmt::Debug,
    <T as Resource>::DynamicType: Default,
{
    let name = resource.name_any();
    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": resource.resource_version(),
        }
    });
    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(|e| Error::kube(operation, name, e))?;
    Ok(())
}

/// Whether the API server serves `kind` in `group`. Used once at start-up
/// to find optional CRDs such as ServiceMonitor.
pub async fn crd_installed(client: &Client, group: &str, kind: &str) -> bool {
    let groups = match client.list_api_groups().await {
        Ok(groups) => groups,
        Err(e) => {
            debug!(group = %group, error = %e, "Failed to list API groups");
            return false;
        }
    };
    let Some(api_group) = groups.groups.iter().find(|g| g.name == group) else {
        return false;
    };
    let Some(version) = api_group
        .preferred_version
        .as_ref()
        .or_else(|| api_group.versions.first())
    else {
        return false;
    };
    match client.list_api_group_resources(&version.group_version).await {
        Ok(resources) => resources.resources.iter().any(|r| r.kind == kind),
        Err(e) => {
            debug!(group = %group, error = %e, "Failed to list API group resources");
            false
        }
    }
}
