//! Resource ensurer.
//!
//! Create-or-update of owned objects. The object is read by name; a missing
//! object is created as desired, an existing one is passed through a
//! mutator that copies the managed fields over and is only written back
//! when the mutator actually changed something. Fields defaulted or
//! assigned by the API server (cluster IPs, pod template defaults) survive
//! because mutators never touch them.

use std::fmt::Debug;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::controller::context::FIELD_MANAGER;
use crate::controller::error::{Error, Result};
use crate::controller::status::Status;
use crate::resources::common::ensure_owner_reference;

/// Annotation holding the hash of the desired pod template.
pub const ANNOTATION_TEMPLATE_HASH: &str = "ironic.metal3.io/template-hash";

/// What the ensurer did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Unchanged,
}

impl Outcome {
    /// Whether the object was written.
    pub fn changed(self) -> bool {
        !matches!(self, Outcome::Unchanged)
    }

    /// `Updated` status for a written object, `None` otherwise.
    pub fn status(self, what: &str) -> Option<Status> {
        match self {
            Outcome::Created => Some(Status::updated(format!("{} created", what))),
            Outcome::Updated => Some(Status::updated(format!("{} updated", what))),
            Outcome::Unchanged => None,
        }
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

fn describe<K>(object: &K) -> String
where
    K: Resource<DynamicType = ()>,
{
    format!(
        "{} {}/{}",
        K::kind(&()).to_lowercase(),
        object.namespace().unwrap_or_default(),
        object.name_any()
    )
}

/// Create `desired` or bring the existing object in line with it.
///
/// `mutate(existing, desired)` copies the managed fields of `desired` into
/// `existing`. Owner references of `desired` are merged in by UID.
pub async fn create_or_update<K, F>(api: &Api<K>, desired: K, mutate: F) -> Result<(K, Outcome)>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Debug,
    F: FnOnce(&mut K, &K),
{
    let name = desired.name_any();
    let object = describe(&desired);

    let Some(existing) = api
        .get_opt(&name)
        .await
        .map_err(|e| Error::kube("get", object.clone(), e))?
    else {
        let created = api
            .create(&post_params(), &desired)
            .await
            .map_err(|e| Error::kube("create", object.clone(), e))?;
        info!(object = %object, "Created");
        return Ok((created, Outcome::Created));
    };

    let mut updated = existing.clone();
    mutate(&mut updated, &desired);
    for owner in desired.owner_references() {
        ensure_owner_reference(updated.meta_mut(), owner.clone());
    }

    if serde_json::to_value(&updated)? == serde_json::to_value(&existing)? {
        debug!(object = %object, "Unchanged");
        return Ok((existing, Outcome::Unchanged));
    }

    let written = api
        .replace(&name, &post_params(), &updated)
        .await
        .map_err(|e| Error::kube("update", object.clone(), e))?;
    info!(object = %object, "Updated");
    Ok((written, Outcome::Updated))
}

/// Delete an object if it exists. Returns true if a deletion was issued.
pub async fn delete_if_exists<K>(api: &Api<K>, name: &str) -> Result<bool>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::background()).await {
        Ok(_) => {
            info!(kind = %K::kind(&()), name = %name, "Deleted");
            Ok(true)
        }
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
        Err(e) => Err(Error::kube("delete", format!("{} {}", K::kind(&()), name), e)),
    }
}

/// Copy labels and annotations of `desired` over `existing`, keeping keys
/// added by other parties.
pub fn merge_metadata(existing: &mut ObjectMeta, desired: &ObjectMeta) {
    if let Some(labels) = &desired.labels {
        existing
            .labels
            .get_or_insert_with(Default::default)
            .extend(labels.clone());
    }
    if let Some(annotations) = &desired.annotations {
        existing
            .annotations
            .get_or_insert_with(Default::default)
            .extend(annotations.clone());
    }
}

/// SHA-256 of a pod template, ignoring any hash annotation it already carries.
pub fn template_hash(template: &PodTemplateSpec) -> Result<String> {
    let mut template = template.clone();
    if let Some(metadata) = template.metadata.as_mut()
        && let Some(annotations) = metadata.annotations.as_mut()
    {
        annotations.remove(ANNOTATION_TEMPLATE_HASH);
        if annotations.is_empty() {
            metadata.annotations = None;
        }
    }
    if template.metadata.as_ref() == Some(&ObjectMeta::default()) {
        template.metadata = None;
    }
    let bytes = serde_json::to_vec(&template)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Annotate a template with its own hash.
pub fn with_template_hash(mut template: PodTemplateSpec) -> Result<PodTemplateSpec> {
    let hash = template_hash(&template)?;
    template
        .metadata
        .get_or_insert_with(Default::default)
        .annotations
        .get_or_insert_with(Default::default)
        .insert(ANNOTATION_TEMPLATE_HASH.to_string(), hash);
    Ok(template)
}

fn recorded_hash(template: &PodTemplateSpec) -> Option<&str> {
    template
        .metadata
        .as_ref()?
        .annotations
        .as_ref()?
        .get(ANNOTATION_TEMPLATE_HASH)
        .map(String::as_str)
}

/// Replace `existing` with `desired` unless both carry the same hash.
/// Returns true if the template was replaced.
pub fn sync_template(existing: &mut PodTemplateSpec, desired: &PodTemplateSpec) -> bool {
    let current = recorded_hash(existing);
    if current.is_some() && current == recorded_hash(desired) {
        return false;
    }
    *existing = desired.clone();
    true
}
