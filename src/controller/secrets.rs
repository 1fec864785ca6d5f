//! Secret manager.
//!
//! Looks up the Secrets and ConfigMaps referenced by records, makes sure they
//! carry the environment label (so they enter the operator's filtered cache)
//! and list the record as an owner, generates credentials when none were
//! supplied and keeps the `htpasswd` key in sync with the password.

use std::collections::BTreeMap;
use std::fmt::Debug;

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::PostParams;
use kube::runtime::reflector::ObjectRef;
use kube::{Api, Resource, ResourceExt};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::controller::context::{Context, FIELD_MANAGER};
use crate::controller::error::{Error, Result};
use crate::resources::common::{
    ensure_environment_label, ensure_owner_reference, owner_reference, standard_labels,
};

/// Key holding the user name.
pub const KEY_USERNAME: &str = "username";
/// Key holding the password.
pub const KEY_PASSWORD: &str = "password";
/// Key holding the derived htpasswd entry.
pub const KEY_HTPASSWD: &str = "htpasswd";
/// Key holding a TLS certificate.
pub const KEY_TLS_CERT: &str = "tls.crt";
/// Key holding a TLS private key.
pub const KEY_TLS_KEY: &str = "tls.key";

const USERNAME_LENGTH: usize = 12;
const PASSWORD_LENGTH: usize = 32;
const BCRYPT_COST: u32 = 10;

/// User name and password read from a Secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn random_string(length: usize) -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Generate fresh random credentials.
pub fn generate_credentials() -> Credentials {
    Credentials {
        username: random_string(USERNAME_LENGTH),
        password: random_string(PASSWORD_LENGTH),
    }
}

fn secret_value(secret: &Secret, key: &str) -> Result<Option<String>> {
    let Some(value) = secret.data.as_ref().and_then(|d| d.get(key)) else {
        return Ok(None);
    };
    String::from_utf8(value.0.clone()).map(Some).map_err(|_| {
        Error::Validation(format!(
            "secret {}: key {} is not valid UTF-8",
            secret.name_any(),
            key
        ))
    })
}

/// Read and sanitize credentials. Surrounding whitespace is dropped and the
/// user name must consist of letters and digits only.
pub fn read_credentials(secret: &Secret) -> Result<Credentials> {
    let name = secret.name_any();
    let username = secret_value(secret, KEY_USERNAME)?
        .ok_or_else(|| Error::MissingField(format!("secret {}: key {}", name, KEY_USERNAME)))?;
    let password = secret_value(secret, KEY_PASSWORD)?
        .ok_or_else(|| Error::MissingField(format!("secret {}: key {}", name, KEY_PASSWORD)))?;

    let username = username.trim().to_string();
    let password = password.trim().to_string();
    if username.is_empty() || !username.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::Validation(format!(
            "secret {}: username must contain only letters and digits",
            name
        )));
    }
    if password.is_empty() {
        return Err(Error::Validation(format!(
            "secret {}: password must not be empty",
            name
        )));
    }
    Ok(Credentials { username, password })
}

/// Check that a TLS Secret carries both a certificate and a key.
pub fn check_tls_secret(secret: &Secret) -> Result<()> {
    let name = secret.name_any();
    for key in [KEY_TLS_CERT, KEY_TLS_KEY] {
        if secret_value(secret, key)?.is_none_or(|v| v.trim().is_empty()) {
            return Err(Error::MissingField(format!("secret {}: key {}", name, key)));
        }
    }
    Ok(())
}

/// Build an htpasswd line `user:$2y$...` for the credentials.
pub fn htpasswd_entry(credentials: &Credentials) -> Result<String> {
    let hashed = bcrypt::hash_with_result(&credentials.password, BCRYPT_COST)?
        .format_for_version(bcrypt::Version::TwoY);
    Ok(format!("{}:{}", credentials.username, hashed))
}

/// Whether an htpasswd line still matches the credentials.
pub fn htpasswd_matches(credentials: &Credentials, entry: &str) -> bool {
    let Some((username, hash)) = entry.trim().split_once(':') else {
        return false;
    };
    username == credentials.username
        && bcrypt::verify(&credentials.password, hash).unwrap_or(false)
}

/// Make sure the Secret has an up-to-date `htpasswd` key.
/// Returns true if the Secret was modified and needs to be written.
pub fn update_htpasswd(secret: &mut Secret) -> Result<bool> {
    let credentials = read_credentials(secret)?;
    if let Some(existing) = secret_value(secret, KEY_HTPASSWD)?
        && htpasswd_matches(&credentials, &existing)
    {
        return Ok(false);
    }
    let entry = htpasswd_entry(&credentials)?;
    secret
        .data
        .get_or_insert_with(BTreeMap::new)
        .insert(KEY_HTPASSWD.to_string(), ByteString(entry.into_bytes()));
    Ok(true)
}

/// Build a new credentials Secret owned (non-exclusively) by `owner`.
pub fn new_credentials_secret<K>(
    owner: &K,
    name: String,
    component: &str,
    credentials: &Credentials,
    with_htpasswd: bool,
) -> Result<Secret>
where
    K: Resource<DynamicType = ()>,
{
    let mut data = BTreeMap::from([
        (
            KEY_USERNAME.to_string(),
            ByteString(credentials.username.clone().into_bytes()),
        ),
        (
            KEY_PASSWORD.to_string(),
            ByteString(credentials.password.clone().into_bytes()),
        ),
    ]);
    if with_htpasswd {
        data.insert(
            KEY_HTPASSWD.to_string(),
            ByteString(htpasswd_entry(credentials)?.into_bytes()),
        );
    }

    let mut metadata = ObjectMeta {
        name: Some(name),
        namespace: owner.namespace(),
        labels: Some(standard_labels(&owner.name_any(), component)),
        owner_references: Some(vec![owner_reference(owner, false)]),
        ..Default::default()
    };
    ensure_environment_label(&mut metadata);

    Ok(Secret {
        metadata,
        data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    })
}

/// Create a credentials Secret. An existing Secret with the same name is
/// adopted instead, so a retry after a failed record update is harmless.
pub async fn create_credentials_secret(ctx: &Context, secret: Secret) -> Result<Secret> {
    let namespace = secret.namespace().unwrap_or_default();
    let name = secret.name_any();
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &namespace);
    let params = PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    };
    match api.create(&params, &secret).await {
        Ok(created) => {
            info!(namespace = %namespace, name = %name, "Created credentials secret");
            Ok(created)
        }
        Err(kube::Error::Api(e)) if e.code == 409 => {
            debug!(namespace = %namespace, name = %name, "Credentials secret already exists");
            api.get(&name)
                .await
                .map_err(|e| Error::kube("get", format!("secret {}/{}", namespace, name), e))
        }
        Err(e) => Err(Error::kube(
            "create",
            format!("secret {}/{}", namespace, name),
            e,
        )),
    }
}

/// Label and own an object, writing it back once if anything was missing.
async fn label_and_own<T>(api: &Api<T>, mut object: T, owner: Option<OwnerReference>) -> Result<T>
where
    T: Resource + Clone + Serialize + DeserializeOwned + Debug,
    <T as Resource>::DynamicType: Default,
{
    let mut changed = ensure_environment_label(object.meta_mut());
    if let Some(owner) = owner {
        changed |= ensure_owner_reference(object.meta_mut(), owner);
    }
    if !changed {
        return Ok(object);
    }

    let name = object.name_any();
    debug!(name = %name, kind = %T::kind(&Default::default()), "Labeling referenced object");
    let params = PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    };
    api.replace(&name, &params, &object)
        .await
        .map_err(|e| Error::kube("update", name, e))
}

/// Fetch a Secret, from the cache first and from the API server when the
/// cache does not have it (unlabeled Secrets are invisible to the cache).
pub async fn get_secret(ctx: &Context, namespace: &str, name: &str) -> Result<Option<Secret>> {
    if let Some(store) = &ctx.secret_store
        && let Some(cached) = store.get(&ObjectRef::new(name).within(namespace))
    {
        return Ok(Some((*cached).clone()));
    }
    read_secret(ctx, namespace, name).await
}

/// Fetch a Secret from the API server, bypassing the cache.
pub async fn read_secret(ctx: &Context, namespace: &str, name: &str) -> Result<Option<Secret>> {
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), namespace);
    api.get_opt(name)
        .await
        .map_err(|e| Error::kube("get", format!("secret {}/{}", namespace, name), e))
}

/// Fetch a Secret referenced by `owner`, label it and add `owner` as a
/// (non-controller) owner. Returns `None` if it does not exist.
pub async fn acquire_secret<K>(ctx: &Context, owner: &K, name: &str) -> Result<Option<Secret>>
where
    K: Resource<DynamicType = ()>,
{
    let namespace = owner.namespace().unwrap_or_default();
    let secret = get_secret(ctx, &namespace, name).await?;
    own_secret(ctx, owner, secret).await
}

/// Same as [`acquire_secret`], reading from the API server. The returned
/// resourceVersion is current even right after the previous pass wrote the
/// Secret, so it can be stamped into a pod template.
pub async fn acquire_current_secret<K>(
    ctx: &Context,
    owner: &K,
    name: &str,
) -> Result<Option<Secret>>
where
    K: Resource<DynamicType = ()>,
{
    let namespace = owner.namespace().unwrap_or_default();
    let secret = read_secret(ctx, &namespace, name).await?;
    own_secret(ctx, owner, secret).await
}

async fn own_secret<K>(ctx: &Context, owner: &K, secret: Option<Secret>) -> Result<Option<Secret>>
where
    K: Resource<DynamicType = ()>,
{
    let Some(secret) = secret else {
        return Ok(None);
    };
    let api: Api<Secret> =
        Api::namespaced(ctx.client.clone(), &secret.namespace().unwrap_or_default());
    label_and_own(&api, secret, Some(owner_reference(owner, false)))
        .await
        .map(Some)
}

/// Fetch a ConfigMap referenced by `owner` and label it. ConfigMaps are
/// not owned: they usually hold CA bundles shared with other consumers.
pub async fn acquire_config_map<K>(
    ctx: &Context,
    owner: &K,
    name: &str,
) -> Result<Option<ConfigMap>>
where
    K: Resource<DynamicType = ()>,
{
    let namespace = owner.namespace().unwrap_or_default();
    let api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), &namespace);
    let Some(config_map) = api
        .get_opt(name)
        .await
        .map_err(|e| Error::kube("get", format!("configmap {}/{}", namespace, name), e))?
    else {
        return Ok(None);
    };
    label_and_own(&api, config_map, None).await.map(Some)
}

/// Run [`update_htpasswd`] on the blocking pool: bcrypt at cost 10 takes
/// tens of milliseconds. Returns the Secret and whether it changed.
pub async fn refresh_htpasswd(mut secret: Secret) -> Result<(Secret, bool)> {
    tokio::task::spawn_blocking(move || -> Result<(Secret, bool)> {
        let changed = update_htpasswd(&mut secret)?;
        Ok((secret, changed))
    })
    .await?
}

/// Bring the `htpasswd` key of an API credentials Secret up to date.
pub async fn ensure_htpasswd(ctx: &Context, secret: Secret) -> Result<Secret> {
    let (secret, changed) = refresh_htpasswd(secret).await?;
    if !changed {
        return Ok(secret);
    }
    let namespace = secret.namespace().unwrap_or_default();
    let name = secret.name_any();
    info!(namespace = %namespace, name = %name, "Updating htpasswd in API credentials secret");
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &namespace);
    let params = PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    };
    api.replace(&name, &params, &secret)
        .await
        .map_err(|e| Error::kube("update", format!("secret {}/{}", namespace, name), e))
}
