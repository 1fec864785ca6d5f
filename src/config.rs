//! Operator process configuration.
//!
//! Read once at start-up from environment variables and shared with every
//! controller through [`crate::controller::context::Context`].

use std::collections::BTreeMap;

use thiserror::Error;

use crate::controller::version_info::image_with_tag;
use crate::crd::{VERSION_LATEST, Version, VersionError};

/// Default Ironic image (tag is replaced when a version is requested).
pub const DEFAULT_IRONIC_IMAGE: &str = "quay.io/metal3-io/ironic:latest";
/// Default MariaDB image.
pub const DEFAULT_MARIADB_IMAGE: &str = "quay.io/metal3-io/mariadb:latest";
/// Default image of the ramdisk downloader init container.
pub const DEFAULT_RAMDISK_DOWNLOADER_IMAGE: &str = "quay.io/metal3-io/ironic-ipa-downloader:latest";
/// Default keepalived image.
pub const DEFAULT_KEEPALIVED_IMAGE: &str = "quay.io/metal3-io/keepalived:latest";
/// Default branch of the agent ramdisk.
pub const DEFAULT_AGENT_BRANCH: &str = "master";
/// Default location of agent ramdisk tarballs.
pub const DEFAULT_AGENT_DOWNLOAD_URL: &str =
    "https://tarballs.opendev.org/openstack/ironic-python-agent/dib";
/// Default cluster DNS domain.
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// Errors in the operator configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("unknown feature gate {0}")]
    UnknownFeatureGate(String),

    #[error("invalid default version: {0}")]
    Version(#[from] VersionError),
}

/// Process-wide feature gates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeatureGates {
    /// Allow `spec.highAvailability` on Ironic records.
    pub high_availability: bool,
}

impl FeatureGates {
    /// Parse a comma separated list of `Name=bool` pairs.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let mut gates = FeatureGates::default();
        for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, enabled) = item.split_once('=').unwrap_or((item, "true"));
            let enabled: bool =
                enabled
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        name: "IRONIC_FEATURE_GATES",
                        value: item.to_string(),
                        reason: "expected Name=true or Name=false".to_string(),
                    })?;
            match name.trim() {
                "HighAvailability" => gates.high_availability = enabled,
                other => return Err(ConfigError::UnknownFeatureGate(other.to_string())),
            }
        }
        Ok(gates)
    }
}

/// Global defaults for images and the ramdisk source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageDefaults {
    pub ironic: String,
    pub mariadb: String,
    pub ramdisk_downloader: String,
    pub keepalived: String,
    pub agent_branch: String,
    pub agent_download_url: String,
}

impl Default for ImageDefaults {
    fn default() -> Self {
        Self {
            ironic: DEFAULT_IRONIC_IMAGE.to_string(),
            mariadb: DEFAULT_MARIADB_IMAGE.to_string(),
            ramdisk_downloader: DEFAULT_RAMDISK_DOWNLOADER_IMAGE.to_string(),
            keepalived: DEFAULT_KEEPALIVED_IMAGE.to_string(),
            agent_branch: DEFAULT_AGENT_BRANCH.to_string(),
            agent_download_url: DEFAULT_AGENT_DOWNLOAD_URL.to_string(),
        }
    }
}

/// Operator configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace to watch, or `None` for the whole cluster.
    pub watch_namespace: Option<String>,
    /// Cluster DNS domain.
    pub cluster_domain: String,
    /// Number of records reconciled in parallel.
    pub max_concurrent_reconciles: u16,
    /// Feature gates.
    pub feature_gates: FeatureGates,
    /// Version installed when a record does not request one.
    pub default_version: Version,
    /// Default images.
    pub images: ImageDefaults,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
            max_concurrent_reconciles: default_concurrency(),
            feature_gates: FeatureGates::default(),
            default_version: Version::Latest,
            images: ImageDefaults::default(),
        }
    }
}

/// Worker count: min(8, max(2, CPUs)).
pub fn default_concurrency() -> u16 {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    u16::try_from(cpus.clamp(2, 8)).unwrap_or(2)
}

impl OperatorConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration using a custom variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = ImageDefaults::default();

        let max_concurrent_reconciles = match get("MAX_CONCURRENT_RECONCILES") {
            Some(value) => match value.trim().parse::<u16>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "MAX_CONCURRENT_RECONCILES",
                        value,
                        reason: "expected a positive integer".to_string(),
                    });
                }
            },
            None => default_concurrency(),
        };

        let feature_gates = match get("IRONIC_FEATURE_GATES") {
            Some(value) => FeatureGates::parse(&value)?,
            None => FeatureGates::default(),
        };

        let default_version = get("IRONIC_VERSION")
            .unwrap_or_else(|| VERSION_LATEST.to_string())
            .trim()
            .parse::<Version>()?;
        default_version.ensure_supported()?;

        Ok(Self {
            watch_namespace: get("WATCH_NAMESPACE"),
            cluster_domain: get("CLUSTER_DOMAIN")
                .unwrap_or_else(|| DEFAULT_CLUSTER_DOMAIN.to_string()),
            max_concurrent_reconciles,
            feature_gates,
            default_version,
            images: ImageDefaults {
                ironic: get("IRONIC_IMAGE").unwrap_or_else(|| {
                    image_with_tag(&defaults.ironic, &default_version.image_tag())
                }),
                mariadb: get("MARIADB_IMAGE").unwrap_or(defaults.mariadb),
                ramdisk_downloader: get("RAMDISK_DOWNLOADER_IMAGE")
                    .unwrap_or(defaults.ramdisk_downloader),
                keepalived: get("KEEPALIVED_IMAGE").unwrap_or(defaults.keepalived),
                agent_branch: get("IRONIC_AGENT_BRANCH").unwrap_or(defaults.agent_branch),
                agent_download_url: get("IRONIC_AGENT_DOWNLOAD_URL")
                    .unwrap_or(defaults.agent_download_url),
            },
        })
    }

    /// Build a configuration from a fixed set of variables (handy in tests).
    pub fn from_map(vars: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| vars.get(name).cloned())
    }
}
