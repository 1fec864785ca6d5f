//! Version resolution.
//!
//! Starts from the operator-wide defaults and applies per-record overrides
//! to produce the exact version and images a record is deployed with.

use crate::config::OperatorConfig;
use crate::crd::{Images, Version, VersionError, non_empty};

/// Resolved version and images for one record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionInfo {
    /// Version being deployed.
    pub installed_version: Version,
    pub ironic_image: String,
    pub mariadb_image: String,
    pub ramdisk_downloader_image: String,
    pub keepalived_image: String,
    pub agent_branch: String,
    pub agent_download_url: String,
}

impl VersionInfo {
    /// Defaults from the operator configuration.
    pub fn from_config(config: &OperatorConfig) -> Self {
        let images = &config.images;
        Self {
            installed_version: config.default_version,
            ironic_image: images.ironic.clone(),
            mariadb_image: images.mariadb.clone(),
            ramdisk_downloader_image: images.ramdisk_downloader.clone(),
            keepalived_image: images.keepalived.clone(),
            agent_branch: images.agent_branch.clone(),
            agent_download_url: images.agent_download_url.clone(),
        }
    }

    /// Apply a requested version and image overrides, in that order.
    ///
    /// A requested version swaps the tag of the Ironic image; an explicit
    /// Ironic image override wins over it.
    pub fn with_overrides(
        mut self,
        version: Option<&str>,
        images: &Images,
    ) -> Result<Self, VersionError> {
        if let Some(requested) = version.map(str::trim).filter(|v| !v.is_empty()) {
            let parsed: Version = requested.parse()?;
            parsed.ensure_supported()?;
            self.installed_version = parsed;
            self.ironic_image = image_with_tag(&self.ironic_image, &parsed.image_tag());
        }

        if let Some(image) = non_empty(&images.ironic) {
            self.ironic_image = image.to_string();
        }
        if let Some(image) = non_empty(&images.deploy_ramdisk_downloader) {
            self.ramdisk_downloader_image = image.to_string();
        }
        if let Some(image) = non_empty(&images.keepalived) {
            self.keepalived_image = image.to_string();
        }
        if let Some(branch) = non_empty(&images.agent_branch) {
            self.agent_branch = branch.to_string();
        }
        if let Some(url) = non_empty(&images.agent_download_url) {
            self.agent_download_url = url.to_string();
        }

        Ok(self)
    }

    /// Apply the MariaDB image override of an IronicDatabase.
    pub fn with_database_image(mut self, image: Option<&str>) -> Self {
        if let Some(image) = image.filter(|i| !i.is_empty()) {
            self.mariadb_image = image.to_string();
        }
        self
    }
}

/// Replace (or add) the tag of an image reference. Digests are dropped.
pub fn image_with_tag(image: &str, tag: &str) -> String {
    let image = image.split('@').next().unwrap_or(image);
    let repository = match image.rsplit_once(':') {
        // A colon followed by a slash belongs to a registry port, not a tag.
        Some((repository, suffix)) if !suffix.contains('/') => repository,
        _ => image,
    };
    format!("{}:{}", repository, tag)
}
