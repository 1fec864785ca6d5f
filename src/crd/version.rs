//! Ironic release versions.
//!
//! Versions are either the sentinel `latest` or a `MAJOR.MINOR` pair. They form
//! a total order in which `latest` is greater than every numeric version.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Sentinel string for the most recent (unreleased) Ironic.
pub const VERSION_LATEST: &str = "latest";

/// Errors produced when parsing a version string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version {0}, expected MAJOR.MINOR")]
    InvalidVersion(String),

    #[error("invalid major version in {0}")]
    InvalidMajor(String),

    #[error("invalid minor version in {0}")]
    InvalidMinor(String),

    #[error("version {0} is not supported, supported versions are {1}")]
    Unsupported(String, String),
}

/// An Ironic version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Version {
    /// A released `MAJOR.MINOR` branch.
    Numeric { major: u32, minor: u32 },
    /// The development branch.
    Latest,
}

impl Version {
    pub const fn new(major: u32, minor: u32) -> Self {
        Version::Numeric { major, minor }
    }

    pub fn is_latest(&self) -> bool {
        matches!(self, Version::Latest)
    }

    /// Suffix of the container image tag for this version.
    pub fn image_tag(&self) -> String {
        match self {
            Version::Latest => VERSION_LATEST.to_string(),
            Version::Numeric { .. } => format!("release-{}", self),
        }
    }

    /// Check that this version is one the operator knows how to deploy.
    pub fn ensure_supported(&self) -> Result<(), VersionError> {
        if SUPPORTED_VERSIONS.contains(self) {
            Ok(())
        } else {
            Err(VersionError::Unsupported(
                self.to_string(),
                supported_versions_list(),
            ))
        }
    }
}

/// Versions the operator can install, sorted ascending.
pub const SUPPORTED_VERSIONS: &[Version] = &[
    Version::new(30, 0),
    Version::new(31, 0),
    Version::new(32, 0),
    Version::new(33, 0),
    Version::new(34, 0),
    Version::Latest,
];

/// First version shipping the Prometheus exporter integration.
pub const VERSION_PROMETHEUS_EXPORTER: Version = Version::new(31, 0);

/// First version accepting a separate BMC CA bundle.
pub const VERSION_BMC_CA: Version = Version::new(32, 0);

fn supported_versions_list() -> String {
    SUPPORTED_VERSIONS
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a single version component: digits only, no leading zeros.
fn parse_component(part: &str) -> Option<u32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if part.len() > 1 && part.starts_with('0') {
        return None;
    }
    part.parse().ok()
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == VERSION_LATEST {
            return Ok(Version::Latest);
        }

        let Some((major, minor)) = s.split_once('.') else {
            return Err(VersionError::InvalidVersion(s.to_string()));
        };

        let major = match parse_component(major) {
            Some(m) if m >= 1 => m,
            _ => return Err(VersionError::InvalidMajor(s.to_string())),
        };
        let minor =
            parse_component(minor).ok_or_else(|| VersionError::InvalidMinor(s.to_string()))?;

        Ok(Version::Numeric { major, minor })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Numeric { major, minor } => write!(f, "{}.{}", major, minor),
            Version::Latest => write!(f, "{}", VERSION_LATEST),
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Version::Latest, Version::Latest) => Ordering::Equal,
            (Version::Latest, _) => Ordering::Greater,
            (_, Version::Latest) => Ordering::Less,
            (
                Version::Numeric { major, minor },
                Version::Numeric {
                    major: other_major,
                    minor: other_minor,
                },
            ) => (major, minor).cmp(&(other_major, other_minor)),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
