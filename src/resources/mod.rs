//! Resource generation module.
//!
//! Contains the workload composer and the resource ensurer for objects
//! owned by Ironic and IronicDatabase records.
//!
//! ## Resources Generated
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | Deployment / DaemonSet | Ironic pod (DaemonSet in high-availability mode) |
//! | Deployment | MariaDB pod of a managed database |
//! | Service | ClusterIP endpoint of Ironic or MariaDB |
//! | Job | Database upgrade and online data migrations |
//! | ServiceMonitor | Prometheus scraping of the exporter sidecar |

pub mod common;
pub mod container;
pub mod database_pod;
pub mod ensure;
pub mod ironic_pod;
pub mod jobs;
pub mod service_monitor;
pub mod services;
pub mod workloads;

// Re-export commonly used items from common
pub use common::{owner_reference, standard_labels};
