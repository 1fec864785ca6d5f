//! Custom Resource Definitions (CRDs) for the Ironic operator.
//!
//! - `Ironic`: Deploy and manage the Ironic provisioning service
//! - `IronicDatabase`: Deploy a managed MariaDB for Ironic

mod condition;
mod defaults;
mod ironic;
mod ironic_database;
mod version;

pub use condition::*;
pub use defaults::*;
pub use ironic::*;
pub use ironic_database::*;
pub use version::*;
