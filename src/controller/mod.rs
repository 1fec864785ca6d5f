//! Controller module for the Ironic standalone operator.
//!
//! Contains the reconciliation drivers, lifecycle phases, error handling,
//! status management, validation and secret handling.
//!
//! This module supports two controllers:
//! - Ironic controller (`ironic_reconciler`)
//! - IronicDatabase controller (`database_reconciler`)

// Shared modules
pub mod common;
pub mod context;
pub mod error;
pub mod secrets;
pub mod state_machine;
pub mod status;
pub mod validation;
pub mod version_info;

// Ironic controller
pub mod ironic_reconciler;

// IronicDatabase controller
pub mod database_reconciler;
