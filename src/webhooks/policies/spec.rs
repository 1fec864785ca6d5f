//! Record validation policy.
//!
//! Runs the same checks as the reconcilers, on a copy of the record with
//! defaults applied, so a record the webhook admits is one the controller
//! accepts.

use super::{ValidationContext, ValidationResult};
use crate::controller::validation;
use crate::crd::{Ironic, IronicDatabase, set_ironic_defaults};

/// Validate an Ironic with defaults applied.
pub fn validate_ironic(ctx: &ValidationContext<'_, Ironic>) -> ValidationResult {
    let mut defaulted = ctx.resource.clone();
    set_ironic_defaults(&mut defaulted.spec);
    ValidationResult::from_check(
        "ValidationFailed",
        validation::validate_ironic(&defaulted, None, ctx.config),
    )
}

/// Validate an IronicDatabase.
pub fn validate_ironic_database(ctx: &ValidationContext<'_, IronicDatabase>) -> ValidationResult {
    ValidationResult::from_check(
        "ValidationFailed",
        validation::validate_ironic_database(ctx.resource, None),
    )
}
