//! Immutability validation policy.
//!
//! Validates:
//! - The database of an Ironic cannot be changed once set
//! - The credentials Secret of an IronicDatabase cannot be changed once set

use super::{ValidationContext, ValidationResult};
use crate::controller::validation;
use crate::crd::{Ironic, IronicDatabase};

/// Validate immutable Ironic fields on UPDATE operations
pub fn validate_ironic(ctx: &ValidationContext<'_, Ironic>) -> ValidationResult {
    let Some(old) = ctx.old_resource else {
        return ValidationResult::allowed(); // Not an UPDATE
    };
    ValidationResult::from_check(
        "ImmutableField",
        validation::validate_ironic_update(&ctx.resource.spec, &old.spec),
    )
}

/// Validate immutable IronicDatabase fields on UPDATE operations
pub fn validate_ironic_database(ctx: &ValidationContext<'_, IronicDatabase>) -> ValidationResult {
    let Some(old) = ctx.old_resource else {
        return ValidationResult::allowed();
    };
    ValidationResult::from_check(
        "ImmutableField",
        validation::validate_ironic_database(ctx.resource, Some(old)),
    )
}
