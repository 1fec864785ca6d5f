//! Upgrade protection validation policy.
//!
//! Ironic cannot run against a database migrated by a newer release, so a
//! record with a database may not request a version older than the one
//! recorded as installed. Moving away from `latest` is allowed.

use super::{ValidationContext, ValidationResult};
use crate::controller::validation::{check_downgrade, resolved_version};
use crate::crd::Ironic;

/// Refuse downgrades of installations with a database.
pub fn validate(ctx: &ValidationContext<'_, Ironic>) -> ValidationResult {
    let Some(old) = ctx.old_resource else {
        return ValidationResult::allowed();
    };
    let installed = old
        .status
        .as_ref()
        .and_then(|s| s.installed_version.as_deref());
    let requested = match resolved_version(&ctx.resource.spec, ctx.config) {
        Ok(version) => version,
        // Already reported by the spec policy.
        Err(_) => return ValidationResult::allowed(),
    };
    ValidationResult::from_check(
        "DowngradeRefused",
        check_downgrade(installed, requested, ctx.resource.spec.database.is_some()),
    )
}
