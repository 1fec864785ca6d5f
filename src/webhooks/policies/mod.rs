//! Admission policies for Ironic and IronicDatabase.
//!
//! Each policy is a plain function over a [`ValidationContext`]. Policies
//! run in declaration order and the first denial wins, so the message the
//! user sees is deterministic. Some only make sense on UPDATE and are
//! skipped on CREATE.

pub mod immutability;
pub mod spec;
pub mod upgrade_protection;

use crate::config::OperatorConfig;
use crate::controller::error::Error;
use crate::crd::{Ironic, IronicDatabase};

/// Outcome of one policy, or of the whole chain.
#[derive(Debug)]
pub struct ValidationResult {
    pub allowed: bool,
    /// Short machine-readable cause, e.g. `ImmutableField`
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            message: None,
        }
    }

    pub fn denied(reason: &str, message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.to_string()),
            message: Some(message.into()),
        }
    }

    /// Turn a validator check into a result. Validation messages already
    /// start with the field path and are passed through without a prefix.
    pub fn from_check(reason: &str, check: Result<(), Error>) -> Self {
        match check {
            Ok(()) => Self::allowed(),
            Err(Error::Validation(message) | Error::MissingField(message)) => {
                Self::denied(reason, message)
            }
            Err(other) => Self::denied(reason, other.to_string()),
        }
    }
}

/// What a policy gets to look at.
pub struct ValidationContext<'a, T> {
    pub resource: &'a T,
    /// Present on UPDATE only
    pub old_resource: Option<&'a T>,
    pub dry_run: bool,
    pub namespace: Option<&'a str>,
    pub config: &'a OperatorConfig,
}

impl<T> ValidationContext<'_, T> {
    pub fn is_update(&self) -> bool {
        self.old_resource.is_some()
    }
}

/// A named admission check.
struct Policy<T: 'static> {
    name: &'static str,
    update_only: bool,
    check: fn(&ValidationContext<'_, T>) -> ValidationResult,
}

const IRONIC_POLICIES: &[Policy<Ironic>] = &[
    Policy {
        name: "spec",
        update_only: false,
        check: spec::validate_ironic,
    },
    Policy {
        name: "immutability",
        update_only: true,
        check: immutability::validate_ironic,
    },
    Policy {
        name: "upgrade-protection",
        update_only: true,
        check: upgrade_protection::validate,
    },
];

const IRONIC_DATABASE_POLICIES: &[Policy<IronicDatabase>] = &[
    Policy {
        name: "spec",
        update_only: false,
        check: spec::validate_ironic_database,
    },
    Policy {
        name: "immutability",
        update_only: true,
        check: immutability::validate_ironic_database,
    },
];

fn run_policies<T>(policies: &[Policy<T>], ctx: &ValidationContext<'_, T>) -> ValidationResult {
    for policy in policies {
        if policy.update_only && !ctx.is_update() {
            continue;
        }
        let result = (policy.check)(ctx);
        if !result.allowed {
            tracing::debug!(policy = policy.name, reason = ?result.reason, "Policy denied request");
            return result;
        }
    }
    ValidationResult::allowed()
}

/// Run every Ironic policy.
pub fn validate_ironic(ctx: &ValidationContext<'_, Ironic>) -> ValidationResult {
    run_policies(IRONIC_POLICIES, ctx)
}

/// Run every IronicDatabase policy.
pub fn validate_ironic_database(ctx: &ValidationContext<'_, IronicDatabase>) -> ValidationResult {
    run_policies(IRONIC_DATABASE_POLICIES, ctx)
}
