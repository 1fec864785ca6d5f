//! Status management utilities.
//!
//! Every ensurer reports a [`Status`]; the reconcilers fold them into one
//! value and turn it into the `Ready`/`Progressing` conditions and a
//! requeue decision. Transient cluster errors are not a status: they are
//! returned as `Err` and retried by the controller's error policy.

use std::time::Duration;

use kube::runtime::controller::Action;

use crate::crd::{
    CONDITION_PROGRESSING, CONDITION_READY, Condition, REASON_DEPLOYMENT_AVAILABLE,
    REASON_DEPLOYMENT_FAILED, REASON_DEPLOYMENT_IN_PROGRESS,
};

/// Requeue interval after writing something.
pub const REQUEUE_UPDATED: Duration = Duration::from_secs(1);
/// Requeue interval while waiting for external convergence.
pub const REQUEUE_IN_PROGRESS: Duration = Duration::from_secs(10);
/// Requeue interval after a deployment failure.
pub const REQUEUE_DEPLOYMENT_FAILED: Duration = Duration::from_secs(60);
/// Resync interval for records that are ready.
pub const REQUEUE_READY: Duration = Duration::from_secs(300);

/// Who has to act on a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Invalid record, unsupported version or refused downgrade.
    /// Nothing changes until the user edits the record.
    User,
    /// A workload or job failed, or a referenced object is missing. Retried
    /// on a slow interval.
    Deployment,
}

/// Outcome of ensuring one component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// Observed available.
    Ready,
    /// Something was just written; reconcile again soon.
    Updated(String),
    /// Waiting for the cluster to converge.
    InProgress(String),
    /// Failed and will not converge on its own.
    Fatal { kind: FailureKind, message: String },
}

impl Status {
    pub fn updated(message: impl Into<String>) -> Self {
        Status::Updated(message.into())
    }

    pub fn in_progress(message: impl Into<String>) -> Self {
        Status::InProgress(message.into())
    }

    pub fn user_error(message: impl Into<String>) -> Self {
        Status::Fatal {
            kind: FailureKind::User,
            message: message.into(),
        }
    }

    pub fn deployment_failed(message: impl Into<String>) -> Self {
        Status::Fatal {
            kind: FailureKind::Deployment,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Status::Fatal { .. })
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Status::Ready)
    }

    /// Whether the reconcile should run again without waiting for an event.
    pub fn needs_requeue(&self) -> bool {
        matches!(self, Status::Updated(_))
    }

    fn priority(&self) -> u8 {
        match self {
            Status::Fatal { .. } => 3,
            Status::Updated(_) => 2,
            Status::InProgress(_) => 1,
            Status::Ready => 0,
        }
    }

    /// Combine two outcomes, keeping the one with higher priority
    /// (Fatal > Updated > InProgress > Ready). Ties keep the first.
    pub fn combine(self, other: Status) -> Status {
        if other.priority() > self.priority() {
            other
        } else {
            self
        }
    }

    /// Requeue decision for this outcome.
    pub fn action(&self) -> Action {
        match self {
            Status::Ready => Action::requeue(REQUEUE_READY),
            Status::Updated(_) => Action::requeue(REQUEUE_UPDATED),
            Status::InProgress(_) => Action::requeue(REQUEUE_IN_PROGRESS),
            Status::Fatal {
                kind: FailureKind::User,
                ..
            } => Action::await_change(),
            Status::Fatal {
                kind: FailureKind::Deployment,
                ..
            } => Action::requeue(REQUEUE_DEPLOYMENT_FAILED),
        }
    }

    /// Human readable message for the Ready condition.
    pub fn message(&self, subject: &str) -> String {
        match self {
            Status::Ready => format!("{} is available", subject),
            Status::Updated(message) | Status::InProgress(message) => message.clone(),
            Status::Fatal { message, .. } => message.clone(),
        }
    }

    /// Reason of the Ready condition.
    pub fn reason(&self) -> &'static str {
        match self {
            Status::Ready => REASON_DEPLOYMENT_AVAILABLE,
            Status::Fatal { .. } => REASON_DEPLOYMENT_FAILED,
            Status::Updated(_) | Status::InProgress(_) => REASON_DEPLOYMENT_IN_PROGRESS,
        }
    }
}

/// Fold a sequence of outcomes. An empty sequence is `Ready`.
pub fn fold<I>(statuses: I) -> Status
where
    I: IntoIterator<Item = Status>,
{
    statuses.into_iter().fold(Status::Ready, Status::combine)
}

/// Builder for managing conditions list
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
}

impl ConditionBuilder {
    /// Create a new condition builder
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// Start from the conditions currently stored on a record.
    pub fn from_existing(conditions: &[Condition]) -> Self {
        Self {
            conditions: conditions.to_vec(),
        }
    }

    /// Add or update a condition. The transition time is kept when the
    /// status of an existing condition does not change.
    pub fn set(&mut self, mut condition: Condition) -> &mut Self {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time.clone();
            }
            *existing = condition;
        } else {
            self.conditions.push(condition);
        }
        self
    }

    /// Set Ready condition
    pub fn ready(
        &mut self,
        ready: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> &mut Self {
        self.set(Condition::ready(ready, reason, message, generation))
    }

    /// Set Progressing condition
    pub fn progressing(
        &mut self,
        progressing: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> &mut Self {
        self.set(Condition::progressing(
            progressing,
            reason,
            message,
            generation,
        ))
    }

    /// Write Ready and Progressing for an aggregated outcome.
    pub fn status(&mut self, status: &Status, subject: &str, generation: Option<i64>) -> &mut Self {
        let message = status.message(subject);
        let reason = status.reason();
        let progressing = matches!(status, Status::Updated(_) | Status::InProgress(_));
        self.ready(status.is_ready(), reason, &message, generation)
            .progressing(progressing, reason, &message, generation)
    }

    /// Build the conditions list
    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

impl Default for ConditionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if a condition type is true
pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    find_condition(conditions, condition_type).is_some_and(Condition::is_true)
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Whether two condition lists carry the same state, ignoring timestamps.
pub fn conditions_equal(a: &[Condition], b: &[Condition]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_state(y))
}

/// Whether the record is currently reported Ready.
pub fn is_ready(conditions: &[Condition]) -> bool {
    is_condition_true(conditions, CONDITION_READY)
}

/// Whether the record is currently reported Progressing.
pub fn is_progressing(conditions: &[Condition]) -> bool {
    is_condition_true(conditions, CONDITION_PROGRESSING)
}
