//! Lifecycle phases of Ironic and IronicDatabase records.
//!
//! The phase is never stored: it is derived on every reconcile from what the
//! reconciler observed (deletion marker, finalizer, secrets, upgrade jobs and
//! the folded status). After a controller restart the first reconcile
//! derives the same phase again. Phases feed the per-phase gauge and the
//! reconcile logs.

use std::fmt;

use crate::controller::status::{FailureKind, Status};
use crate::resources::jobs::UpgradePhase;

/// Lifecycle phase of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Not reconciled yet.
    Initializing,
    /// Waiting for the finalizer to be written.
    AwaitingFinalizer,
    /// Referenced or generated Secrets are not available.
    AwaitingSecrets,
    /// Schema upgrade job running.
    PreUpgrading,
    /// Workloads are being created or rolled out.
    Deploying,
    /// Online data migrations running next to the new version.
    PostUpgrading,
    /// Everything available.
    Ready,
    /// User error or failed workload.
    Failed,
    /// Deletion marker set, cleanup running.
    Deleting,
    /// Finalizer removed.
    Deleted,
}

impl Phase {
    pub const ALL: [Phase; 10] = [
        Phase::Initializing,
        Phase::AwaitingFinalizer,
        Phase::AwaitingSecrets,
        Phase::PreUpgrading,
        Phase::Deploying,
        Phase::PostUpgrading,
        Phase::Ready,
        Phase::Failed,
        Phase::Deleting,
        Phase::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initializing => "Initializing",
            Phase::AwaitingFinalizer => "AwaitingFinalizer",
            Phase::AwaitingSecrets => "AwaitingSecrets",
            Phase::PreUpgrading => "PreUpgrading",
            Phase::Deploying => "Deploying",
            Phase::PostUpgrading => "PostUpgrading",
            Phase::Ready => "Ready",
            Phase::Failed => "Failed",
            Phase::Deleting => "Deleting",
            Phase::Deleted => "Deleted",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Deleted)
    }

    /// Whether moving from `self` to `to` is an expected transition.
    /// Deletion can start from anywhere; nothing leaves `Deleted`.
    pub fn can_transition_to(&self, to: Phase) -> bool {
        if self.is_terminal() {
            return false;
        }
        if *self == to || to == Phase::Deleting {
            return true;
        }
        match self {
            Phase::Deleting => to == Phase::Deleted,
            Phase::Initializing => !matches!(to, Phase::Deleted),
            // Any live phase can fail, recover, or roll into a new upgrade.
            _ => !matches!(to, Phase::Initializing | Phase::Deleted),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a reconcile saw, in pipeline order. Fields left at their defaults
/// mean the reconcile stopped before reaching that step.
#[derive(Clone, Debug, Default)]
pub struct Observation {
    pub deleting: bool,
    pub finalizer_removed: bool,
    pub has_finalizer: bool,
    pub secrets_ready: bool,
    /// Upgrade job the reconcile is waiting on.
    pub upgrade: Option<UpgradePhase>,
    /// Folded status of everything ensured so far.
    pub status: Option<Status>,
}

/// Derive the phase of a record from one reconcile's observations.
pub fn derive_phase(observation: &Observation) -> Phase {
    if observation.deleting {
        return if observation.finalizer_removed {
            Phase::Deleted
        } else {
            Phase::Deleting
        };
    }
    if let Some(Status::Fatal { kind, .. }) = &observation.status {
        // A user error may be discovered before any secret is read.
        if *kind == FailureKind::User || observation.secrets_ready {
            return Phase::Failed;
        }
    }
    if !observation.has_finalizer {
        return if observation.status.is_some() {
            Phase::AwaitingFinalizer
        } else {
            Phase::Initializing
        };
    }
    if !observation.secrets_ready {
        return Phase::AwaitingSecrets;
    }
    match (observation.upgrade, &observation.status) {
        (Some(UpgradePhase::Pre), _) => Phase::PreUpgrading,
        (Some(UpgradePhase::Post), _) => Phase::PostUpgrading,
        (None, Some(Status::Ready)) => Phase::Ready,
        _ => Phase::Deploying,
    }
}
