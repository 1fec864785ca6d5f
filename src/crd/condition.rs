//! Status conditions shared by Ironic and IronicDatabase.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type reporting that all subordinate objects are available.
pub const CONDITION_READY: &str = "Ready";

/// Condition type reporting that the controller is converging the record.
pub const CONDITION_PROGRESSING: &str = "Progressing";

/// Something in the deployment failed and needs the user's attention.
pub const REASON_DEPLOYMENT_FAILED: &str = "DeploymentFailed";

/// The deployment is still converging.
pub const REASON_DEPLOYMENT_IN_PROGRESS: &str = "DeploymentInProgress";

/// Everything is available.
pub const REASON_DEPLOYMENT_AVAILABLE: &str = "DeploymentAvailable";

/// Condition describes the state of a record at a certain point.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: String,
    /// Status of the condition ("True", "False", "Unknown").
    pub status: String,
    /// Machine-readable reason for the condition's last transition.
    pub reason: String,
    /// Human-readable message indicating details about last transition.
    pub message: String,
    /// Last time the condition transitioned from one status to another.
    pub last_transition_time: String,
    /// The generation of the resource this condition was observed for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a new condition.
    pub fn new(
        condition_type: &str,
        status: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: if status {
                "True".to_string()
            } else {
                "False".to_string()
            },
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: jiff::Timestamp::now().to_string(),
            observed_generation: generation,
        }
    }

    /// Create a "Ready" condition.
    pub fn ready(ready: bool, reason: &str, message: &str, generation: Option<i64>) -> Self {
        Self::new(CONDITION_READY, ready, reason, message, generation)
    }

    /// Create a "Progressing" condition.
    pub fn progressing(
        progressing: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self::new(CONDITION_PROGRESSING, progressing, reason, message, generation)
    }

    pub fn is_true(&self) -> bool {
        self.status == "True"
    }

    /// Whether two conditions carry the same observable state, ignoring the
    /// transition timestamp.
    pub fn same_state(&self, other: &Condition) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
            && self.observed_generation == other.observed_generation
    }
}
