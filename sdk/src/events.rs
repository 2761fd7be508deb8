//! Outbound task events
//!
//! Events are serialized with an `"event"` tag carrying the wire name
//! (`task:started`, `task:step`, ...) and camelCase payload fields.

use serde::{Deserialize, Serialize};

/// Phase of a loop iteration reported in `task:step`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepPhase {
    Reasoning,
    Acting,
    Observing,
}

/// Event emitted by the task controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum TaskEvent {
    #[serde(rename = "task:started", rename_all = "camelCase")]
    Started { task_id: String, description: String },

    #[serde(rename = "task:step")]
    Step {
        step: usize,
        phase: StepPhase,
        message: String,
    },

    #[serde(rename = "task:confirmation_required")]
    ConfirmationRequired {
        action: serde_json::Value,
        message: String,
    },

    #[serde(rename = "task:completed", rename_all = "camelCase")]
    Completed {
        task_id: String,
        success: bool,
        steps: usize,
        /// Wall-clock duration in milliseconds
        duration: u64,
        errors: Vec<String>,
    },

    #[serde(rename = "task:failed", rename_all = "camelCase")]
    Failed { task_id: String, error: String },

    #[serde(rename = "task:cancelled")]
    Cancelled { success: bool },
}

impl TaskEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Started { .. } => "task:started",
            TaskEvent::Step { .. } => "task:step",
            TaskEvent::ConfirmationRequired { .. } => "task:confirmation_required",
            TaskEvent::Completed { .. } => "task:completed",
            TaskEvent::Failed { .. } => "task:failed",
            TaskEvent::Cancelled { .. } => "task:cancelled",
        }
    }

    /// Whether this event ends a task (`task:completed` or `task:failed`)
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::Completed { .. } | TaskEvent::Failed { .. })
    }
}
