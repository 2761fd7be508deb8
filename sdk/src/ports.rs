//! Collaborator ports
//!
//! The task loop talks to the outside world only through these traits.
//! The engine ships adapters for each of them; tests substitute scripted
//! implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::action::{Action, ActionKind};
use crate::errors::EngineError;
use crate::events::TaskEvent;

/// A completed step as presented to the reasoner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub description: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything the reasoner sees when choosing the next action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasonerContext {
    pub description: String,
    pub steps: Vec<StepSummary>,
    pub errors: Vec<String>,
}

/// Reasoner verdict for one iteration
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Perform this action next
    Act(Action),
    /// The task is finished
    Done { summary: Option<String> },
}

impl Decision {
    /// Interpret a parsed JSON object as a decision
    ///
    /// `{"type": "done"}` becomes [`Decision::Done`]; anything else goes
    /// through [`Action::from_value`].
    pub fn from_value(value: &serde_json::Value) -> Result<Self, EngineError> {
        let action = Action::from_value(value)?;
        match action.kind {
            ActionKind::Done { summary } => Ok(Decision::Done { summary }),
            _ => Ok(Decision::Act(action)),
        }
    }
}

/// Chooses the next action for a task
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Decide the next step
    ///
    /// Implementations return `EngineError::ReasonerParse` when the backend
    /// answered but the answer could not be read as a decision.
    async fn decide(&self, context: &ReasonerContext) -> Result<Decision, EngineError>;
}

/// Browser automation surface used by the executor
#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), EngineError>;

    async fn click(&self, selector: &str) -> Result<(), EngineError>;

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), EngineError>;
}

/// Best-effort screen capture
#[async_trait]
pub trait ScreenshotService: Send + Sync {
    /// Capture the screen and return a reference (path or URL) to the image
    async fn capture(&self) -> Result<String, EngineError>;
}

/// Acknowledgement returned by the desktop agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesktopAck {
    /// Correlation id of the command being acknowledged
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request/acknowledge channel to the desktop agent
#[async_trait]
pub trait DesktopChannel: Send + Sync {
    /// Send a command and wait up to `timeout` for its acknowledgement
    async fn send(
        &self,
        command: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<DesktopAck, EngineError>;
}

/// Destination for task events of one or more sessions
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, session_id: &str, event: TaskEvent);
}
