//! Task state
//!
//! A [`Task`] is owned by the loop that runs it. Every state change goes
//! through [`Task::transition`], which rejects moves the state machine does
//! not allow.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

use sdk::action::Action;
use sdk::errors::EngineError;
use sdk::ports::{ReasonerContext, StepSummary};

use crate::executor::ActionOutcome;
use crate::observer::Observation;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Reasoning,
    Acting,
    AwaitingConfirmation,
    Observing,
    Completed,
    Failed,
}

impl TaskState {
    pub const ALL: [TaskState; 7] = [
        TaskState::Pending,
        TaskState::Reasoning,
        TaskState::Acting,
        TaskState::AwaitingConfirmation,
        TaskState::Observing,
        TaskState::Completed,
        TaskState::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Reasoning => "REASONING",
            TaskState::Acting => "ACTING",
            TaskState::AwaitingConfirmation => "AWAITING_CONFIRMATION",
            TaskState::Observing => "OBSERVING",
            TaskState::Completed => "COMPLETED",
            TaskState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;

        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Failed) => true,
            (Pending, Reasoning) => true,
            (Reasoning, Acting | AwaitingConfirmation | Completed) => true,
            (AwaitingConfirmation, Acting) => true,
            (Acting, Observing) => true,
            (Observing, Reasoning | Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dispatched action and its result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub number: usize,
    pub action: Action,
    pub outcome: ActionOutcome,
    pub timestamp: DateTime<Utc>,
}

/// Accumulated evidence for a task
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskContext {
    pub screenshots: Vec<String>,
    pub observations: Vec<Observation>,
    pub errors: Vec<String>,
}

/// How a task ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed,
    Rejected,
    Cancelled,
    MaxStepsExceeded { max_steps: usize },
    Error { message: String },
}

impl TaskOutcome {
    /// Classify the error that ended the loop
    pub fn from_error(error: &EngineError) -> Self {
        match error {
            EngineError::UserRejected => TaskOutcome::Rejected,
            EngineError::Cancelled => TaskOutcome::Cancelled,
            EngineError::MaxStepsExceeded { max_steps } => TaskOutcome::MaxStepsExceeded {
                max_steps: *max_steps,
            },
            other => TaskOutcome::Error {
                message: other.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Completed)
    }

    /// Error text carried by `task:failed`, `None` on success
    pub fn failure_message(&self) -> Option<String> {
        match self {
            TaskOutcome::Completed => None,
            TaskOutcome::Rejected => Some(EngineError::UserRejected.to_string()),
            TaskOutcome::Cancelled => Some(EngineError::Cancelled.to_string()),
            TaskOutcome::MaxStepsExceeded { max_steps } => Some(
                EngineError::MaxStepsExceeded {
                    max_steps: *max_steps,
                }
                .to_string(),
            ),
            TaskOutcome::Error { message } => Some(message.clone()),
        }
    }
}

/// Point-in-time view of a running task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub task_id: String,
    pub session_id: String,
    pub state: TaskState,
    pub step: usize,
}

/// A task owned by its running loop
#[derive(Debug)]
pub struct Task {
    pub id: String,
    pub session_id: String,
    pub description: String,
    state: TaskState,
    steps: Vec<Step>,
    current_step: usize,
    pub max_steps: usize,
    started_at: Instant,
    pub context: TaskContext,
}

impl Task {
    pub fn new(
        session_id: impl Into<String>,
        description: impl Into<String>,
        max_steps: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            description: description.into(),
            state: TaskState::Pending,
            steps: Vec::new(),
            current_step: 0,
            max_steps,
            started_at: Instant::now(),
            context: TaskContext::default(),
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Move to `next`, or fail with `InvalidTransition`
    pub fn transition(&mut self, next: TaskState) -> Result<(), EngineError> {
        if !self.state.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// Mark the task FAILED unless it already ended
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = TaskState::Failed;
        }
    }

    /// Mark the task FAILED after it was cancelled from outside
    ///
    /// Overrides COMPLETED: a loop that finished while `cancel` raced it
    /// still reports the cancellation the caller was told about.
    pub fn abandon(&mut self) {
        self.state = TaskState::Failed;
    }

    /// Start the next iteration; `None` once the step bound is reached
    pub fn advance(&mut self) -> Option<usize> {
        if self.current_step >= self.max_steps {
            return None;
        }
        self.current_step += 1;
        Some(self.current_step)
    }

    /// Record a dispatched action under the current step number
    pub fn record_step(&mut self, action: Action, outcome: ActionOutcome) {
        if let Some(error) = &outcome.error {
            self.context.errors.push(error.clone());
        }
        self.steps.push(Step {
            number: self.current_step,
            action,
            outcome,
            timestamp: Utc::now(),
        });
    }

    pub fn record_observation(&mut self, observation: Observation) {
        if let Some(screenshot) = &observation.screenshot {
            self.context.screenshots.push(screenshot.clone());
        }
        self.context.observations.push(observation);
    }

    /// What the reasoner gets to see
    pub fn reasoner_context(&self) -> ReasonerContext {
        ReasonerContext {
            description: self.description.clone(),
            steps: self
                .steps
                .iter()
                .map(|step| StepSummary {
                    description: step.action.label(),
                    success: step.outcome.success,
                    error: step.outcome.error.clone(),
                })
                .collect(),
            errors: self.context.errors.clone(),
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            task_id: self.id.clone(),
            session_id: self.session_id.clone(),
            state: self.state,
            step: self.current_step,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Consume the task into its final report
    pub fn into_report(self, outcome: TaskOutcome) -> TaskReport {
        TaskReport {
            duration_ms: self.elapsed_ms(),
            success: outcome.is_success(),
            task_id: self.id,
            session_id: self.session_id,
            outcome,
            state: self.state,
            steps: self.steps,
            errors: self.context.errors,
        }
    }
}

/// Final account of a task, returned by `TaskController::start`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub task_id: String,
    pub session_id: String,
    pub outcome: TaskOutcome,
    pub state: TaskState,
    pub success: bool,
    pub steps: Vec<Step>,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}
