//! Task Controller
//!
//! Runs the reason → (confirm) → act → observe loop for one task per
//! session:
//!
//! 1. REASON: ask the reasoner for the next action under a timeout.
//!    `done` or an unreadable reply completes the task.
//! 2. GATE: dangerous actions wait for the user's decision.
//! 3. ACT: dispatch through the executor and record the step. Failed
//!    actions are recorded and the loop continues.
//! 4. OBSERVE: capture state; an action flagged `isFinal` completes the task.
//! 5. Pause before the next iteration.
//!
//! Every suspension point races the task's cancellation token. The loop is
//! bounded by `max_steps`; running out is a failure of its own kind.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use sdk::action::Action;
use sdk::errors::EngineError;
use sdk::events::{StepPhase, TaskEvent};
use sdk::ports::{Decision, EventSink, Reasoner};

use crate::confirmation::{ConfirmationBroker, ConfirmationDecision};
use crate::executor::ActionExecutor;
use crate::observer::Observer;
use crate::security_gate::SecurityGate;

use super::registry::{TaskHandle, TaskRegistry};
use super::task::{Task, TaskOutcome, TaskReport, TaskSnapshot, TaskState};

/// Tunables for the task loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// Maximum reasoning iterations per task
    pub max_steps: usize,
    /// Pause between iterations
    pub step_delay: Duration,
    /// Bound on a single reasoner call
    pub reasoner_timeout: Duration,
    /// How long a gated action waits for the user
    pub confirmation_timeout: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_steps: 10,
            step_delay: Duration::from_millis(500),
            reasoner_timeout: Duration::from_secs(60),
            confirmation_timeout: Duration::from_secs(30),
        }
    }
}

/// Orchestrates tasks across sessions
pub struct TaskController {
    reasoner: Arc<dyn Reasoner>,
    executor: ActionExecutor,
    observer: Observer,
    gate: SecurityGate,
    broker: Arc<ConfirmationBroker>,
    registry: Arc<TaskRegistry>,
    settings: LoopSettings,
}

impl TaskController {
    /// Create a controller with its own registry and broker
    pub fn new(reasoner: Arc<dyn Reasoner>, executor: ActionExecutor, observer: Observer) -> Self {
        Self {
            reasoner,
            executor,
            observer,
            gate: SecurityGate::new(),
            broker: Arc::new(ConfirmationBroker::new()),
            registry: Arc::new(TaskRegistry::new()),
            settings: LoopSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_registry(mut self, registry: Arc<TaskRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_broker(mut self, broker: Arc<ConfirmationBroker>) -> Self {
        self.broker = broker;
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Run a task for the session to completion
    ///
    /// Any task already running in the session is cancelled and replaced.
    /// Returns `Err` only for an invalid request; every loop failure is
    /// reported through the returned [`TaskReport`].
    pub async fn start(
        &self,
        session_id: &str,
        description: &str,
        sink: Arc<dyn EventSink>,
    ) -> Result<TaskReport, EngineError> {
        if session_id.trim().is_empty() {
            return Err(EngineError::InvalidRequest(
                "session id must not be empty".to_string(),
            ));
        }
        if description.trim().is_empty() {
            return Err(EngineError::InvalidRequest(
                "task description must not be empty".to_string(),
            ));
        }

        let mut task = Task::new(session_id, description, self.settings.max_steps);
        let cancel = CancellationToken::new();

        let handle = TaskHandle {
            task_id: task.id.clone(),
            cancel: cancel.clone(),
            sink: Arc::clone(&sink),
            state: task.state(),
            step: 0,
        };
        if let Some(previous) = self.registry.insert(session_id, handle).await {
            info!(
                "Replacing task {} in session {} with {}",
                previous.task_id, session_id, task.id
            );
            previous.cancel.cancel();
        }

        info!("Starting task {} in session {}: {}", task.id, session_id, description);
        sink.emit(
            session_id,
            TaskEvent::Started {
                task_id: task.id.clone(),
                description: description.to_string(),
            },
        )
        .await;

        let result = self.run_loop(&mut task, &cancel, sink.as_ref()).await;

        // Losing the entry means `cancel` or a replacement took it
        let owned = self.registry.remove_if_owned(session_id, &task.id).await;
        let result = match result {
            Ok(()) if !owned => {
                info!("Task {} was cancelled as it finished", task.id);
                task.abandon();
                Err(EngineError::Cancelled)
            }
            other => other,
        };

        let outcome = match result {
            Ok(()) => TaskOutcome::Completed,
            Err(e) => {
                task.fail();
                let outcome = TaskOutcome::from_error(&e);
                if let Some(message) = outcome.failure_message() {
                    task.context.errors.push(message);
                }
                outcome
            }
        };

        let report = task.into_report(outcome);
        match report.outcome.failure_message() {
            None => {
                info!(
                    "Task {} completed in {}ms after {} steps",
                    report.task_id,
                    report.duration_ms,
                    report.steps.len()
                );
                sink.emit(
                    session_id,
                    TaskEvent::Completed {
                        task_id: report.task_id.clone(),
                        success: true,
                        steps: report.steps.len(),
                        duration: report.duration_ms,
                        errors: report.errors.clone(),
                    },
                )
                .await;
            }
            Some(message) => {
                error!("Task {} failed: {}", report.task_id, message);
                sink.emit(
                    session_id,
                    TaskEvent::Failed {
                        task_id: report.task_id.clone(),
                        error: message,
                    },
                )
                .await;
            }
        }

        Ok(report)
    }

    /// Run [`TaskController::start`] on its own Tokio task
    pub fn spawn(
        self: &Arc<Self>,
        session_id: impl Into<String>,
        description: impl Into<String>,
        sink: Arc<dyn EventSink>,
    ) -> JoinHandle<Result<TaskReport, EngineError>> {
        let controller = Arc::clone(self);
        let session_id = session_id.into();
        let description = description.into();

        tokio::spawn(async move { controller.start(&session_id, &description, sink).await })
    }

    /// Cancel the session's task
    ///
    /// Returns `false` when the session has no running task.
    pub async fn cancel(&self, session_id: &str) -> bool {
        let Some(handle) = self.registry.take(session_id).await else {
            debug!("No task to cancel in session {}", session_id);
            return false;
        };

        info!("Cancelling task {} in session {}", handle.task_id, session_id);
        handle.cancel.cancel();
        handle
            .sink
            .emit(session_id, TaskEvent::Cancelled { success: true })
            .await;
        true
    }

    /// Answer the session's pending confirmation
    ///
    /// Returns `false` when nothing was waiting.
    pub fn confirm(&self, session_id: &str, approved: bool) -> bool {
        self.broker.resolve(session_id, approved)
    }

    /// State of the session's running task, if any
    pub async fn status(&self, session_id: &str) -> Option<TaskSnapshot> {
        self.registry.snapshot(session_id).await
    }

    async fn run_loop(
        &self,
        task: &mut Task,
        cancel: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        let session_id = task.session_id.clone();

        while let Some(step) = task.advance() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            debug!("Task {} step {}/{}", task.id, step, task.max_steps);

            // REASON
            self.enter(task, TaskState::Reasoning).await?;
            sink.emit(
                &session_id,
                TaskEvent::Step {
                    step,
                    phase: StepPhase::Reasoning,
                    message: "Deciding next action".to_string(),
                },
            )
            .await;

            let action = match self.reason(task, cancel).await? {
                Decision::Act(action) => action,
                Decision::Done { summary } => {
                    info!(
                        "Task {} reported done: {}",
                        task.id,
                        summary.as_deref().unwrap_or("no summary")
                    );
                    self.enter(task, TaskState::Completed).await?;
                    return Ok(());
                }
            };

            // GATE
            if let Some(term) = self.gate.matched_term(&action) {
                self.await_confirmation(task, &action, term, cancel, sink)
                    .await?;
            }

            // ACT
            self.enter(task, TaskState::Acting).await?;
            sink.emit(
                &session_id,
                TaskEvent::Step {
                    step,
                    phase: StepPhase::Acting,
                    message: action.label(),
                },
            )
            .await;

            let outcome = self.executor.execute(&action, cancel).await;
            task.record_step(action.clone(), outcome.clone());

            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            // OBSERVE
            self.enter(task, TaskState::Observing).await?;
            let observation = self.observer.observe(step, &action, &outcome).await;
            sink.emit(
                &session_id,
                TaskEvent::Step {
                    step,
                    phase: StepPhase::Observing,
                    message: observation.summary.clone(),
                },
            )
            .await;

            let complete = observation.task_complete;
            task.record_observation(observation);

            if complete {
                info!("Task {} finished by final action at step {}", task.id, step);
                self.enter(task, TaskState::Completed).await?;
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                _ = tokio::time::sleep(self.settings.step_delay) => {}
            }
        }

        warn!("Task {} exceeded max steps ({})", task.id, task.max_steps);
        Err(EngineError::MaxStepsExceeded {
            max_steps: task.max_steps,
        })
    }

    /// Ask the reasoner for the next decision
    ///
    /// An unreadable reply is recorded as an error and treated as done.
    async fn reason(
        &self,
        task: &mut Task,
        cancel: &CancellationToken,
    ) -> Result<Decision, EngineError> {
        let context = task.reasoner_context();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            result = timeout(self.settings.reasoner_timeout, self.reasoner.decide(&context)) => result,
        };

        match result {
            Ok(Ok(decision)) => Ok(decision),
            Ok(Err(e @ EngineError::ReasonerParse(_))) => {
                warn!("Task {}: {}; treating as done", task.id, e);
                task.context.errors.push(e.to_string());
                Ok(Decision::Done { summary: None })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EngineError::ReasonerTimeout(
                self.settings.reasoner_timeout.as_secs(),
            )),
        }
    }

    async fn await_confirmation(
        &self,
        task: &mut Task,
        action: &Action,
        term: &str,
        cancel: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        self.enter(task, TaskState::AwaitingConfirmation).await?;
        info!(
            "Task {} action '{}' matched '{}', awaiting confirmation",
            task.id,
            action.label(),
            term
        );

        let action_json = serde_json::to_value(action).map_err(|e| {
            EngineError::InvalidRequest(format!("failed to encode action: {}", e))
        })?;

        // Open the pending entry before announcing it
        let pending = self.broker.register(&task.session_id);
        sink.emit(
            &task.session_id,
            TaskEvent::ConfirmationRequired {
                action: action_json,
                message: format!("Allow '{}'? It may be destructive.", action.label()),
            },
        )
        .await;

        let decision = pending
            .wait(self.settings.confirmation_timeout, cancel)
            .await;

        match decision {
            ConfirmationDecision::Approved => Ok(()),
            ConfirmationDecision::Cancelled => Err(EngineError::Cancelled),
            ConfirmationDecision::Rejected | ConfirmationDecision::TimedOut => {
                Err(EngineError::UserRejected)
            }
        }
    }

    /// Transition and publish the new state to the registry
    async fn enter(&self, task: &mut Task, next: TaskState) -> Result<(), EngineError> {
        task.transition(next)?;
        self.registry.update(&task.snapshot()).await;
        Ok(())
    }
}
