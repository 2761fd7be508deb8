//! Integration tests for the task controller
//!
//! Drives the full reason → confirm → act → observe loop with scripted
//! collaborators:
//! - completion by final action and by "done"
//! - confirmation gating (approve, reject, timeout)
//! - non-fatal action failures
//! - step bound, cancellation and task replacement

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use sdk::action::{Action, BrowserParams};
use sdk::errors::EngineError;
use sdk::events::{StepPhase, TaskEvent};
use sdk::ports::{
    BrowserAutomation, Decision, DesktopAck, DesktopChannel, EventSink, Reasoner, ReasonerContext,
};
use stride_engine::agent::{LoopSettings, TaskController, TaskOutcome, TaskRegistry, TaskState};
use stride_engine::confirmation::ConfirmationBroker;
use stride_engine::executor::ActionExecutor;
use stride_engine::observer::Observer;

/// Replays scripted decisions; reports done once the script runs out
struct ScriptedReasoner {
    script: Mutex<VecDeque<Decision>>,
    delay: Duration,
    contexts: Mutex<Vec<ReasonerContext>>,
}

impl ScriptedReasoner {
    fn new(script: Vec<Decision>) -> Arc<Self> {
        Self::slow(script, Duration::ZERO)
    }

    fn slow(script: Vec<Decision>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            delay,
            contexts: Mutex::new(Vec::new()),
        })
    }

    /// Never finishes on its own
    fn endless(action: Action) -> Arc<Self> {
        Self::new(vec![Decision::Act(action); 64])
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn decide(&self, context: &ReasonerContext) -> Result<Decision, EngineError> {
        self.contexts.lock().unwrap().push(context.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Decision::Done { summary: None }))
    }
}

/// Acks every command successfully and records what it saw
#[derive(Default)]
struct RecordingDesktop {
    commands: Mutex<Vec<(String, serde_json::Value)>>,
}

#[async_trait]
impl DesktopChannel for RecordingDesktop {
    async fn send(
        &self,
        command: &str,
        params: serde_json::Value,
        _timeout: Duration,
    ) -> Result<DesktopAck, EngineError> {
        self.commands
            .lock()
            .unwrap()
            .push((command.to_string(), params));
        Ok(DesktopAck {
            id: format!("cmd-{}", self.commands.lock().unwrap().len()),
            success: true,
            error: None,
        })
    }
}

/// Fails the first navigation, succeeds afterwards
#[derive(Default)]
struct FlakyBrowser {
    navigations: Mutex<usize>,
}

#[async_trait]
impl BrowserAutomation for FlakyBrowser {
    async fn navigate(&self, _url: &str) -> Result<(), EngineError> {
        let mut count = self.navigations.lock().unwrap();
        *count += 1;
        if *count == 1 {
            Err(EngineError::Browser("net::ERR_CONNECTION_RESET".to_string()))
        } else {
            Ok(())
        }
    }

    async fn click(&self, _selector: &str) -> Result<(), EngineError> {
        Ok(())
    }

    async fn type_text(&self, _selector: &str, _text: &str) -> Result<(), EngineError> {
        Ok(())
    }
}

#[derive(Default)]
struct CollectingSink {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingSink {
    fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap().clone()
    }

    fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.name()).collect()
    }

    fn step_numbers(&self) -> Vec<usize> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                TaskEvent::Step {
                    step,
                    phase: StepPhase::Reasoning,
                    ..
                } => Some(*step),
                _ => None,
            })
            .collect()
    }

    fn has_confirmation_request(&self) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(e, TaskEvent::ConfirmationRequired { .. }))
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn emit(&self, _session_id: &str, event: TaskEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn settings(max_steps: usize) -> LoopSettings {
    LoopSettings {
        max_steps,
        step_delay: Duration::from_millis(1),
        reasoner_timeout: Duration::from_secs(5),
        confirmation_timeout: Duration::from_secs(5),
    }
}

fn controller_with(
    reasoner: Arc<ScriptedReasoner>,
    desktop: Arc<RecordingDesktop>,
    settings: LoopSettings,
) -> Arc<TaskController> {
    let executor = ActionExecutor::new().with_desktop(desktop);
    Arc::new(TaskController::new(reasoner, executor, Observer::new()).with_settings(settings))
}

fn act(value: serde_json::Value) -> Decision {
    Decision::from_value(&value).unwrap()
}

async fn wait_for_state(controller: &TaskController, session_id: &str, state: TaskState) {
    for _ in 0..400 {
        if controller
            .status(session_id)
            .await
            .is_some_and(|snapshot| snapshot.state == state)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task in {} never reached {}", session_id, state);
}

#[tokio::test]
async fn test_open_notepad_and_type_hello() {
    let reasoner = ScriptedReasoner::new(vec![
        act(json!({"type": "app", "params": {"name": "notepad"}, "description": "Open notepad"})),
        act(json!({"type": "keyboard", "params": {"text": "hello"}, "isFinal": true})),
        Decision::Done { summary: None },
    ]);
    let desktop = Arc::new(RecordingDesktop::default());
    let controller = controller_with(reasoner, Arc::clone(&desktop), settings(10));
    let sink = Arc::new(CollectingSink::default());

    let report = controller
        .start("s1", "open notepad and type hello", sink.clone())
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.state, TaskState::Completed);
    assert_eq!(report.steps.len(), 2);
    assert!(report.steps.iter().all(|s| s.outcome.success));

    let commands = desktop.commands.lock().unwrap();
    assert_eq!(commands[0].0, "open_app");
    assert_eq!(commands[0].1["name"], "notepad");
    assert_eq!(commands[1].0, "type_text");
    assert_eq!(commands[1].1["text"], "hello");

    let names = sink.names();
    assert_eq!(names.first(), Some(&"task:started"));
    assert_eq!(names.last(), Some(&"task:completed"));
    assert!(!sink.has_confirmation_request());
    assert!(controller.status("s1").await.is_none());
}

#[tokio::test]
async fn test_dangerous_command_rejected() {
    let reasoner = ScriptedReasoner::new(vec![act(
        json!({"type": "system", "params": {"command": "shutdown /s"}}),
    )]);
    let desktop = Arc::new(RecordingDesktop::default());
    let controller = controller_with(reasoner, Arc::clone(&desktop), settings(10));
    let sink = Arc::new(CollectingSink::default());

    let run = controller.spawn("s1", "turn off the computer", sink.clone());
    wait_for_state(&controller, "s1", TaskState::AwaitingConfirmation).await;

    assert!(controller.confirm("s1", false));
    let report = run.await.unwrap().unwrap();

    assert!(!report.success);
    assert_eq!(report.outcome, TaskOutcome::Rejected);
    assert!(report.errors.contains(&"User rejected action".to_string()));
    assert!(desktop.commands.lock().unwrap().is_empty());
    assert!(sink.has_confirmation_request());
    assert_eq!(
        sink.events().last(),
        Some(&TaskEvent::Failed {
            task_id: report.task_id.clone(),
            error: "User rejected action".to_string()
        })
    );
}

#[tokio::test]
async fn test_dangerous_command_times_out() {
    let reasoner = ScriptedReasoner::new(vec![act(
        json!({"type": "system", "params": {"command": "netsh advfirewall reset"}}),
    )]);
    let desktop = Arc::new(RecordingDesktop::default());
    let controller = controller_with(
        reasoner,
        Arc::clone(&desktop),
        LoopSettings {
            confirmation_timeout: Duration::from_millis(30),
            ..settings(10)
        },
    );
    let sink = Arc::new(CollectingSink::default());

    let report = controller.start("s1", "reset firewall", sink).await.unwrap();

    assert_eq!(report.outcome, TaskOutcome::Rejected);
    assert!(report.errors.contains(&"User rejected action".to_string()));
    assert!(desktop.commands.lock().unwrap().is_empty());

    // A late answer finds nothing pending
    assert!(!controller.confirm("s1", true));
}

#[tokio::test]
async fn test_dangerous_command_approved() {
    let reasoner = ScriptedReasoner::new(vec![act(
        json!({"type": "system", "params": {"command": "del C:\\temp\\old.log"}, "isFinal": true}),
    )]);
    let desktop = Arc::new(RecordingDesktop::default());
    let controller = controller_with(reasoner, Arc::clone(&desktop), settings(10));
    let sink = Arc::new(CollectingSink::default());

    let run = controller.spawn("s1", "clean up the log", sink);
    wait_for_state(&controller, "s1", TaskState::AwaitingConfirmation).await;

    assert!(controller.confirm("s1", true));
    let report = run.await.unwrap().unwrap();

    assert!(report.success);
    let commands = desktop.commands.lock().unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].0, "run_command");
}

#[tokio::test]
async fn test_failed_action_is_not_fatal() {
    let reasoner = ScriptedReasoner::new(vec![
        act(json!({"type": "browser", "params": {"url": "https://example.com"}})),
        act(json!({"type": "browser", "params": {"url": "https://example.com"}, "isFinal": true})),
    ]);
    let executor = ActionExecutor::new().with_browser(Arc::new(FlakyBrowser::default()));
    let controller = TaskController::new(reasoner.clone(), executor, Observer::new())
        .with_settings(settings(10));
    let sink = Arc::new(CollectingSink::default());

    let report = controller.start("s1", "open example.com", sink).await.unwrap();

    assert!(report.success);
    assert_eq!(report.steps.len(), 2);
    assert!(!report.steps[0].outcome.success);
    assert!(report.steps[1].outcome.success);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("ERR_CONNECTION_RESET"));

    // The reasoner saw the failure before choosing step 2
    let contexts = reasoner.contexts.lock().unwrap();
    assert_eq!(contexts[1].steps.len(), 1);
    assert!(!contexts[1].steps[0].success);
    assert_eq!(contexts[1].errors.len(), 1);
}

#[tokio::test]
async fn test_step_numbers_are_contiguous() {
    let reasoner = ScriptedReasoner::new(vec![
        Decision::Act(Action::wait(1)),
        Decision::Act(Action::wait(1)),
        Decision::Act(Action::wait(1)),
    ]);
    let controller = controller_with(reasoner, Arc::default(), settings(10));
    let sink = Arc::new(CollectingSink::default());

    let report = controller.start("s1", "wait a bit", sink.clone()).await.unwrap();

    // Three actions, then "done" on the fourth iteration
    assert_eq!(sink.step_numbers(), vec![1, 2, 3, 4]);
    let numbers: Vec<usize> = report.steps.iter().map(|s| s.number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_step_limit_is_explicit_failure() {
    let reasoner = ScriptedReasoner::endless(Action::wait(1));
    let controller = controller_with(reasoner, Arc::default(), settings(3));
    let sink = Arc::new(CollectingSink::default());

    let report = controller.start("s1", "loop forever", sink.clone()).await.unwrap();

    assert!(!report.success);
    assert_eq!(report.state, TaskState::Failed);
    assert_eq!(report.outcome, TaskOutcome::MaxStepsExceeded { max_steps: 3 });
    assert_eq!(report.steps.len(), 3);
    assert_eq!(sink.step_numbers(), vec![1, 2, 3]);
    assert!(matches!(
        sink.events().last(),
        Some(TaskEvent::Failed { error, .. }) if error == "Max steps exceeded (3)"
    ));
}

#[tokio::test]
async fn test_cancel_running_task() {
    let reasoner = ScriptedReasoner::endless(Action::wait(5_000));
    let controller = controller_with(reasoner, Arc::default(), settings(10));
    let sink = Arc::new(CollectingSink::default());

    let run = controller.spawn("s1", "wait a long time", sink.clone());
    wait_for_state(&controller, "s1", TaskState::Acting).await;

    assert!(controller.cancel("s1").await);
    let report = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("cancelled task should stop promptly")
        .unwrap()
        .unwrap();

    assert_eq!(report.outcome, TaskOutcome::Cancelled);
    assert_eq!(report.state, TaskState::Failed);
    assert!(controller.status("s1").await.is_none());

    let events = sink.events();
    assert!(events.contains(&TaskEvent::Cancelled { success: true }));
    assert!(matches!(
        events.last(),
        Some(TaskEvent::Failed { error, .. }) if error == "cancelled"
    ));

    // Nothing left to cancel
    assert!(!controller.cancel("s1").await);
}

#[tokio::test]
async fn test_cancel_while_awaiting_confirmation() {
    let reasoner = ScriptedReasoner::new(vec![act(
        json!({"type": "system", "params": {"command": "format D:"}}),
    )]);
    let controller = controller_with(reasoner, Arc::default(), settings(10));
    let sink = Arc::new(CollectingSink::default());

    let run = controller.spawn("s1", "wipe the drive", sink);
    wait_for_state(&controller, "s1", TaskState::AwaitingConfirmation).await;

    assert!(controller.cancel("s1").await);
    let report = run.await.unwrap().unwrap();

    assert_eq!(report.outcome, TaskOutcome::Cancelled);
    assert!(!controller.confirm("s1", true));
}

#[tokio::test]
async fn test_new_task_replaces_running_one() {
    let registry = Arc::new(TaskRegistry::new());
    let reasoner = ScriptedReasoner::slow(
        vec![Decision::Act(Action::wait(5_000)); 8],
        Duration::from_millis(10),
    );
    let executor = ActionExecutor::new();
    let controller = Arc::new(
        TaskController::new(reasoner, executor, Observer::new())
            .with_settings(settings(10))
            .with_registry(Arc::clone(&registry)),
    );

    let first_sink = Arc::new(CollectingSink::default());
    let first = controller.spawn("s1", "first task", first_sink.clone());
    wait_for_state(&controller, "s1", TaskState::Acting).await;
    let first_id = controller.status("s1").await.unwrap().task_id;

    let second_sink = Arc::new(CollectingSink::default());
    let second = controller.spawn("s1", "second task", second_sink);

    let first_report = tokio::time::timeout(Duration::from_secs(2), first)
        .await
        .expect("replaced task should stop promptly")
        .unwrap()
        .unwrap();
    assert_eq!(first_report.task_id, first_id);
    assert_eq!(first_report.outcome, TaskOutcome::Cancelled);

    // Only the replacement is registered
    assert_eq!(registry.len().await, 1);
    let current = controller.status("s1").await.unwrap();
    assert_ne!(current.task_id, first_id);

    assert!(controller.cancel("s1").await);
    let second_report = second.await.unwrap().unwrap();
    assert_eq!(second_report.task_id, current.task_id);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_sessions_run_independently() {
    let reasoner = ScriptedReasoner::new(vec![]);
    let controller = controller_with(reasoner, Arc::default(), settings(10));

    let a = controller.spawn("a", "task a", Arc::new(CollectingSink::default()));
    let b = controller.spawn("b", "task b", Arc::new(CollectingSink::default()));

    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
    assert_eq!(a.session_id, "a");
    assert_eq!(b.session_id, "b");
    assert!(a.success && b.success);
    assert!(controller.registry().is_empty().await);
}

#[tokio::test]
async fn test_reasoner_timeout_fails_task() {
    let reasoner = ScriptedReasoner::slow(vec![], Duration::from_millis(200));
    let controller = controller_with(
        reasoner,
        Arc::default(),
        LoopSettings {
            reasoner_timeout: Duration::from_millis(20),
            ..settings(10)
        },
    );
    let sink = Arc::new(CollectingSink::default());

    let report = controller.start("s1", "slow model", sink).await.unwrap();

    assert!(!report.success);
    assert!(matches!(report.outcome, TaskOutcome::Error { .. }));
    assert!(report.steps.is_empty());
}

#[tokio::test]
async fn test_browser_action_without_browser_fails_step() {
    let reasoner = ScriptedReasoner::new(vec![Decision::Act(
        Action::browser(BrowserParams {
            url: Some("https://example.com".to_string()),
            ..Default::default()
        })
        .finishing(),
    )]);
    let controller = controller_with(reasoner, Arc::default(), settings(10));
    let sink = Arc::new(CollectingSink::default());

    let report = controller.start("s1", "browse", sink).await.unwrap();

    // The final flag still completes the task
    assert!(report.success);
    assert!(!report.steps[0].outcome.success);
    assert_eq!(report.errors, vec!["Browser automation is not available"]);
}

/// Answers a confirmation request the moment it is announced
struct InstantApprover {
    broker: Arc<ConfirmationBroker>,
    delivered: Mutex<Vec<bool>>,
}

#[async_trait]
impl EventSink for InstantApprover {
    async fn emit(&self, session_id: &str, event: TaskEvent) {
        if matches!(event, TaskEvent::ConfirmationRequired { .. }) {
            let delivered = self.broker.resolve(session_id, true);
            self.delivered.lock().unwrap().push(delivered);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_immediate_approval_is_not_lost() {
    let reasoner = ScriptedReasoner::new(vec![act(
        json!({"type": "system", "params": {"command": "shutdown /s"}, "isFinal": true}),
    )]);
    let desktop = Arc::new(RecordingDesktop::default());
    let broker = Arc::new(ConfirmationBroker::new());
    let controller = TaskController::new(
        reasoner,
        ActionExecutor::new().with_desktop(Arc::clone(&desktop) as Arc<dyn DesktopChannel>),
        Observer::new(),
    )
    .with_settings(LoopSettings {
        confirmation_timeout: Duration::from_millis(200),
        ..settings(10)
    })
    .with_broker(Arc::clone(&broker));
    let sink = Arc::new(InstantApprover {
        broker: Arc::clone(&broker),
        delivered: Mutex::new(Vec::new()),
    });

    let report = controller.start("s1", "turn off the computer", sink.clone()).await.unwrap();

    assert_eq!(*sink.delivered.lock().unwrap(), vec![true]);
    assert_eq!(report.outcome, TaskOutcome::Completed);
    assert!(report.errors.is_empty());
    assert_eq!(desktop.commands.lock().unwrap()[0].0, "run_command");
    assert_eq!(broker.pending_count(), 0);
}

/// Cancels the session's task while the final step is being observed
#[derive(Default)]
struct CancelOnObserve {
    controller: OnceLock<Arc<TaskController>>,
    events: Mutex<Vec<TaskEvent>>,
}

#[async_trait]
impl EventSink for CancelOnObserve {
    async fn emit(&self, session_id: &str, event: TaskEvent) {
        let observing = matches!(
            event,
            TaskEvent::Step {
                phase: StepPhase::Observing,
                ..
            }
        );
        self.events.lock().unwrap().push(event);
        if observing {
            if let Some(controller) = self.controller.get() {
                assert!(controller.cancel(session_id).await);
            }
        }
    }
}

#[tokio::test]
async fn test_cancel_racing_completion_reports_cancelled() {
    let reasoner = ScriptedReasoner::new(vec![Decision::Act(Action::wait(1).finishing())]);
    let controller = controller_with(reasoner, Arc::default(), settings(10));
    let sink = Arc::new(CancelOnObserve::default());
    assert!(sink.controller.set(Arc::clone(&controller)).is_ok());

    let report = controller.start("s1", "wait once", sink.clone()).await.unwrap();

    assert_eq!(report.outcome, TaskOutcome::Cancelled);
    assert_eq!(report.state, TaskState::Failed);

    let events = sink.events.lock().unwrap().clone();
    assert!(events.contains(&TaskEvent::Cancelled { success: true }));
    assert!(!events
        .iter()
        .any(|e| matches!(e, TaskEvent::Completed { .. })));
    assert!(matches!(
        events.last(),
        Some(TaskEvent::Failed { error, .. }) if error == "cancelled"
    ));
}

/// Tracks how many browser calls overlap
#[derive(Default)]
struct ExclusiveBrowser {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ExclusiveBrowser {
    async fn occupy(&self) -> Result<(), EngineError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl BrowserAutomation for ExclusiveBrowser {
    async fn navigate(&self, _url: &str) -> Result<(), EngineError> {
        self.occupy().await
    }

    async fn click(&self, _selector: &str) -> Result<(), EngineError> {
        self.occupy().await
    }

    async fn type_text(&self, _selector: &str, _text: &str) -> Result<(), EngineError> {
        self.occupy().await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_share_browser_exclusively() {
    let browse = Action::browser(BrowserParams {
        url: Some("https://example.com".to_string()),
        selector: Some("#search".to_string()),
        text: Some("rust".to_string()),
    });
    let reasoner = ScriptedReasoner::new(vec![Decision::Act(browse); 6]);
    let browser = Arc::new(ExclusiveBrowser::default());
    let controller = Arc::new(
        TaskController::new(
            reasoner,
            ActionExecutor::new().with_browser(Arc::clone(&browser) as Arc<dyn BrowserAutomation>),
            Observer::new(),
        )
        .with_settings(settings(10)),
    );

    let runs: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|session| controller.spawn(session, "search the web", Arc::new(CollectingSink::default())))
        .collect();

    for run in runs {
        assert!(run.await.unwrap().unwrap().success);
    }
    assert_eq!(browser.max_in_flight.load(Ordering::SeqCst), 1);
}
