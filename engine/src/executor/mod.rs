//! Action executor
//!
//! Routes a typed [`Action`] to the channel that performs it and reports the
//! result as an [`ActionOutcome`]. Channel failures never escape as errors;
//! the task loop records them and keeps going.
//!
//! Browser actions go through a single mutex so only one task drives the
//! browser at a time. Desktop actions use the request/acknowledge protocol of
//! [`DesktopChannel`] with a per-channel timeout.

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sdk::action::{Action, ActionKind, BrowserParams, KeyboardParams, MouseParams};
use sdk::errors::EngineError;
use sdk::ports::{BrowserAutomation, DesktopChannel};

/// Acknowledgement timeouts per desktop channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckTimeouts {
    pub app: Duration,
    pub system: Duration,
    pub keyboard: Duration,
    pub mouse: Duration,
}

impl Default for AckTimeouts {
    fn default() -> Self {
        Self {
            app: Duration::from_millis(3000),
            system: Duration::from_millis(3000),
            keyboard: Duration::from_millis(1000),
            mouse: Duration::from_millis(1000),
        }
    }
}

/// Result of dispatching one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

impl From<Result<(), EngineError>> for ActionOutcome {
    fn from(result: Result<(), EngineError>) -> Self {
        match result {
            Ok(()) => Self::success(),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

/// Dispatches actions to browser, desktop and timing channels
pub struct ActionExecutor {
    browser: Option<Arc<dyn BrowserAutomation>>,
    browser_lock: Mutex<()>,
    desktop: Option<Arc<dyn DesktopChannel>>,
    timeouts: AckTimeouts,
    default_wait: Duration,
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionExecutor {
    /// Create an executor with no channels attached
    ///
    /// Browser and desktop actions fail until the matching channel is added.
    pub fn new() -> Self {
        Self {
            browser: None,
            browser_lock: Mutex::new(()),
            desktop: None,
            timeouts: AckTimeouts::default(),
            default_wait: Duration::from_millis(1000),
        }
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserAutomation>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn with_desktop(mut self, desktop: Arc<dyn DesktopChannel>) -> Self {
        self.desktop = Some(desktop);
        self
    }

    pub fn with_ack_timeouts(mut self, timeouts: AckTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Duration of a `wait` action that does not specify one
    pub fn with_default_wait(mut self, default_wait: Duration) -> Self {
        self.default_wait = default_wait;
        self
    }

    /// Perform the action, giving up early if `cancel` fires
    pub async fn execute(&self, action: &Action, cancel: &CancellationToken) -> ActionOutcome {
        debug!("Dispatching {} action: {}", action.kind.type_name(), action.label());

        let outcome: ActionOutcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => ActionOutcome::failure(EngineError::Cancelled.to_string()),
            result = self.dispatch(&action.kind) => result.into(),
        };

        if let Some(error) = &outcome.error {
            warn!("{} action failed: {}", action.kind.type_name(), error);
        }

        outcome
    }

    async fn dispatch(&self, kind: &ActionKind) -> Result<(), EngineError> {
        match kind {
            ActionKind::Browser(params) => self.run_browser(params).await,
            ActionKind::App(params) => {
                self.send_desktop(
                    "open_app",
                    json!({ "name": params.name, "args": params.args }),
                    self.timeouts.app,
                )
                .await
            }
            ActionKind::System(params) => {
                self.send_desktop(
                    "run_command",
                    json!({ "command": params.command }),
                    self.timeouts.system,
                )
                .await
            }
            ActionKind::Keyboard(params) => {
                let (command, payload) = keyboard_command(params);
                self.send_desktop(command, payload, self.timeouts.keyboard)
                    .await
            }
            ActionKind::Mouse(params) => {
                let (command, payload) = mouse_command(params);
                self.send_desktop(command, payload, self.timeouts.mouse)
                    .await
            }
            ActionKind::Wait(params) => {
                let duration = params
                    .duration_ms
                    .map(Duration::from_millis)
                    .unwrap_or(self.default_wait);
                tokio::time::sleep(duration).await;
                Ok(())
            }
            ActionKind::Done { .. } => Ok(()),
            ActionKind::Unknown(tag) => Err(EngineError::UnknownActionType(tag.clone())),
        }
    }

    async fn run_browser(&self, params: &BrowserParams) -> Result<(), EngineError> {
        let browser = self.browser.as_ref().ok_or(EngineError::BrowserUnavailable)?;
        let _guard = self.browser_lock.lock().await;

        if let Some(url) = &params.url {
            browser.navigate(url).await?;
        }

        match (&params.selector, &params.text) {
            (Some(selector), Some(text)) => browser.type_text(selector, text).await,
            (Some(selector), None) => browser.click(selector).await,
            (None, _) if params.url.is_some() => Ok(()),
            (None, _) => Err(EngineError::Browser(
                "browser action needs a url or a selector".to_string(),
            )),
        }
    }

    async fn send_desktop(
        &self,
        command: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        let desktop = self.desktop.as_ref().ok_or(EngineError::DesktopUnavailable)?;
        let ack = desktop.send(command, params, timeout).await?;

        if ack.success {
            Ok(())
        } else {
            Err(EngineError::Desktop(
                ack.error
                    .unwrap_or_else(|| format!("'{}' was not acknowledged", command)),
            ))
        }
    }
}

fn keyboard_command(params: &KeyboardParams) -> (&'static str, serde_json::Value) {
    match &params.text {
        Some(text) => ("type_text", json!({ "text": text })),
        None => ("press_keys", json!({ "keys": params.keys })),
    }
}

fn mouse_command(params: &MouseParams) -> (&'static str, serde_json::Value) {
    let payload = json!({
        "x": params.x,
        "y": params.y,
        "button": params.button,
        "clicks": params.clicks,
    });

    if params.clicks == 0 {
        ("mouse_move", payload)
    } else {
        ("mouse_click", payload)
    }
}
