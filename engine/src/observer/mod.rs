//! Post-action observation
//!
//! After each dispatched action the observer grabs a screenshot when a
//! capture service is attached and writes a one-line summary. Completion is
//! taken from the action's own `is_final` flag; the screenshot is never
//! inspected.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use sdk::action::Action;
use sdk::ports::ScreenshotService;

use crate::executor::ActionOutcome;

/// What the observer saw after one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub step: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub summary: String,
    pub task_complete: bool,
}

/// Captures post-action state
#[derive(Default)]
pub struct Observer {
    screenshots: Option<Arc<dyn ScreenshotService>>,
}

impl Observer {
    /// Observer that never captures the screen
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_screenshots(screenshots: Arc<dyn ScreenshotService>) -> Self {
        Self {
            screenshots: Some(screenshots),
        }
    }

    pub async fn observe(&self, step: usize, action: &Action, outcome: &ActionOutcome) -> Observation {
        let screenshot = match &self.screenshots {
            Some(service) => match service.capture().await {
                Ok(reference) => {
                    debug!("Step {} screenshot: {}", step, reference);
                    Some(reference)
                }
                Err(e) => {
                    warn!("Screenshot after step {} failed: {}", step, e);
                    None
                }
            },
            None => None,
        };

        let summary = match &outcome.error {
            None => format!("Step {}: {} succeeded", step, action.label()),
            Some(error) => format!("Step {}: {} failed ({})", step, action.label(), error),
        };

        Observation {
            step,
            success: outcome.success,
            screenshot,
            summary,
            task_complete: action.is_final,
        }
    }
}
