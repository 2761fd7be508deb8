//! Command handlers for CLI operations
//!
//! - run: wire the adapters, run one task and relay its events to the
//!   terminal, answering confirmations from stdin
//! - config: print, show or validate the configuration

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use sdk::events::TaskEvent;
use sdk::ports::{EventSink, Reasoner};

use crate::agent::{TaskController, TaskReport};
use crate::browser::{ChromeBrowser, ChromeOptions};
use crate::config::Config;
use crate::desktop::DesktopLink;
use crate::executor::ActionExecutor;
use crate::message_bus::{EventType, MessageBus, SessionEvent};
use crate::observer::Observer;
use crate::reasoner::OllamaReasoner;
use crate::screenshot::ScreenCapture;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Build a controller from configuration
pub fn build_controller(config: &Config) -> Result<TaskController> {
    let reasoner: Arc<dyn Reasoner> = Arc::new(
        OllamaReasoner::new(&config.reasoner.base_url, &config.reasoner.model)
            .context("Failed to create reasoner")?,
    );

    let mut executor = ActionExecutor::new()
        .with_ack_timeouts(config.desktop.ack_timeouts())
        .with_default_wait(std::time::Duration::from_millis(config.agent.default_wait_ms));

    if config.browser.enabled {
        executor = executor.with_browser(Arc::new(ChromeBrowser::new(ChromeOptions::from(
            &config.browser,
        ))));
    }

    if config.desktop.enabled {
        executor = executor.with_desktop(Arc::new(DesktopLink::connect(config.desktop.clone())));
    }

    let observer = if config.screenshot.enabled {
        Observer::with_screenshots(Arc::new(ScreenCapture::new(
            config.screenshot.output_dir.clone(),
        )))
    } else {
        Observer::new()
    };

    Ok(TaskController::new(reasoner, executor, observer).with_settings(config.agent.loop_settings()))
}

/// Run a task and relay its progress
///
/// Confirmation requests are answered on stdin; Ctrl-C cancels the task.
pub async fn handle_run(
    task: String,
    session_id: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let controller = Arc::new(build_controller(config)?);
    let bus = Arc::new(MessageBus::new());
    let mut events = bus.subscribe(EventType::All).await;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    let sink: Arc<dyn EventSink> = Arc::clone(&bus) as Arc<dyn EventSink>;
    let mut handle = controller.spawn(session_id.clone(), task, sink);

    let report = loop {
        tokio::select! {
            result = &mut handle => {
                break result.context("Task runner panicked")??;
            }
            Some(event) = events.recv() => {
                print_event(&event, format)?;

                if matches!(event.event, TaskEvent::ConfirmationRequired { .. }) {
                    let approved = match stdin.next_line().await {
                        Ok(Some(line)) => is_affirmative(&line),
                        _ => false,
                    };
                    if !controller.confirm(&session_id, approved) {
                        println!("Confirmation window already closed.");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, cancelling task");
                controller.cancel(&session_id).await;
            }
        }
    };

    // Events published just before the task finished
    while let Ok(event) = events.try_recv() {
        print_event(&event, format)?;
    }

    print_report(&report, format)?;

    if report.success {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Task failed: {}",
            report
                .outcome
                .failure_message()
                .unwrap_or_else(|| "unknown error".to_string())
        ))
    }
}

fn print_event(event: &SessionEvent, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&event.event)?);
        }
        OutputFormat::Text => match &event.event {
            TaskEvent::Started { task_id, description } => {
                println!("Executing task {}: {}", task_id, description);
            }
            TaskEvent::Step {
                step,
                phase,
                message,
            } => {
                println!("  [{}] {:?}: {}", step, phase, message);
            }
            TaskEvent::ConfirmationRequired { message, .. } => {
                println!();
                println!("⚠ {}", message);
                println!("Approve? [y/N]");
            }
            TaskEvent::Completed { .. } | TaskEvent::Failed { .. } => {}
            TaskEvent::Cancelled { .. } => println!("Task cancelled."),
        },
    }
    Ok(())
}

fn print_report(report: &TaskReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Text => {
            println!();
            if report.success {
                println!("✓ Task completed successfully");
            } else {
                println!(
                    "✗ Task failed: {}",
                    report.outcome.failure_message().unwrap_or_default()
                );
            }
            println!("  Steps: {}", report.steps.len());
            println!("  Duration: {}ms", report.duration_ms);
            for error in &report.errors {
                println!("  Error: {}", error);
            }
        }
    }
    Ok(())
}

/// Whether a stdin answer approves the action
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Print the configuration file location
pub fn handle_config_path(custom: Option<&Path>, format: OutputFormat) -> Result<()> {
    let path = match custom {
        Some(path) => path.to_path_buf(),
        None => Config::default_config_path()?,
    };

    match format {
        OutputFormat::Text => println!("{}", path.display()),
        OutputFormat::Json => println!("{}", json!({ "path": path })),
    }
    Ok(())
}

/// Print the effective configuration
pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let toml = toml::to_string_pretty(config).context("Failed to serialize config")?;
            println!("{}", toml);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}
