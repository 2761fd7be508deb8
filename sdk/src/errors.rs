//! Error types and handling
//!
//! This module provides the error types used throughout the Stride engine.
//! All errors implement the `StrideErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Error Categories
//!
//! - **Configuration**: Invalid or missing configuration
//! - **Request**: Malformed task requests (empty session or description)
//! - **Task loop**: Rejection, cancellation, step-limit exhaustion, invalid transitions
//! - **Reasoner**: Transport failures, timeouts and unparseable decisions
//! - **Channels**: Browser, desktop and screenshot failures

use thiserror::Error;

/// Trait for Stride error extensions
pub trait StrideErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors leave the engine usable; the same task can be
    /// retried or a new one started for the session.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, StrideErrorExt};
///
/// let error = EngineError::UserRejected;
/// assert_eq!(error.to_string(), "User rejected action");
/// assert!(error.is_recoverable());
///
/// let error = EngineError::Config("bad log level".to_string());
/// println!("Hint: {}", error.user_hint());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Task loop errors
    #[error("User rejected action")]
    UserRejected,

    #[error("cancelled")]
    Cancelled,

    #[error("Max steps exceeded ({max_steps})")]
    MaxStepsExceeded { max_steps: usize },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // Reasoner errors
    #[error("Reasoner error: {0}")]
    Reasoner(String),

    #[error("Reasoner timed out after {0}s")]
    ReasonerTimeout(u64),

    #[error("Unparseable reasoner output: {0}")]
    ReasonerParse(String),

    // Channel errors
    #[error("Unknown action type")]
    UnknownActionType(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Browser automation is not available")]
    BrowserUnavailable,

    #[error("Desktop command failed: {0}")]
    Desktop(String),

    #[error("Desktop channel is not available")]
    DesktopUnavailable,

    #[error("No acknowledgement for '{command}' within {timeout_ms}ms")]
    AckTimeout { command: String, timeout_ms: u64 },

    #[error("Screenshot failed: {0}")]
    Screenshot(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StrideErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::InvalidRequest(_) => "Provide both a session id and a task description",

            Self::UserRejected => "The action was not confirmed. Rephrase the task to avoid it",
            Self::Cancelled => "The task was cancelled",
            Self::MaxStepsExceeded { .. } => "Task too complex. Try breaking it into smaller steps",
            Self::InvalidTransition { .. } => "Internal task state error. Please try again",

            Self::Reasoner(_) => "Reasoning backend unavailable. Check the reasoner settings",
            Self::ReasonerTimeout(_) => "Reasoning backend took too long to respond. Try again",
            Self::ReasonerParse(_) => "Reasoning backend returned an unreadable decision",

            Self::UnknownActionType(_) => "The requested action type is not supported",
            Self::Browser(_) => "Browser action failed. Check the page and selector",
            Self::BrowserUnavailable => "Enable the browser in config.toml",
            Self::Desktop(_) => "Desktop agent reported a failure",
            Self::DesktopUnavailable => "Enable the desktop agent link in config.toml",
            Self::AckTimeout { .. } => "Desktop agent did not respond. Is it running?",
            Self::Screenshot(_) => "Screen capture failed. Check the capture utility",

            Self::Network(_) => "Network operation failed. Check your connection",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_) | Self::InvalidTransition { .. } => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_message_is_stable() {
        assert_eq!(EngineError::UserRejected.to_string(), "User rejected action");
        assert_eq!(EngineError::Cancelled.to_string(), "cancelled");
        assert_eq!(
            EngineError::UnknownActionType("teleport".to_string()).to_string(),
            "Unknown action type"
        );
    }

    #[test]
    fn test_max_steps_message() {
        let err = EngineError::MaxStepsExceeded { max_steps: 10 };
        assert_eq!(err.to_string(), "Max steps exceeded (10)");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_non_recoverable_errors() {
        assert!(!EngineError::Config("x".to_string()).is_recoverable());
        assert!(!EngineError::InvalidTransition {
            from: "COMPLETED".to_string(),
            to: "ACTING".to_string(),
        }
        .is_recoverable());
        assert!(EngineError::AckTimeout {
            command: "open_app".to_string(),
            timeout_ms: 3000,
        }
        .is_recoverable());
    }

    #[test]
    fn test_every_error_has_hint() {
        let errors = vec![
            EngineError::Reasoner("down".to_string()),
            EngineError::ReasonerTimeout(60),
            EngineError::BrowserUnavailable,
            EngineError::DesktopUnavailable,
            EngineError::Screenshot("no scrot".to_string()),
        ];
        for err in errors {
            assert!(!err.user_hint().is_empty());
        }
    }
}
