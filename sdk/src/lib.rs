//! Stride SDK
//!
//! Shared library providing the action model, task events, error types and
//! the collaborator ports used by the engine and its adapters.

/// Action model
pub mod action;

/// Error types and handling
pub mod errors;

/// Outbound task events
pub mod events;

/// Collaborator traits
pub mod ports;

// Re-export commonly used types
pub use action::{
    Action, ActionKind, AppParams, BrowserParams, KeyboardParams, MouseButton, MouseParams,
    SystemParams, WaitParams,
};
pub use errors::{EngineError, StrideErrorExt};
pub use events::{StepPhase, TaskEvent};
pub use ports::{
    BrowserAutomation, Decision, DesktopAck, DesktopChannel, EventSink, Reasoner,
    ReasonerContext, ScreenshotService, StepSummary,
};
