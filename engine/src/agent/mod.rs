//! Task loop core
//!
//! The controller drives each task through an iterative
//! reason → act → observe cycle, gating dangerous actions behind user
//! confirmation and tracking one live task per session in the registry.

pub mod controller;
pub mod registry;
pub mod task;

pub use controller::{LoopSettings, TaskController};
pub use registry::{TaskHandle, TaskRegistry};
pub use task::{Step, Task, TaskContext, TaskOutcome, TaskReport, TaskSnapshot, TaskState};
