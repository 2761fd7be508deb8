//! Stride Engine Library
//!
//! This library provides the task loop that turns a free-text request into a
//! bounded sequence of browser and desktop actions, together with the
//! adapters that connect it to the outside world.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Dangerous action classification
pub mod security_gate;

/// User confirmation of gated actions
pub mod confirmation;

/// Action dispatch to browser, desktop and timing channels
pub mod executor;

/// Post-action observation
pub mod observer;

/// Reasoner port helpers and HTTP reasoner
pub mod reasoner;

/// Task loop core module
pub mod agent;

/// Message bus for task events
pub mod message_bus;

/// Browser automation adapter
pub mod browser;

/// WebSocket link to the desktop agent
pub mod desktop;

/// Screen capture adapter
pub mod screenshot;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers for the CLI
pub mod handlers;
