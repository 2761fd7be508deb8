//! Configuration management
//!
//! This module handles loading, validation, and management of the Stride configuration.
//! Configuration is stored in TOML format at ~/.stride/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level
//! - **agent**: Task loop limits and timings
//! - **reasoner**: HTTP reasoner endpoint and model
//! - **browser**: Browser automation settings
//! - **desktop**: Desktop agent link and acknowledgement timeouts
//! - **screenshot**: Screen capture settings
//!
//! Every section except `core` is optional and falls back to defaults.
//!
//! # Examples
//!
//! ```no_run
//! use stride_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Max steps: {}", config.agent.max_steps);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agent::LoopSettings;
use crate::executor::AckTimeouts;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Task loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Reasoner endpoint settings
    #[serde(default)]
    pub reasoner: ReasonerConfig,

    /// Browser automation settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Desktop agent link settings
    #[serde(default)]
    pub desktop: DesktopConfig,

    /// Screen capture settings
    #[serde(default)]
    pub screenshot: ScreenshotConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Task loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum reasoning iterations per task
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Pause between iterations (milliseconds)
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,

    /// Timeout for a single reasoner call (seconds)
    #[serde(default = "default_reasoner_timeout_secs")]
    pub reasoner_timeout_secs: u64,

    /// How long a gated action waits for the user (seconds)
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,

    /// Duration of a `wait` action without an explicit duration (milliseconds)
    #[serde(default = "default_wait_ms")]
    pub default_wait_ms: u64,
}

/// Reasoner endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonerConfig {
    /// Base URL of an Ollama-compatible chat API
    #[serde(default = "default_reasoner_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_reasoner_model")]
    pub model: String,
}

/// Browser automation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Launch a browser for browser actions
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Run the browser without a window
    #[serde(default)]
    pub headless: bool,

    /// Explicit browser executable (auto-detected when absent)
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
}

/// Desktop agent link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesktopConfig {
    /// Connect to the desktop agent
    #[serde(default)]
    pub enabled: bool,

    /// WebSocket URL of the desktop agent
    #[serde(default = "default_desktop_url")]
    pub url: String,

    /// Authentication token sent on connect
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Delay in seconds before reconnecting after disconnect
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Acknowledgement timeout for app commands (milliseconds)
    #[serde(default = "default_app_ack_ms")]
    pub app_ack_ms: u64,

    /// Acknowledgement timeout for system commands (milliseconds)
    #[serde(default = "default_system_ack_ms")]
    pub system_ack_ms: u64,

    /// Acknowledgement timeout for keyboard input (milliseconds)
    #[serde(default = "default_input_ack_ms")]
    pub keyboard_ack_ms: u64,

    /// Acknowledgement timeout for mouse input (milliseconds)
    #[serde(default = "default_input_ack_ms")]
    pub mouse_ack_ms: u64,
}

/// Screen capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotConfig {
    /// Capture the screen after each step
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory for captured images (supports ~ expansion)
    #[serde(default = "default_screenshot_dir")]
    pub output_dir: PathBuf,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_steps() -> usize {
    10
}

fn default_step_delay_ms() -> u64 {
    500
}

fn default_reasoner_timeout_secs() -> u64 {
    60
}

fn default_confirmation_timeout_secs() -> u64 {
    30
}

fn default_wait_ms() -> u64 {
    1000
}

fn default_reasoner_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_reasoner_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_desktop_url() -> String {
    "ws://localhost:9091/desktop".to_string()
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_app_ack_ms() -> u64 {
    3000
}

fn default_system_ack_ms() -> u64 {
    3000
}

fn default_input_ack_ms() -> u64 {
    1000
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("~/.stride/screenshots")
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            step_delay_ms: default_step_delay_ms(),
            reasoner_timeout_secs: default_reasoner_timeout_secs(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            default_wait_ms: default_wait_ms(),
        }
    }
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            base_url: default_reasoner_base_url(),
            model: default_reasoner_model(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            headless: false,
            chrome_path: None,
        }
    }
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_desktop_url(),
            auth_token: None,
            reconnect_delay_secs: default_reconnect_delay(),
            app_ack_ms: default_app_ack_ms(),
            system_ack_ms: default_system_ack_ms(),
            keyboard_ack_ms: default_input_ack_ms(),
            mouse_ack_ms: default_input_ack_ms(),
        }
    }
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: default_screenshot_dir(),
        }
    }
}

impl AgentConfig {
    /// Loop settings derived from this section
    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            max_steps: self.max_steps,
            step_delay: Duration::from_millis(self.step_delay_ms),
            reasoner_timeout: Duration::from_secs(self.reasoner_timeout_secs),
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_secs),
        }
    }
}

impl DesktopConfig {
    /// Per-channel acknowledgement timeouts
    pub fn ack_timeouts(&self) -> AckTimeouts {
        AckTimeouts {
            app: Duration::from_millis(self.app_ack_ms),
            system: Duration::from_millis(self.system_ack_ms),
            keyboard: Duration::from_millis(self.keyboard_ack_ms),
            mouse: Duration::from_millis(self.mouse_ack_ms),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.stride/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();

        // Serialize before processing so the file keeps the unexpanded ~ paths
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.stride/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".stride").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig::default(),
            agent: AgentConfig::default(),
            reasoner: ReasonerConfig::default(),
            browser: BrowserConfig::default(),
            desktop: DesktopConfig::default(),
            screenshot: ScreenshotConfig::default(),
        }
    }

    /// Validate and process configuration
    ///
    /// Checks value ranges and expands `~` in the screenshot directory.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.agent.max_steps == 0 {
            return Err(EngineError::Config(
                "max_steps must be at least 1".to_string(),
            ));
        }

        if self.agent.reasoner_timeout_secs == 0 || self.agent.confirmation_timeout_secs == 0 {
            return Err(EngineError::Config(
                "reasoner_timeout_secs and confirmation_timeout_secs must be positive".to_string(),
            ));
        }

        if !self.reasoner.base_url.starts_with("http://")
            && !self.reasoner.base_url.starts_with("https://")
        {
            return Err(EngineError::Config(format!(
                "Invalid reasoner base_url '{}'. Must start with http:// or https://",
                self.reasoner.base_url
            )));
        }

        if self.desktop.enabled
            && !self.desktop.url.starts_with("ws://")
            && !self.desktop.url.starts_with("wss://")
        {
            return Err(EngineError::Config(format!(
                "Invalid desktop url '{}'. Must start with ws:// or wss://",
                self.desktop.url
            )));
        }

        let ack_values = [
            self.desktop.app_ack_ms,
            self.desktop.system_ack_ms,
            self.desktop.keyboard_ack_ms,
            self.desktop.mouse_ack_ms,
        ];
        if ack_values.iter().any(|ms| *ms == 0) {
            return Err(EngineError::Config(
                "desktop acknowledgement timeouts must be positive".to_string(),
            ));
        }

        self.screenshot.output_dir = expand_path(&self.screenshot.output_dir)?;

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
