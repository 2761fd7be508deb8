//! CLI interface for Stride
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stride task runner
///
/// Turns a free-text request into a bounded sequence of browser and desktop
/// actions, asking before anything destructive.
#[derive(Parser, Debug)]
#[command(name = "stride")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a task
    Run {
        /// The task to execute
        task: String,

        /// Session the task runs in
        #[arg(long, default_value = "cli")]
        session: String,

        /// Override the maximum number of steps
        #[arg(long)]
        max_steps: Option<usize>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the configuration file location
    Path,

    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["stride", "run", "open notepad and type hello"]);
        match cli.command {
            Command::Run {
                task,
                session,
                max_steps,
            } => {
                assert_eq!(task, "open notepad and type hello");
                assert_eq!(session, "cli");
                assert_eq!(max_steps, None);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_with_overrides() {
        let cli = Cli::parse_from([
            "stride",
            "run",
            "search the web",
            "--session",
            "desk-1",
            "--max-steps",
            "3",
        ]);
        if let Command::Run {
            session, max_steps, ..
        } = cli.command
        {
            assert_eq!(session, "desk-1");
            assert_eq!(max_steps, Some(3));
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["stride", "config", "path"]);
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Path
            }
        ));
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from([
            "stride",
            "--json",
            "--log",
            "debug",
            "--config",
            "/tmp/stride.toml",
            "config",
            "validate",
        ]);
        assert!(cli.json);
        assert_eq!(cli.log.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/stride.toml")));
    }
}
