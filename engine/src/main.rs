// Stride task runner
// Main entry point for the stride binary

use clap::Parser;
use stride_engine::cli::{Cli, Command, ConfigAction};
use stride_engine::config::Config;
use stride_engine::handlers::{handle_config_path, handle_config_show, handle_run, OutputFormat};
use stride_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // `config path` must work even when the file is broken
    if let Command::Config {
        action: ConfigAction::Path,
    } = &cli.command
    {
        return handle_config_path(cli.config.as_deref(), format);
    }

    // Load configuration (or use custom path if provided)
    let mut config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log beats the config file; RUST_LOG beats both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level).to_string();
    init_telemetry_with_level(&log_level);

    tracing::info!("Stride v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Run {
            task,
            session,
            max_steps,
        } => {
            if let Some(max_steps) = max_steps {
                anyhow::ensure!(max_steps > 0, "--max-steps must be at least 1");
                config.agent.max_steps = max_steps;
            }
            handle_run(task, session, &config, format).await
        }

        Command::Config { action } => match action {
            ConfigAction::Path => handle_config_path(cli.config.as_deref(), format),
            ConfigAction::Show => handle_config_show(&config, format),
            ConfigAction::Validate => {
                // Loading already validated it
                println!("Configuration is valid.");
                Ok(())
            }
        },
    }
}
