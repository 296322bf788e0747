//! vidsqueeze command-line entry point
//!
//! # Usage
//!
//! ```bash
//! vidsqueeze compress --input clip.mov --format webm --bitrate 800
//! vidsqueeze serve --bind 0.0.0.0:8080
//! vidsqueeze check
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

use vidsqueeze::app::DefaultAppContainer;
use vidsqueeze::artifacts::sweep_stale;
use vidsqueeze::cli::{commands, Cli, Commands};
use vidsqueeze::config_initialization::{initialize_configuration_hierarchy, CliOverrides};
use vidsqueeze::utils::logging::LoggingSystem;

/// Main entry point for the vidsqueeze CLI application
#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    let overrides = CliOverrides {
        log_level: cli.log_level,
        log_format: cli.log_format,
        bind: match &cli.command {
            Commands::Serve(args) => args.bind.clone(),
            _ => None,
        },
    };
    let (config, origin) =
        initialize_configuration_hierarchy(cli.config.as_deref(), &overrides, |key| std::env::var(key).ok())?;

    // Initialize logging
    let logging = LoggingSystem::new(config.logging.clone());
    logging.initialize()?;
    logging.log_system_info();
    match &origin.file {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => debug!("No configuration file found, using defaults"),
    }
    debug!(
        env_overrides = origin.env_overrides,
        cli_overrides = origin.cli_overrides,
        "Configuration hierarchy initialized"
    );

    let swept = sweep_stale(&config.encoder.artifact_root, config.stale_artifact_age());
    if swept > 0 {
        info!("Removed {} stale artifact directories", swept);
    }

    let container = DefaultAppContainer::new(&config);

    // Execute the requested command
    match cli.command {
        Commands::Compress(args) => commands::compress(&container, args).await?,
        Commands::Serve(_) => commands::serve(&container, &config).await?,
        Commands::Check(args) => commands::check(&container, args).await?,
    }

    debug!(
        artifacts_created = container.ledger().created(),
        artifacts_released = container.ledger().released(),
        "vidsqueeze finished"
    );
    Ok(())
}
