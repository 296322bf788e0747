//! Configuration initialization and hierarchy management

use std::path::{Path, PathBuf};

use crate::config::ServiceConfig;
use crate::error::ConfigError;
use crate::utils::logging::{LogFormat, LogLevel};

/// Files searched, in order, when no `--config` is given
pub const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/production.toml",
    "config/development.toml",
    "vidsqueeze.toml",
];

/// Settings the command line may override
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub log_level: Option<LogLevel>,
    pub log_format: Option<LogFormat>,
    pub bind: Option<String>,
}

/// Where the final configuration came from
#[derive(Debug, Clone)]
pub struct ConfigOrigin {
    pub file: Option<PathBuf>,
    pub env_overrides: usize,
    pub cli_overrides: usize,
}

/// Build configuration following precedence: CLI > Env > File > Defaults.
///
/// Nothing is logged here because the subscriber depends on the result;
/// callers log the returned [`ConfigOrigin`] once logging is up.
pub fn initialize_configuration_hierarchy(
    explicit: Option<&Path>,
    overrides: &CliOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(ServiceConfig, ConfigOrigin), ConfigError> {
    // Step 1 and 2: defaults, then the first config file found
    let (mut config, file) = load_config_file(explicit)?;

    // Step 3: environment variables
    let env_overrides = config.apply_env(env)?;

    // Step 4: CLI arguments
    let cli_overrides = apply_cli_configuration_overrides(&mut config, overrides);

    config.validate()?;
    Ok((
        config,
        ConfigOrigin {
            file,
            env_overrides,
            cli_overrides,
        },
    ))
}

/// Load the explicit file (which must exist) or the first default path present
fn load_config_file(explicit: Option<&Path>) -> Result<(ServiceConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = explicit {
        return Ok((ServiceConfig::load_file(path)?, Some(path.to_path_buf())));
    }

    for candidate in DEFAULT_CONFIG_PATHS {
        let path = Path::new(candidate);
        if path.is_file() {
            return Ok((ServiceConfig::load_file(path)?, Some(path.to_path_buf())));
        }
    }

    Ok((ServiceConfig::default(), None))
}

fn apply_cli_configuration_overrides(config: &mut ServiceConfig, overrides: &CliOverrides) -> usize {
    let mut applied = 0;
    if let Some(level) = overrides.log_level {
        config.logging.level = level;
        applied += 1;
    }
    if let Some(format) = overrides.log_format {
        config.logging.format = format;
        applied += 1;
    }
    if let Some(bind) = &overrides.bind {
        config.server.bind = bind.clone();
        applied += 1;
    }
    applied
}
