//! Typed service configuration
//!
//! Every section has defaults, so an empty file (or no file) is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::utils::logging::{LogFormat, LogLevel, LoggingConfig};

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "VIDSQUEEZE_";

/// Encoder, probe and artifact settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Directory under which per-execution artifact directories are created
    pub artifact_root: PathBuf,
    pub attempt_timeout_secs: u64,
    /// Offer the in-process engine as a fallback strategy
    pub sandbox_enabled: bool,
    /// Probe source and output for duration and resolution
    pub probe_enabled: bool,
    /// Leftover artifact directories older than this are swept at start-up
    pub stale_artifact_secs: u64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            artifact_root: std::env::temp_dir().join("vidsqueeze"),
            attempt_timeout_secs: 300,
            sandbox_enabled: true,
            probe_enabled: true,
            stale_artifact_secs: 3600,
        }
    }
}

/// HTTP surface settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    pub max_upload_bytes: usize,
    pub max_concurrent_jobs: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            max_upload_bytes: 100 * 1024 * 1024,
            max_concurrent_jobs: num_cpus::get(),
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub encoder: EncoderConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Parse TOML text; `origin` only labels errors
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Read and parse a TOML file
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Apply `VIDSQUEEZE_*` overrides through `lookup`; returns how many applied
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<usize, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = 0;
        let mut var = |name: &str| {
            let key = format!("{}{}", ENV_PREFIX, name);
            let value = lookup(&key).filter(|v| !v.trim().is_empty());
            if value.is_some() {
                applied += 1;
            }
            value.map(|v| (key, v))
        };

        if let Some((_, v)) = var("FFMPEG_PATH") {
            self.encoder.ffmpeg_path = PathBuf::from(v);
        }
        if let Some((_, v)) = var("FFPROBE_PATH") {
            self.encoder.ffprobe_path = PathBuf::from(v);
        }
        if let Some((_, v)) = var("ARTIFACT_ROOT") {
            self.encoder.artifact_root = PathBuf::from(v);
        }
        if let Some((k, v)) = var("ATTEMPT_TIMEOUT_SECS") {
            self.encoder.attempt_timeout_secs = parse_number(&k, &v)?;
        }
        if let Some((k, v)) = var("SANDBOX_ENABLED") {
            self.encoder.sandbox_enabled = parse_bool(&k, &v)?;
        }
        if let Some((k, v)) = var("PROBE_ENABLED") {
            self.encoder.probe_enabled = parse_bool(&k, &v)?;
        }
        if let Some((_, v)) = var("BIND") {
            self.server.bind = v;
        }
        if let Some((k, v)) = var("MAX_UPLOAD_BYTES") {
            self.server.max_upload_bytes = parse_number(&k, &v)?;
        }
        if let Some((k, v)) = var("MAX_CONCURRENT_JOBS") {
            self.server.max_concurrent_jobs = parse_number(&k, &v)?;
        }
        if let Some((k, v)) = var("LOG_LEVEL") {
            self.logging.level = v
                .parse::<LogLevel>()
                .map_err(|reason| ConfigError::Env { var: k, reason })?;
        }
        if let Some((k, v)) = var("LOG_FORMAT") {
            self.logging.format = v
                .parse::<LogFormat>()
                .map_err(|reason| ConfigError::Env { var: k, reason })?;
        }

        Ok(applied)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.encoder.attempt_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "encoder.attempt_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_upload_bytes must be greater than zero".to_string(),
            ));
        }
        if self.server.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid(
                "server.max_concurrent_jobs must be greater than zero".to_string(),
            ));
        }
        if self.encoder.ffmpeg_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("encoder.ffmpeg_path is empty".to_string()));
        }
        Ok(())
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.encoder.attempt_timeout_secs)
    }

    pub fn stale_artifact_age(&self) -> Duration {
        Duration::from_secs(self.encoder.stale_artifact_secs)
    }
}

fn parse_number<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::Env {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Env {
            var: var.to_string(),
            reason: format!("expected a boolean, got `{}`", other),
        }),
    }
}
