//! Command-line argument definitions

use std::path::PathBuf;

use clap::{Args, ValueEnum};

/// Largest bitrate the CLI accepts, in kbps
pub const MAX_BITRATE_KBPS: u32 = 100_000;

fn bitrate_in_range(s: &str) -> Result<u32, String> {
    clap_num::number_range(s, 1, MAX_BITRATE_KBPS)
}

/// Report output format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

/// Arguments for the compress command
#[derive(Args, Debug)]
pub struct CompressArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file path (default: <input stem>-compressed.<format>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output container format (mp4, webm, mov)
    #[arg(short, long, default_value = "mp4")]
    pub format: String,

    /// Target video bitrate in kbps
    #[arg(short, long, default_value = "1500", value_parser = bitrate_in_range)]
    pub bitrate: u32,

    /// Keep the source frame size instead of scaling to 720p
    #[arg(long)]
    pub maintain_resolution: bool,

    /// Drop all audio streams
    #[arg(long)]
    pub remove_audio: bool,

    /// Try hardware-accelerated decoding first
    #[arg(long)]
    pub hw_accel: bool,

    /// Overwrite the output file if it exists
    #[arg(long)]
    pub force: bool,

    /// Report format printed on success
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub report: ReportFormat,
}

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address (overrides server.bind)
    #[arg(long)]
    pub bind: Option<String>,
}

/// Arguments for the check command
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
