// Domain models - Core types and data structures

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::domain::errors::CompressionError;

/// Bitrate used when the submission omits one or sends garbage
pub const DEFAULT_BITRATE_KBPS: u32 = 1500;

/// Extension given to staged sources whose upload name is unknown
pub const DEFAULT_SOURCE_EXTENSION: &str = "bin";

/// Output container requested by the submitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Mp4,
    Webm,
    Mov,
}

impl TargetFormat {
    /// All accepted formats, in display order
    pub const ALL: [TargetFormat; 3] = [TargetFormat::Mp4, TargetFormat::Webm, TargetFormat::Mov];

    /// File extension for the container
    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Mp4 => "mp4",
            TargetFormat::Webm => "webm",
            TargetFormat::Mov => "mov",
        }
    }

    /// Muxer name passed to the encoder with `-f`
    pub fn muxer(&self) -> &'static str {
        self.extension()
    }

    /// MIME type of the produced container
    pub fn mime_type(&self) -> &'static str {
        match self {
            TargetFormat::Mp4 => "video/mp4",
            TargetFormat::Webm => "video/webm",
            TargetFormat::Mov => "video/quicktime",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for TargetFormat {
    type Err = CompressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(TargetFormat::Mp4),
            "webm" => Ok(TargetFormat::Webm),
            "mov" => Ok(TargetFormat::Mov),
            other => Err(CompressionError::invalid_option(
                "format",
                format!("unsupported format `{}`", other),
            )),
        }
    }
}

/// Whether an attempt asks the decoder for hardware acceleration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccelerationMode {
    Enabled,
    Disabled,
}

impl AccelerationMode {
    pub fn from_preference(prefer: bool) -> Self {
        if prefer {
            AccelerationMode::Enabled
        } else {
            AccelerationMode::Disabled
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, AccelerationMode::Enabled)
    }
}

impl fmt::Display for AccelerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccelerationMode::Enabled => write!(f, "accelerated"),
            AccelerationMode::Disabled => write!(f, "software"),
        }
    }
}

/// Execution backend identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// External encoder binary against real files
    Local,
    /// In-process engine against a private virtual filesystem
    Sandboxed,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Local => write!(f, "local"),
            StrategyKind::Sandboxed => write!(f, "sandboxed"),
        }
    }
}

/// How a single attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Pending,
    Succeeded,
    AccelerationUnsupported,
    Failed,
    TimedOut,
}

/// One (strategy, acceleration) pair tried for a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyAttempt {
    pub strategy: StrategyKind,
    pub acceleration: AccelerationMode,
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
}

impl StrategyAttempt {
    /// Create a pending attempt record
    pub fn new(strategy: StrategyKind, acceleration: AccelerationMode) -> Self {
        Self {
            strategy,
            acceleration,
            outcome: AttemptOutcome::Pending,
            elapsed_ms: 0,
        }
    }

    /// Whether this record covers the given pair
    pub fn is_pair(&self, strategy: StrategyKind, acceleration: AccelerationMode) -> bool {
        self.strategy == strategy && self.acceleration == acceleration
    }
}

/// Raw form-like submission before validation
#[derive(Debug, Clone, Default)]
pub struct FormFields {
    pub fields: HashMap<String, String>,
    pub media: Option<Bytes>,
    pub file_name: Option<String>,
}

impl FormFields {
    /// Create an empty submission
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Attach the media payload
    pub fn with_media(mut self, media: impl Into<Bytes>) -> Self {
        self.media = Some(media.into());
        self
    }

    /// Record the payload's original file name
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// First non-empty value among the given field names
    pub fn get(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.fields.get(*name))
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
    }
}

/// A validated compression request
#[derive(Clone, PartialEq)]
pub struct CompressionRequest {
    pub media: Bytes,
    pub bitrate_kbps: u32,
    pub target_format: TargetFormat,
    pub maintain_resolution: bool,
    pub remove_audio: bool,
    pub prefer_hardware_acceleration: bool,
    pub source_extension: String,
}

impl CompressionRequest {
    /// Create a request with default options for the given payload
    pub fn new(media: impl Into<Bytes>, target_format: TargetFormat) -> Self {
        Self {
            media: media.into(),
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
            target_format,
            maintain_resolution: false,
            remove_audio: false,
            prefer_hardware_acceleration: false,
            source_extension: DEFAULT_SOURCE_EXTENSION.to_string(),
        }
    }

    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = kbps;
        self
    }

    pub fn with_maintain_resolution(mut self, maintain: bool) -> Self {
        self.maintain_resolution = maintain;
        self
    }

    pub fn with_remove_audio(mut self, remove: bool) -> Self {
        self.remove_audio = remove;
        self
    }

    pub fn with_hardware_acceleration(mut self, prefer: bool) -> Self {
        self.prefer_hardware_acceleration = prefer;
        self
    }

    /// Acceleration mode the submitter asked for
    pub fn acceleration(&self) -> AccelerationMode {
        AccelerationMode::from_preference(self.prefer_hardware_acceleration)
    }

    /// Size of the submitted payload
    pub fn original_size_bytes(&self) -> u64 {
        self.media.len() as u64
    }
}

impl fmt::Debug for CompressionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionRequest")
            .field("media_bytes", &self.media.len())
            .field("bitrate_kbps", &self.bitrate_kbps)
            .field("target_format", &self.target_format)
            .field("maintain_resolution", &self.maintain_resolution)
            .field("remove_audio", &self.remove_audio)
            .field("prefer_hardware_acceleration", &self.prefer_hardware_acceleration)
            .field("source_extension", &self.source_extension)
            .finish()
    }
}

/// Output bytes of a successful strategy run
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub output: Bytes,
    pub output_size_bytes: u64,
}

impl ExecutionOutcome {
    pub fn new(output: Bytes) -> Self {
        let output_size_bytes = output.len() as u64;
        Self {
            output,
            output_size_bytes,
        }
    }
}

/// Best-effort media metadata; every field may be unknown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSummary {
    pub duration_seconds: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub has_video: Option<bool>,
    pub has_audio: Option<bool>,
}

impl MediaSummary {
    /// Summary with nothing known
    pub fn unknown() -> Self {
        Self::default()
    }

    /// "WxH", or "N/A" when either dimension is unknown
    pub fn resolution(&self) -> String {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => format!("{}x{}", w, h),
            _ => "N/A".to_string(),
        }
    }

    /// Duration in seconds, 0 when unknown
    pub fn duration_or_zero(&self) -> f64 {
        self.duration_seconds.filter(|d| d.is_finite() && *d > 0.0).unwrap_or(0.0)
    }
}

/// Final result of a successful compression
#[derive(Debug, Clone)]
pub struct CompressionOutput {
    pub original_size_bytes: u64,
    pub compressed_size_bytes: u64,
    pub media: Bytes,
    pub duration_seconds: f64,
    pub resolution: String,
    pub format: TargetFormat,
    pub strategy: StrategyKind,
    pub attempts: Vec<StrategyAttempt>,
}

impl CompressionOutput {
    /// Compressed size as a fraction of the original
    pub fn compression_ratio(&self) -> f64 {
        if self.original_size_bytes == 0 {
            return 0.0;
        }
        self.compressed_size_bytes as f64 / self.original_size_bytes as f64
    }
}
