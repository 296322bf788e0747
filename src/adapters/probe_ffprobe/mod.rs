//! FFprobe adapter for media summaries
//!
//! Stages the payload in a private directory and reads duration, frame
//! size and stream presence from ffprobe's JSON report.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use crate::adapters::process::{ToolCommand, ToolError};
use crate::artifacts::{ArtifactLedger, ArtifactScope, ArtifactToken, DiskStore};
use crate::domain::errors::*;
use crate::domain::model::*;
use crate::planner::{ArtifactRef, ArtifactRole};
use crate::ports::*;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

/// Parse ffprobe `-print_format json -show_format -show_streams` output
pub fn parse_report(json: &[u8]) -> Result<MediaSummary, ProbeError> {
    let report: ProbeReport =
        serde_json::from_slice(json).map_err(|e| ProbeError::Parse(e.to_string()))?;

    let video = report
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let has_audio = report
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let duration_seconds = report
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or_else(|| video.and_then(|v| v.duration.as_deref()))
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0);

    Ok(MediaSummary {
        duration_seconds,
        width: video.and_then(|v| v.width),
        height: video.and_then(|v| v.height),
        has_video: Some(video.is_some()),
        has_audio: Some(has_audio),
    })
}

/// [`ProbePort`] backed by the ffprobe binary
pub struct FfprobeAdapter {
    ffprobe_path: PathBuf,
    artifact_root: PathBuf,
    timeout: Duration,
    ledger: ArtifactLedger,
}

impl FfprobeAdapter {
    /// Create new FFprobe adapter
    pub fn new(ffprobe_path: impl Into<PathBuf>, artifact_root: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            artifact_root: artifact_root.into(),
            timeout: DEFAULT_PROBE_TIMEOUT,
            ledger: ArtifactLedger::new(),
        }
    }

    /// Wall-clock limit for one ffprobe run
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_ledger(mut self, ledger: ArtifactLedger) -> Self {
        self.ledger = ledger;
        self
    }

    fn tool_error(&self, error: ToolError) -> ProbeError {
        match error {
            ToolError::NotFound { .. } | ToolError::Spawn { .. } => {
                ProbeError::ToolMissing(error.to_string())
            }
            ToolError::TimedOut { timeout, .. } => ProbeError::Timeout(timeout),
            ToolError::Wait { .. } => ProbeError::Failed(error.to_string()),
        }
    }
}

#[async_trait]
impl ProbePort for FfprobeAdapter {
    async fn probe(&self, media: Bytes) -> Result<MediaSummary, ProbeError> {
        let store = DiskStore::new_in(&self.artifact_root)
            .map_err(|e| ProbeError::Failed(e.to_string()))?;
        let mut scope = ArtifactScope::new(store, ArtifactToken::generate(), self.ledger.clone());
        let source = ArtifactRef::new(ArtifactRole::Source, DEFAULT_SOURCE_EXTENSION);
        let staged = scope
            .stage(&source, &media)
            .map_err(|e| ProbeError::Failed(e.to_string()))?;

        let output = ToolCommand::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(staged.location.clone())
            .timeout(self.timeout)
            .output()
            .await
            .map_err(|e| self.tool_error(e))?;

        if !output.success() {
            return Err(ProbeError::Failed(format!(
                "ffprobe exited with {}: {}",
                output.status,
                output.stderr_tail()
            )));
        }

        let summary = parse_report(&output.stdout)?;
        debug!(
            duration = ?summary.duration_seconds,
            resolution = %summary.resolution(),
            has_audio = ?summary.has_audio,
            "Probed media"
        );
        Ok(summary)
    }

    async fn probe_availability(&self) -> Availability {
        let result = ToolCommand::new(&self.ffprobe_path)
            .arg("-version")
            .timeout(Duration::from_secs(10))
            .output()
            .await;
        match result {
            Ok(output) if output.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                Availability::available(stdout.lines().next().unwrap_or("ffprobe").trim().to_string())
            }
            Ok(output) => Availability::unavailable(format!("ffprobe -version exited with {}", output.status)),
            Err(e) => Availability::unavailable(e.to_string()),
        }
    }
}
