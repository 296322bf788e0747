//! Encoder command planning
//!
//! Turns a validated [`CompressionRequest`](crate::domain::model::CompressionRequest)
//! into an ordered [`CommandPlan`]. Planning is pure: the same request always
//! yields the same plan, and nothing here touches the filesystem or spawns
//! processes. Steps reference artifacts symbolically; execution strategies
//! bind those references to real paths or virtual entries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::model::{AccelerationMode, TargetFormat};

pub mod builder;
pub mod codec;

pub use builder::CommandPlanner;

/// Purpose of an artifact within a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    /// The submitted media
    Source,
    /// Video-only intermediate of a split plan
    VideoTrack,
    /// Audio-only intermediate of a split plan
    AudioTrack,
    /// The final container
    Output,
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactRole::Source => write!(f, "input"),
            ArtifactRole::VideoTrack => write!(f, "video"),
            ArtifactRole::AudioTrack => write!(f, "audio"),
            ArtifactRole::Output => write!(f, "output"),
        }
    }
}

/// Symbolic reference to an artifact a step reads or writes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub role: ArtifactRole,
    pub extension: String,
}

impl ArtifactRef {
    pub fn new(role: ArtifactRole, extension: impl Into<String>) -> Self {
        Self {
            role,
            extension: extension.into(),
        }
    }

    /// Request-unique file name for this artifact
    pub fn file_name(&self, token: &str) -> String {
        format!("{}-{}.{}", token, self.role, self.extension)
    }
}

/// What a step does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Full transcode of video and audio into the final container
    Transcode,
    /// Video-only encode into an intermediate
    VideoOnly,
    /// Audio-only encode into an intermediate
    AudioOnly,
    /// Stream-copy remux of intermediates into the final container
    Remux,
}

impl StepKind {
    /// Whether the step decodes the source video
    pub fn decodes_video(&self) -> bool {
        matches!(self, StepKind::Transcode | StepKind::VideoOnly)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Transcode => write!(f, "transcode"),
            StepKind::VideoOnly => write!(f, "video-only"),
            StepKind::AudioOnly => write!(f, "audio-only"),
            StepKind::Remux => write!(f, "remux"),
        }
    }
}

/// One encoder invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeStep {
    pub kind: StepKind,
    /// Options placed before the inputs (decoder side)
    pub input_options: Vec<String>,
    pub inputs: Vec<ArtifactRef>,
    /// Options placed between the inputs and the output
    pub arguments: Vec<String>,
    pub output: ArtifactRef,
    /// Set only for hardware-accelerated steps
    pub may_fail_gracefully: bool,
}

impl EncodeStep {
    /// Render the full argument vector against concrete locations.
    ///
    /// `input_locations` must be in the same order as [`EncodeStep::inputs`].
    pub fn render(&self, input_locations: &[String], output_location: &str) -> Vec<String> {
        let mut argv = Vec::with_capacity(
            self.input_options.len() + input_locations.len() * 2 + self.arguments.len() + 2,
        );
        argv.extend(self.input_options.iter().cloned());
        for location in input_locations {
            argv.push("-i".to_string());
            argv.push(location.clone());
        }
        argv.extend(self.arguments.iter().cloned());
        argv.push("-y".to_string());
        argv.push(output_location.to_string());
        argv
    }

    /// Whether any argument equals `flag`
    pub fn has_argument(&self, flag: &str) -> bool {
        self.arguments.iter().any(|a| a == flag)
    }

    /// Value following `flag` in the argument list
    pub fn argument_value(&self, flag: &str) -> Option<&str> {
        self.arguments
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.arguments.get(i + 1))
            .map(String::as_str)
    }
}

/// Ordered encoder steps for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPlan {
    pub format: TargetFormat,
    pub acceleration: AccelerationMode,
    pub source: ArtifactRef,
    pub steps: Vec<EncodeStep>,
}

impl CommandPlan {
    /// The artifact produced by the final step
    pub fn output(&self) -> Option<&ArtifactRef> {
        self.steps.last().map(|step| &step.output)
    }

    /// Index of the last step that reads `artifact`
    pub fn last_use(&self, artifact: &ArtifactRef) -> Option<usize> {
        self.steps
            .iter()
            .rposition(|step| step.inputs.iter().any(|input| input == artifact))
    }

    /// Artifacts that are no longer needed once step `index` has finished
    pub fn releasable_after(&self, index: usize) -> Vec<ArtifactRef> {
        let mut candidates: Vec<ArtifactRef> = Vec::new();
        if let Some(step) = self.steps.get(index) {
            for input in &step.inputs {
                if self.last_use(input) == Some(index) && !candidates.contains(input) {
                    candidates.push(input.clone());
                }
            }
        }
        candidates
    }

    /// Whether any step asks for hardware acceleration
    pub fn is_accelerated(&self) -> bool {
        self.steps.iter().any(|step| step.may_fail_gracefully)
    }
}
