//! Command plan construction

use tracing::debug;

use crate::domain::model::{AccelerationMode, CompressionRequest, TargetFormat};
use crate::planner::codec::{self, STRIP_METADATA};
use crate::planner::{ArtifactRef, ArtifactRole, CommandPlan, EncodeStep, StepKind};

/// Builds encoder plans from validated requests
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandPlanner;

impl CommandPlanner {
    /// Create a new command planner
    pub fn new() -> Self {
        Self
    }

    /// Plan honoring the request's acceleration preference
    pub fn plan(&self, request: &CompressionRequest) -> CommandPlan {
        self.plan_with_acceleration(request, request.acceleration())
    }

    /// Plan with an explicit acceleration mode
    pub fn plan_with_acceleration(
        &self,
        request: &CompressionRequest,
        acceleration: AccelerationMode,
    ) -> CommandPlan {
        let source = ArtifactRef::new(ArtifactRole::Source, request.source_extension.clone());
        let output = ArtifactRef::new(ArtifactRole::Output, request.target_format.extension());

        let steps = if request.target_format == TargetFormat::Webm && !request.remove_audio {
            self.split_steps(request, acceleration, &source, output)
        } else {
            vec![self.transcode_step(request, acceleration, &source, output)]
        };

        debug!(
            format = %request.target_format,
            acceleration = %acceleration,
            steps = steps.len(),
            "Planned encoder command"
        );

        CommandPlan {
            format: request.target_format,
            acceleration,
            source,
            steps,
        }
    }

    fn transcode_step(
        &self,
        request: &CompressionRequest,
        acceleration: AccelerationMode,
        source: &ArtifactRef,
        output: ArtifactRef,
    ) -> EncodeStep {
        let mut arguments = vec!["-map".to_string(), "0:v:0".to_string()];
        if !request.remove_audio {
            arguments.push("-map".to_string());
            arguments.push("0:a:0?".to_string());
        }
        arguments.extend(self.video_arguments(request));
        if request.remove_audio {
            arguments.push("-an".to_string());
        } else {
            arguments.extend(codec::audio_profile(request.target_format).stream_args());
        }
        arguments.extend(to_strings(codec::video_profile(request.target_format).rate_control));
        arguments.extend(to_strings(STRIP_METADATA));
        arguments.extend(codec::container_profile(request.target_format).muxer_args());

        self.decoding_step(StepKind::Transcode, acceleration, source, arguments, output)
    }

    /// Video-only, audio-only, then a stream-copy remux
    fn split_steps(
        &self,
        request: &CompressionRequest,
        acceleration: AccelerationMode,
        source: &ArtifactRef,
        output: ArtifactRef,
    ) -> Vec<EncodeStep> {
        let format = request.target_format;
        let muxer = codec::container_profile(format).muxer_args();
        let video_track = ArtifactRef::new(ArtifactRole::VideoTrack, format.extension());
        let audio_track = ArtifactRef::new(ArtifactRole::AudioTrack, format.extension());

        let mut video_args = vec!["-map".to_string(), "0:v:0".to_string()];
        video_args.extend(self.video_arguments(request));
        video_args.push("-an".to_string());
        video_args.extend(to_strings(codec::video_profile(format).rate_control));
        video_args.extend(to_strings(STRIP_METADATA));
        video_args.extend(muxer.iter().cloned());
        let video_step = self.decoding_step(
            StepKind::VideoOnly,
            acceleration,
            source,
            video_args,
            video_track.clone(),
        );

        let mut audio_args = vec!["-map".to_string(), "0:a:0".to_string(), "-vn".to_string()];
        audio_args.extend(codec::audio_profile(format).stream_args());
        audio_args.extend(to_strings(STRIP_METADATA));
        audio_args.extend(muxer.iter().cloned());
        let audio_step = EncodeStep {
            kind: StepKind::AudioOnly,
            input_options: Vec::new(),
            inputs: vec![source.clone()],
            arguments: audio_args,
            output: audio_track.clone(),
            may_fail_gracefully: false,
        };

        let mut remux_args = to_strings(&["-map", "0:v:0", "-map", "1:a:0", "-c", "copy"]);
        remux_args.extend(to_strings(STRIP_METADATA));
        remux_args.extend(muxer);
        let remux_step = EncodeStep {
            kind: StepKind::Remux,
            input_options: Vec::new(),
            inputs: vec![video_track, audio_track],
            arguments: remux_args,
            output,
            may_fail_gracefully: false,
        };

        vec![video_step, audio_step, remux_step]
    }

    /// Codec, bitrate and optional scale filter for the video stream
    fn video_arguments(&self, request: &CompressionRequest) -> Vec<String> {
        let mut args = codec::video_profile(request.target_format).stream_args(request.bitrate_kbps);
        if !request.maintain_resolution {
            args.push("-vf".to_string());
            args.push(codec::scale_filter());
        }
        args
    }

    fn decoding_step(
        &self,
        kind: StepKind,
        acceleration: AccelerationMode,
        source: &ArtifactRef,
        arguments: Vec<String>,
        output: ArtifactRef,
    ) -> EncodeStep {
        let accelerated = acceleration.is_enabled() && kind.decodes_video();
        let input_options = if accelerated {
            vec!["-hwaccel".to_string(), "auto".to_string()]
        } else {
            Vec::new()
        };

        EncodeStep {
            kind,
            input_options,
            inputs: vec![source.clone()],
            arguments,
            output,
            may_fail_gracefully: accelerated,
        }
    }
}

fn to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}
