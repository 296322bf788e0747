//! Codec and container profiles per target format

use crate::domain::model::TargetFormat;

/// Height every non-preserved resolution is scaled to
pub const TARGET_HEIGHT: u32 = 720;

/// Scale filter keeping aspect ratio with an even width
pub fn scale_filter() -> String {
    format!("scale=-2:{}", TARGET_HEIGHT)
}

/// Video encoder settings for a format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoProfile {
    pub encoder: &'static str,
    pub pixel_format: Option<&'static str>,
    /// Fixed rate-control options, appended after the stream options
    pub rate_control: &'static [&'static str],
}

/// Audio encoder settings for a format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioProfile {
    pub encoder: &'static str,
    pub bitrate: &'static str,
    pub channels: Option<u8>,
}

/// Muxer settings for a format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerProfile {
    pub muxer: &'static str,
    /// Move the index to the front for progressive playback
    pub faststart: bool,
}

const H264_RATE_CONTROL: &[&str] = &["-preset", "medium", "-crf", "23"];
const VP8_RATE_CONTROL: &[&str] = &["-deadline", "good", "-cpu-used", "4", "-crf", "30"];

/// Metadata, chapters, subtitles and data streams are always dropped
pub const STRIP_METADATA: &[&str] = &["-map_metadata", "-1", "-map_chapters", "-1", "-sn", "-dn"];

pub fn video_profile(format: TargetFormat) -> VideoProfile {
    match format {
        TargetFormat::Mp4 => VideoProfile {
            encoder: "libx264",
            pixel_format: None,
            rate_control: H264_RATE_CONTROL,
        },
        TargetFormat::Mov => VideoProfile {
            encoder: "libx264",
            pixel_format: Some("yuv420p"),
            rate_control: H264_RATE_CONTROL,
        },
        TargetFormat::Webm => VideoProfile {
            encoder: "libvpx",
            pixel_format: None,
            rate_control: VP8_RATE_CONTROL,
        },
    }
}

pub fn audio_profile(format: TargetFormat) -> AudioProfile {
    match format {
        TargetFormat::Mp4 | TargetFormat::Mov => AudioProfile {
            encoder: "aac",
            bitrate: "128k",
            channels: None,
        },
        TargetFormat::Webm => AudioProfile {
            encoder: "libopus",
            bitrate: "64k",
            channels: Some(1),
        },
    }
}

pub fn container_profile(format: TargetFormat) -> ContainerProfile {
    match format {
        TargetFormat::Mp4 | TargetFormat::Mov => ContainerProfile {
            muxer: format.muxer(),
            faststart: true,
        },
        TargetFormat::Webm => ContainerProfile {
            muxer: format.muxer(),
            faststart: false,
        },
    }
}

impl VideoProfile {
    /// `-c:v ... -b:v ...` for the given bitrate
    pub fn stream_args(&self, bitrate_kbps: u32) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.encoder.to_string()];
        if let Some(pix_fmt) = self.pixel_format {
            args.push("-pix_fmt".to_string());
            args.push(pix_fmt.to_string());
        }
        args.push("-b:v".to_string());
        args.push(format!("{}k", bitrate_kbps));
        args
    }
}

impl AudioProfile {
    pub fn stream_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:a".to_string(),
            self.encoder.to_string(),
            "-b:a".to_string(),
            self.bitrate.to_string(),
        ];
        if let Some(channels) = self.channels {
            args.push("-ac".to_string());
            args.push(channels.to_string());
        }
        args
    }
}

impl ContainerProfile {
    pub fn muxer_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.faststart {
            args.push("-movflags".to_string());
            args.push("+faststart".to_string());
        }
        args.push("-f".to_string());
        args.push(self.muxer.to_string());
        args
    }
}
