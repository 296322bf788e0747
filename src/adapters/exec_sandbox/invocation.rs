//! Typed view of an encoder argument vector
//!
//! The sandboxed engine understands the same grammar the planner emits for
//! the external binary. Parsing it up front turns an unsupported option into
//! a clear error instead of a half-written output.

use crate::ports::EngineError;

/// Stream type selected by a `-map` specifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Video,
    Audio,
}

/// One `-map input:type[:index][?]` specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMap {
    pub input: usize,
    pub stream_type: StreamType,
    pub index: usize,
    /// Trailing `?`: silently skip when absent
    pub optional: bool,
}

impl StreamMap {
    pub fn parse(spec: &str) -> Result<Self, EngineError> {
        let (body, optional) = match spec.strip_suffix('?') {
            Some(body) => (body, true),
            None => (spec, false),
        };
        let mut parts = body.split(':');
        let input = parts
            .next()
            .and_then(|p| p.parse::<usize>().ok())
            .ok_or_else(|| invalid(format!("bad map specifier `{}`", spec)))?;
        let stream_type = match parts.next() {
            Some("v") => StreamType::Video,
            Some("a") => StreamType::Audio,
            _ => return Err(invalid(format!("unsupported map specifier `{}`", spec))),
        };
        let index = match parts.next() {
            Some(i) => i
                .parse::<usize>()
                .map_err(|_| invalid(format!("bad stream index in `{}`", spec)))?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(invalid(format!("unsupported map specifier `{}`", spec)));
        }
        Ok(Self {
            input,
            stream_type,
            index,
            optional,
        })
    }
}

/// What to do with one stream type in the output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDirective<T> {
    /// Not mentioned; copy if mapped
    Unspecified,
    Disabled,
    Copy,
    Encode(T),
}

impl<T> StreamDirective<T> {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, StreamDirective::Disabled)
    }

    pub fn needs_transcode(&self) -> bool {
        matches!(self, StreamDirective::Encode(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSettings {
    pub encoder: String,
    pub bitrate_bps: Option<usize>,
    pub pixel_format: Option<String>,
    pub filter: Option<String>,
    /// Encoder private options (`preset`, `crf`, `deadline`, `cpu-used`)
    pub options: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSettings {
    pub encoder: String,
    pub bitrate_bps: Option<usize>,
    pub channels: Option<u16>,
}

/// Parsed encoder invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInvocation {
    pub inputs: Vec<String>,
    pub maps: Vec<StreamMap>,
    pub video: StreamDirective<VideoSettings>,
    pub audio: StreamDirective<AudioSettings>,
    pub format: Option<String>,
    pub movflags: Option<String>,
    pub output: String,
}

const IGNORED_FLAGS: [&str; 5] = ["-hide_banner", "-nostdin", "-y", "-sn", "-dn"];
const IGNORED_OPTIONS: [&str; 2] = ["-loglevel", "-hwaccel"];
const VIDEO_PRIVATE_OPTIONS: [&str; 4] = ["-preset", "-crf", "-deadline", "-cpu-used"];

impl EngineInvocation {
    /// Parse an argument vector (without the program name)
    pub fn parse(args: &[String]) -> Result<Self, EngineError> {
        let mut inputs = Vec::new();
        let mut maps = Vec::new();
        let mut video_codec: Option<String> = None;
        let mut audio_codec: Option<String> = None;
        let mut all_codec: Option<String> = None;
        let mut video_bitrate = None;
        let mut audio_bitrate = None;
        let mut pixel_format = None;
        let mut filter = None;
        let mut channels = None;
        let mut no_video = false;
        let mut no_audio = false;
        let mut private_options = Vec::new();
        let mut format = None;
        let mut movflags = None;
        let mut output = None;

        let mut iter = args.iter().peekable();
        while let Some(arg) = iter.next() {
            let arg = arg.as_str();
            if !arg.starts_with('-') || arg == "-" {
                if iter.peek().is_some() {
                    return Err(invalid(format!("unexpected positional argument `{}`", arg)));
                }
                output = Some(arg.to_string());
                continue;
            }
            if IGNORED_FLAGS.contains(&arg) {
                continue;
            }
            match arg {
                "-an" => no_audio = true,
                "-vn" => no_video = true,
                _ => {
                    let value = iter
                        .next()
                        .ok_or_else(|| invalid(format!("option `{}` needs a value", arg)))?
                        .to_string();
                    match arg {
                        _ if IGNORED_OPTIONS.contains(&arg) => {}
                        "-i" => inputs.push(value),
                        "-map" => maps.push(StreamMap::parse(&value)?),
                        "-map_metadata" | "-map_chapters" => {
                            if value != "-1" {
                                return Err(invalid(format!("`{} {}` is not supported", arg, value)));
                            }
                        }
                        "-c:v" => video_codec = Some(value),
                        "-c:a" => audio_codec = Some(value),
                        "-c" => all_codec = Some(value),
                        "-b:v" => video_bitrate = Some(parse_bitrate(&value)?),
                        "-b:a" => audio_bitrate = Some(parse_bitrate(&value)?),
                        "-pix_fmt" => pixel_format = Some(value),
                        "-vf" => filter = Some(value),
                        "-ac" => {
                            channels = Some(value.parse::<u16>().map_err(|_| {
                                invalid(format!("bad channel count `{}`", value))
                            })?)
                        }
                        "-movflags" => movflags = Some(value),
                        "-f" => format = Some(value),
                        _ if VIDEO_PRIVATE_OPTIONS.contains(&arg) => {
                            private_options.push((arg.trim_start_matches('-').to_string(), value))
                        }
                        _ => return Err(invalid(format!("unsupported option `{}`", arg))),
                    }
                }
            }
        }

        if inputs.is_empty() {
            return Err(invalid("no inputs".to_string()));
        }
        let output = output.ok_or_else(|| invalid("no output".to_string()))?;
        for map in &maps {
            if map.input >= inputs.len() {
                return Err(invalid(format!("map refers to missing input {}", map.input)));
            }
        }

        let video = if no_video {
            StreamDirective::Disabled
        } else {
            match video_codec.or_else(|| all_codec.clone()) {
                Some(codec) if codec == "copy" => StreamDirective::Copy,
                Some(encoder) => StreamDirective::Encode(VideoSettings {
                    encoder,
                    bitrate_bps: video_bitrate,
                    pixel_format,
                    filter,
                    options: private_options,
                }),
                None => StreamDirective::Unspecified,
            }
        };

        let audio = if no_audio {
            StreamDirective::Disabled
        } else {
            match audio_codec.or(all_codec) {
                Some(codec) if codec == "copy" => StreamDirective::Copy,
                Some(encoder) => StreamDirective::Encode(AudioSettings {
                    encoder,
                    bitrate_bps: audio_bitrate,
                    channels,
                }),
                None => StreamDirective::Unspecified,
            }
        };

        Ok(Self {
            inputs,
            maps,
            video,
            audio,
            format,
            movflags,
            output,
        })
    }

    /// Whether any stream is decoded and re-encoded
    pub fn needs_transcode(&self) -> bool {
        self.video.needs_transcode() || self.audio.needs_transcode()
    }
}

/// `900k`, `2M` or plain bits per second
pub fn parse_bitrate(value: &str) -> Result<usize, EngineError> {
    let trimmed = value.trim();
    let (number, multiplier) = match trimmed.chars().last() {
        Some('k') | Some('K') => (&trimmed[..trimmed.len() - 1], 1_000),
        Some('m') | Some('M') => (&trimmed[..trimmed.len() - 1], 1_000_000),
        _ => (trimmed, 1),
    };
    number
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .filter(|n| *n > 0)
        .ok_or_else(|| invalid(format!("bad bitrate `{}`", value)))
}

fn invalid(message: String) -> EngineError {
    EngineError::InvalidArguments(message)
}
