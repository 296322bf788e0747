// Domain rules - Validation of incoming compression submissions

use crate::domain::errors::*;
use crate::domain::model::*;

/// Field names accepted for the media payload
pub const MEDIA_FIELDS: [&str; 3] = ["video", "file", "media"];

const BITRATE_FIELDS: [&str; 2] = ["bitrate", "bitrateKbps"];
const FORMAT_FIELDS: [&str; 2] = ["format", "targetFormat"];
const MAINTAIN_RESOLUTION_FIELDS: [&str; 1] = ["maintainResolution"];
const REMOVE_AUDIO_FIELDS: [&str; 1] = ["removeAudio"];
const ACCELERATION_FIELDS: [&str; 2] = ["preferHardwareAcceleration", "useHardwareAcceleration"];

/// Longest extension kept from an upload's file name
const MAX_EXTENSION_LEN: usize = 5;

/// Normalizes raw submissions into a [`CompressionRequest`]
pub struct OptionValidator;

impl OptionValidator {
    /// Validate a submission. No side effects.
    pub fn validate(form: &FormFields) -> Result<CompressionRequest, CompressionError> {
        let media = match &form.media {
            Some(media) if !media.is_empty() => media.clone(),
            _ => return Err(CompressionError::MissingInput),
        };

        let bitrate_kbps = Self::parse_bitrate(form.get(&BITRATE_FIELDS))?;
        let target_format = match form.get(&FORMAT_FIELDS) {
            Some(value) => value.parse::<TargetFormat>()?,
            None => TargetFormat::Mp4,
        };

        Ok(CompressionRequest {
            media,
            bitrate_kbps,
            target_format,
            maintain_resolution: Self::parse_flag(form.get(&MAINTAIN_RESOLUTION_FIELDS)),
            remove_audio: Self::parse_flag(form.get(&REMOVE_AUDIO_FIELDS)),
            prefer_hardware_acceleration: Self::parse_flag(form.get(&ACCELERATION_FIELDS)),
            source_extension: Self::source_extension(form.file_name.as_deref()),
        })
    }

    /// Lenient integer parse of the leading digits.
    ///
    /// Missing, non-numeric and zero values fall back to the default bitrate;
    /// negative values are rejected.
    pub fn parse_bitrate(value: Option<&str>) -> Result<u32, CompressionError> {
        let Some(raw) = value.map(str::trim) else {
            return Ok(DEFAULT_BITRATE_KBPS);
        };

        let (negative, unsigned) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.strip_prefix('+').unwrap_or(raw)),
        };
        let digits: String = unsigned.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Ok(DEFAULT_BITRATE_KBPS);
        }

        let parsed = digits.parse::<u64>().unwrap_or(u64::MAX);
        if parsed == 0 {
            return Ok(DEFAULT_BITRATE_KBPS);
        }
        if negative {
            return Err(CompressionError::invalid_option(
                "bitrate",
                format!("must be a positive number of kbps, got `{}`", raw),
            ));
        }

        u32::try_from(parsed).map_err(|_| {
            CompressionError::invalid_option("bitrate", format!("`{}` is out of range", raw))
        })
    }

    /// Boolean form value; anything unrecognised is false
    pub fn parse_flag(value: Option<&str>) -> bool {
        value
            .map(|v| {
                matches!(
                    v.trim().to_ascii_lowercase().as_str(),
                    "true" | "1" | "on" | "yes"
                )
            })
            .unwrap_or(false)
    }

    /// Sanitized extension of the uploaded file name
    pub fn source_extension(file_name: Option<&str>) -> String {
        file_name
            .and_then(|name| std::path::Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| {
                !ext.is_empty()
                    && ext.len() <= MAX_EXTENSION_LEN
                    && ext.chars().all(|c| c.is_ascii_alphanumeric())
            })
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_SOURCE_EXTENSION.to_string())
    }
}

#[cfg(test)]
mod tests;
