// Unit tests for submission validation

#[cfg(test)]
mod tests {
    use crate::domain::errors::*;
    use crate::domain::model::*;
    use crate::domain::rules::*;

    fn submission() -> FormFields {
        FormFields::new().with_media(vec![0u8; 64])
    }

    #[test]
    fn test_defaults_when_fields_absent() {
        let request = OptionValidator::validate(&submission()).unwrap();
        assert_eq!(request.bitrate_kbps, 1500);
        assert_eq!(request.target_format, TargetFormat::Mp4);
        assert!(!request.maintain_resolution);
        assert!(!request.remove_audio);
        assert!(!request.prefer_hardware_acceleration);
        assert_eq!(request.source_extension, "bin");
    }

    #[test]
    fn test_missing_or_empty_payload() {
        let err = OptionValidator::validate(&FormFields::new()).unwrap_err();
        assert!(matches!(err, CompressionError::MissingInput));

        let empty = FormFields::new().with_media(Vec::<u8>::new());
        let err = OptionValidator::validate(&empty).unwrap_err();
        assert!(matches!(err, CompressionError::MissingInput));
    }

    #[test]
    fn test_missing_payload_checked_before_format() {
        let form = FormFields::new().with_field("format", "invalidformat");
        let err = OptionValidator::validate(&form).unwrap_err();
        assert!(matches!(err, CompressionError::MissingInput));
    }

    #[test]
    fn test_invalid_format_rejected() {
        let form = submission().with_field("format", "invalidformat");
        let err = OptionValidator::validate(&form).unwrap_err();
        match err {
            CompressionError::InvalidOption { field, .. } => assert_eq!(field, "format"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_bitrate_parsing() {
        assert_eq!(OptionValidator::parse_bitrate(None).unwrap(), 1500);
        assert_eq!(OptionValidator::parse_bitrate(Some("800")).unwrap(), 800);
        assert_eq!(OptionValidator::parse_bitrate(Some(" 2500k ")).unwrap(), 2500);
        assert_eq!(OptionValidator::parse_bitrate(Some("fast")).unwrap(), 1500);
        assert_eq!(OptionValidator::parse_bitrate(Some("0")).unwrap(), 1500);
        assert!(OptionValidator::parse_bitrate(Some("-300")).is_err());
        assert!(OptionValidator::parse_bitrate(Some("99999999999")).is_err());
    }

    #[test]
    fn test_flag_parsing() {
        assert!(OptionValidator::parse_flag(Some("true")));
        assert!(OptionValidator::parse_flag(Some("TRUE")));
        assert!(OptionValidator::parse_flag(Some("on")));
        assert!(OptionValidator::parse_flag(Some("1")));
        assert!(!OptionValidator::parse_flag(Some("false")));
        assert!(!OptionValidator::parse_flag(Some("maybe")));
        assert!(!OptionValidator::parse_flag(None));
    }

    #[test]
    fn test_full_submission() {
        let form = submission()
            .with_field("bitrate", "900")
            .with_field("format", "webm")
            .with_field("maintainResolution", "true")
            .with_field("removeAudio", "false")
            .with_field("useHardwareAcceleration", "true")
            .with_file_name("holiday.MP4");

        let request = OptionValidator::validate(&form).unwrap();
        assert_eq!(request.bitrate_kbps, 900);
        assert_eq!(request.target_format, TargetFormat::Webm);
        assert!(request.maintain_resolution);
        assert!(!request.remove_audio);
        assert!(request.prefer_hardware_acceleration);
        assert_eq!(request.source_extension, "mp4");
    }

    #[test]
    fn test_source_extension_sanitized() {
        assert_eq!(OptionValidator::source_extension(Some("clip.mkv")), "mkv");
        assert_eq!(OptionValidator::source_extension(Some("clip")), "bin");
        assert_eq!(OptionValidator::source_extension(Some("a.verylongext")), "bin");
        assert_eq!(OptionValidator::source_extension(Some("x.m$v")), "bin");
        assert_eq!(OptionValidator::source_extension(None), "bin");
    }
}
