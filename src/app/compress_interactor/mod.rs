// Compress interactor - Orchestrates the compression use case

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::app::fallback_controller::FallbackController;
use crate::domain::errors::*;
use crate::domain::model::*;
use crate::domain::rules::*;
use crate::ports::*;

/// Interactor for the compression use case
pub struct CompressInteractor {
    controller: Arc<FallbackController>,
    probe_port: Option<Arc<dyn ProbePort>>,
}

impl CompressInteractor {
    /// Create new compress interactor with injected ports
    pub fn new(controller: Arc<FallbackController>, probe_port: Option<Arc<dyn ProbePort>>) -> Self {
        Self {
            controller,
            probe_port,
        }
    }

    /// Validate a raw submission and compress it
    pub async fn compress_form(&self, form: &FormFields) -> Result<CompressionOutput, CompressionError> {
        let request = OptionValidator::validate(form)?;
        self.compress(request).await
    }

    /// Compress an already validated request
    pub async fn compress(&self, mut request: CompressionRequest) -> Result<CompressionOutput, CompressionError> {
        info!("Input: {} bytes", request.original_size_bytes());
        info!(
            "Target: {} at {} kbps{}{}",
            request.target_format,
            request.bitrate_kbps,
            if request.maintain_resolution { "" } else { ", 720p" },
            if request.remove_audio { ", no audio" } else { "" }
        );

        let source = self.summarize(request.media.clone(), "source").await;
        // Audio-only encoder steps cannot succeed on a silent source.
        if !request.remove_audio && source.has_audio == Some(false) {
            debug!("Source has no audio stream; planning without audio");
            request.remove_audio = true;
        }

        let report = self.controller.run(&request).await?;
        let output = self.summarize(report.outcome.output.clone(), "output").await;

        let result = CompressionOutput {
            original_size_bytes: request.original_size_bytes(),
            compressed_size_bytes: report.outcome.output_size_bytes,
            media: report.outcome.output,
            duration_seconds: source.duration_or_zero(),
            resolution: output.resolution(),
            format: request.target_format,
            strategy: report.strategy,
            attempts: report.attempts,
        };

        info!(
            strategy = %result.strategy,
            attempts = result.attempts.len(),
            "Output: {} bytes ({:.1}% of input)",
            result.compressed_size_bytes,
            result.compression_ratio() * 100.0
        );
        Ok(result)
    }

    /// Best-effort probe; failures degrade to unknown values
    async fn summarize(&self, media: Bytes, label: &str) -> MediaSummary {
        let Some(probe) = &self.probe_port else {
            return MediaSummary::unknown();
        };
        match probe.probe(media).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Could not probe {} media: {}", label, e);
                MediaSummary::unknown()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::planner::CommandPlan;

    struct RecordingStrategy {
        plans: Mutex<Vec<CommandPlan>>,
    }

    #[async_trait]
    impl ExecutePort for RecordingStrategy {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Local
        }

        fn supports_acceleration(&self) -> bool {
            true
        }

        async fn execute(&self, plan: &CommandPlan, _media: Bytes) -> Result<ExecutionOutcome, CompressionError> {
            self.plans.lock().unwrap().push(plan.clone());
            Ok(ExecutionOutcome::new(Bytes::from_static(b"small")))
        }

        async fn probe_availability(&self) -> Availability {
            Availability::available("recording")
        }
    }

    struct FixedProbe {
        source: MediaSummary,
        output: MediaSummary,
    }

    #[async_trait]
    impl ProbePort for FixedProbe {
        async fn probe(&self, media: Bytes) -> Result<MediaSummary, ProbeError> {
            if &media[..] == b"small" {
                Ok(self.output.clone())
            } else {
                Ok(self.source.clone())
            }
        }

        async fn probe_availability(&self) -> Availability {
            Availability::available("fixed")
        }
    }

    struct BrokenProbe;

    #[async_trait]
    impl ProbePort for BrokenProbe {
        async fn probe(&self, _media: Bytes) -> Result<MediaSummary, ProbeError> {
            Err(ProbeError::ToolMissing("ffprobe".to_string()))
        }

        async fn probe_availability(&self) -> Availability {
            Availability::unavailable("missing")
        }
    }

    fn interactor(probe: Option<Arc<dyn ProbePort>>) -> (CompressInteractor, Arc<RecordingStrategy>) {
        let strategy = Arc::new(RecordingStrategy {
            plans: Mutex::new(Vec::new()),
        });
        let controller = Arc::new(FallbackController::new(vec![strategy.clone()]));
        (CompressInteractor::new(controller, probe), strategy)
    }

    fn form(format: &str) -> FormFields {
        FormFields::new()
            .with_media(vec![7u8; 1024])
            .with_field("format", format)
            .with_field("bitrate", "1500")
            .with_field("maintainResolution", "true")
    }

    #[tokio::test]
    async fn test_reports_sizes_and_metadata() {
        let probe = FixedProbe {
            source: MediaSummary {
                duration_seconds: Some(4.5),
                width: Some(1920),
                height: Some(1080),
                has_video: Some(true),
                has_audio: Some(true),
            },
            output: MediaSummary {
                width: Some(1280),
                height: Some(720),
                ..MediaSummary::default()
            },
        };
        let (interactor, _) = interactor(Some(Arc::new(probe)));

        let output = interactor.compress_form(&form("mp4")).await.unwrap();
        assert_eq!(output.original_size_bytes, 1024);
        assert_eq!(output.compressed_size_bytes, 5);
        assert_eq!(output.duration_seconds, 4.5);
        assert_eq!(output.resolution, "1280x720");
        assert_eq!(output.strategy, StrategyKind::Local);
    }

    #[tokio::test]
    async fn test_invalid_format_never_reaches_strategies() {
        let (interactor, strategy) = interactor(None);
        let err = interactor.compress_form(&form("invalidformat")).await.unwrap_err();
        assert!(matches!(err, CompressionError::InvalidOption { ref field, .. } if field == "format"));
        assert!(strategy.plans.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_silent_source_collapses_webm_plan() {
        let probe = FixedProbe {
            source: MediaSummary {
                has_video: Some(true),
                has_audio: Some(false),
                ..MediaSummary::default()
            },
            output: MediaSummary::unknown(),
        };
        let (interactor, strategy) = interactor(Some(Arc::new(probe)));

        interactor.compress_form(&form("webm")).await.unwrap();
        let plans = strategy.plans.lock().unwrap();
        assert_eq!(plans[0].steps.len(), 1);
    }

    #[tokio::test]
    async fn test_probe_failure_degrades_to_unknown() {
        let (interactor, strategy) = interactor(Some(Arc::new(BrokenProbe)));

        let output = interactor.compress_form(&form("webm")).await.unwrap();
        assert_eq!(output.duration_seconds, 0.0);
        assert_eq!(output.resolution, "N/A");
        assert_eq!(strategy.plans.lock().unwrap()[0].steps.len(), 3);
    }
}
