//! End-to-end fallback tests with a scripted encoder binary and an
//! in-memory engine standing in for the in-process encoder.

mod common;

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use vidsqueeze::adapters::{EngineHandle, LocalProcessStrategy, SandboxedStrategy};
use vidsqueeze::app::{CompressInteractor, FallbackController};
use vidsqueeze::artifacts::ArtifactLedger;
use vidsqueeze::domain::errors::CompressionError;
use vidsqueeze::domain::model::*;
use vidsqueeze::ports::{EngineError, ExecutePort, SandboxEngine};

/// Copies the first input entry to the output entry
#[derive(Default)]
struct MemoryEngine {
    files: HashMap<String, Vec<u8>>,
}

impl SandboxEngine for MemoryEngine {
    fn describe(&self) -> String {
        "memory engine".to_string()
    }

    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        self.files.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn read_file(&mut self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    fn delete_file(&mut self, name: &str) -> Result<(), EngineError> {
        self.files
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    fn exec(&mut self, args: &[String], _cancel: &AtomicBool) -> Result<(), EngineError> {
        let input = args
            .iter()
            .position(|a| a == "-i")
            .and_then(|i| args.get(i + 1))
            .ok_or_else(|| EngineError::InvalidArguments("no input".to_string()))?;
        let output = args.last().ok_or_else(|| EngineError::InvalidArguments("no output".to_string()))?;
        let data = self.read_file(input)?;
        self.files.insert(output.clone(), data);
        Ok(())
    }
}

fn memory_engine_handle() -> Arc<EngineHandle> {
    Arc::new(EngineHandle::new(Arc::new(|| {
        Ok::<_, EngineError>(Box::new(MemoryEngine::default()) as Box<dyn SandboxEngine>)
    })))
}

struct Harness {
    interactor: CompressInteractor,
    ledger: ArtifactLedger,
    root: tempfile::TempDir,
    _bin: tempfile::TempDir,
}

fn harness(ffmpeg: Option<std::path::PathBuf>, with_sandbox: bool) -> Harness {
    harness_with_timeout(ffmpeg, with_sandbox, None)
}

fn harness_with_timeout(
    ffmpeg: Option<std::path::PathBuf>,
    with_sandbox: bool,
    attempt_timeout: Option<Duration>,
) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let bin = tempfile::tempdir().unwrap();
    let ledger = ArtifactLedger::new();

    let ffmpeg = ffmpeg.unwrap_or_else(|| bin.path().join("missing-ffmpeg"));
    let mut strategies: Vec<Arc<dyn ExecutePort>> = vec![Arc::new(
        LocalProcessStrategy::new(ffmpeg, root.path()).with_ledger(ledger.clone()),
    )];
    if with_sandbox {
        strategies.push(Arc::new(
            SandboxedStrategy::new(memory_engine_handle()).with_ledger(ledger.clone()),
        ));
    }

    let mut controller = FallbackController::new(strategies);
    if let Some(limit) = attempt_timeout {
        controller = controller.with_attempt_timeout(limit);
    }
    let controller = Arc::new(controller);
    Harness {
        interactor: CompressInteractor::new(controller, None),
        ledger,
        root,
        _bin: bin,
    }
}

fn submission(format: &str, accelerate: bool) -> FormFields {
    FormFields::new()
        .with_media(vec![42u8; 4096])
        .with_file_name("clip.mov")
        .with_field("bitrate", "1500")
        .with_field("format", format)
        .with_field("maintainResolution", "true")
        .with_field("removeAudio", "false")
        .with_field("preferHardwareAcceleration", accelerate.to_string())
}

fn attempt_pairs(output: &CompressionOutput) -> Vec<(StrategyKind, AccelerationMode)> {
    output.attempts.iter().map(|a| (a.strategy, a.acceleration)).collect()
}

#[cfg(unix)]
#[tokio::test]
async fn test_local_success_reports_sizes() {
    let bin = tempfile::tempdir().unwrap();
    let h = harness(Some(common::fake_encoder(bin.path(), false)), true);

    let output = h.interactor.compress_form(&submission("mp4", false)).await.unwrap();
    assert_eq!(output.original_size_bytes, 4096);
    assert!(output.compressed_size_bytes > 0);
    assert_eq!(output.strategy, StrategyKind::Local);
    assert_eq!(output.resolution, "N/A");
    assert_eq!(output.duration_seconds, 0.0);

    assert_eq!(h.ledger.outstanding(), 0);
    assert_eq!(common::entry_count(h.root.path()), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_local_webm_split_releases_everything() {
    let bin = tempfile::tempdir().unwrap();
    let h = harness(Some(common::fake_encoder(bin.path(), false)), false);

    let output = h.interactor.compress_form(&submission("webm", false)).await.unwrap();
    assert_eq!(output.format, TargetFormat::Webm);
    // source, video track, audio track, output
    assert_eq!(h.ledger.created(), 4);
    assert_eq!(h.ledger.released(), 4);
    assert_eq!(common::entry_count(h.root.path()), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_acceleration_failure_retries_local_without_it() {
    let bin = tempfile::tempdir().unwrap();
    let h = harness(Some(common::fake_encoder(bin.path(), false)), true);

    let output = h.interactor.compress_form(&submission("mp4", true)).await.unwrap();
    assert_eq!(output.strategy, StrategyKind::Local);
    assert_eq!(
        attempt_pairs(&output),
        vec![
            (StrategyKind::Local, AccelerationMode::Enabled),
            (StrategyKind::Local, AccelerationMode::Disabled),
        ]
    );
}

#[tokio::test]
async fn test_invalid_format_rejected_before_execution() {
    let h = harness(None, true);

    let err = h
        .interactor
        .compress_form(&submission("invalidformat", false))
        .await
        .unwrap_err();
    assert!(matches!(err, CompressionError::InvalidOption { ref field, .. } if field == "format"));
    assert_eq!(err.http_status(), 400);
    assert_eq!(err.public_message(), "Invalid output format");
    assert_eq!(h.ledger.created(), 0);
}

#[tokio::test]
async fn test_missing_encoder_falls_back_to_sandbox() {
    let h = harness(None, true);

    let output = h.interactor.compress_form(&submission("mp4", false)).await.unwrap();
    assert_eq!(output.strategy, StrategyKind::Sandboxed);
    assert_eq!(
        attempt_pairs(&output),
        vec![
            (StrategyKind::Local, AccelerationMode::Disabled),
            (StrategyKind::Sandboxed, AccelerationMode::Disabled),
        ]
    );
    assert_eq!(output.compressed_size_bytes, 4096);
    assert_eq!(h.ledger.outstanding(), 0);
}

#[tokio::test]
async fn test_generic_failure_with_acceleration_skips_retry() {
    let h = harness(None, true);

    let output = h.interactor.compress_form(&submission("mp4", true)).await.unwrap();
    assert_eq!(
        attempt_pairs(&output),
        vec![
            (StrategyKind::Local, AccelerationMode::Enabled),
            (StrategyKind::Sandboxed, AccelerationMode::Disabled),
        ]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_broken_encoder_with_acceleration_takes_three_attempts() {
    let bin = tempfile::tempdir().unwrap();
    let h = harness(Some(common::fake_encoder(bin.path(), true)), true);

    let output = h.interactor.compress_form(&submission("webm", true)).await.unwrap();
    assert_eq!(output.strategy, StrategyKind::Sandboxed);
    assert_eq!(
        attempt_pairs(&output),
        vec![
            (StrategyKind::Local, AccelerationMode::Enabled),
            (StrategyKind::Local, AccelerationMode::Disabled),
            (StrategyKind::Sandboxed, AccelerationMode::Disabled),
        ]
    );
    assert_eq!(output.attempts[0].outcome, AttemptOutcome::AccelerationUnsupported);
    assert_eq!(h.ledger.outstanding(), 0);
    assert_eq!(common::entry_count(h.root.path()), 0);
}

#[tokio::test]
async fn test_exhaustion_surfaces_generic_message() {
    let h = harness(None, false);

    let err = h.interactor.compress_form(&submission("mov", false)).await.unwrap_err();
    assert!(matches!(err, CompressionError::ExhaustedAllStrategies { .. }));
    assert_eq!(err.http_status(), 500);
    assert!(err.public_message().starts_with("Failed to compress video."));
}

#[cfg(unix)]
#[tokio::test]
async fn test_timed_out_encoder_is_killed_and_falls_back() {
    let bin = tempfile::tempdir().unwrap();
    let marker = bin.path().join("still-running");
    let encoder = common::slow_encoder(bin.path(), &marker, 1);
    let h = harness_with_timeout(Some(encoder), true, Some(Duration::from_millis(300)));

    let output = h.interactor.compress_form(&submission("mp4", false)).await.unwrap();
    assert_eq!(output.strategy, StrategyKind::Sandboxed);
    assert_eq!(output.attempts[0].strategy, StrategyKind::Local);
    assert_eq!(output.attempts[0].outcome, AttemptOutcome::TimedOut);
    assert_eq!(h.ledger.outstanding(), 0);
    assert_eq!(common::entry_count(h.root.path()), 0);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_timed_out_encoder_without_fallback_exhausts() {
    let bin = tempfile::tempdir().unwrap();
    let marker = bin.path().join("still-running");
    let encoder = common::slow_encoder(bin.path(), &marker, 1);
    let h = harness_with_timeout(Some(encoder), false, Some(Duration::from_millis(300)));

    let err = h.interactor.compress_form(&submission("webm", false)).await.unwrap_err();
    match &err {
        CompressionError::ExhaustedAllStrategies { attempts, last } => {
            assert_eq!(attempts.len(), 1);
            assert!(matches!(**last, CompressionError::Timeout { strategy: StrategyKind::Local, .. }));
            assert!(last.to_string().ends_with("timed out after 300ms"));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(h.ledger.created(), h.ledger.released());
    assert_eq!(h.ledger.outstanding(), 0);
    assert_eq!(common::entry_count(h.root.path()), 0);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists());
}
