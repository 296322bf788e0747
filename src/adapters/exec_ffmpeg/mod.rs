//! Local-process execution strategy
//!
//! Runs each plan step through the external `ffmpeg` binary against real
//! files in a private directory under the artifact root.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::adapters::process::{ToolCommand, ToolError};
use crate::artifacts::{ArtifactError, ArtifactLedger, ArtifactScope, ArtifactToken, DiskStore};
use crate::domain::errors::*;
use crate::domain::model::*;
use crate::planner::{CommandPlan, EncodeStep};
use crate::ports::*;

/// Options every encoder invocation starts with
const GLOBAL_ARGS: [&str; 4] = ["-hide_banner", "-nostdin", "-loglevel", "error"];

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Strategy backed by a locally installed encoder binary
pub struct LocalProcessStrategy {
    ffmpeg_path: PathBuf,
    artifact_root: PathBuf,
    ledger: ArtifactLedger,
}

impl LocalProcessStrategy {
    /// Create new local strategy
    pub fn new(ffmpeg_path: impl Into<PathBuf>, artifact_root: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            artifact_root: artifact_root.into(),
            ledger: ArtifactLedger::new(),
        }
    }

    /// Share an artifact ledger with the caller
    pub fn with_ledger(mut self, ledger: ArtifactLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn ledger(&self) -> &ArtifactLedger {
        &self.ledger
    }

    async fn run_step(&self, step: &EncodeStep, argv: Vec<String>) -> Result<(), CompressionError> {
        debug!(step = %step.kind, argv = ?argv, "Spawning encoder");
        let started = Instant::now();

        let output = ToolCommand::new(&self.ffmpeg_path)
            .args(GLOBAL_ARGS)
            .args(argv)
            .output()
            .await
            .map_err(|e| match e {
                ToolError::NotFound { .. } | ToolError::Spawn { .. } => {
                    CompressionError::execution_failed(
                        StrategyKind::Local,
                        FailureCause::EncoderMissing,
                        e.to_string(),
                    )
                }
                other => CompressionError::execution_failed(
                    StrategyKind::Local,
                    FailureCause::EncoderExit { code: None },
                    other.to_string(),
                ),
            })?;

        if output.success() {
            debug!(
                step = %step.kind,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Encoder step finished"
            );
            return Ok(());
        }

        let detail = output.stderr_tail();
        if step.may_fail_gracefully {
            warn!(step = %step.kind, "Accelerated encoder step failed: {}", detail);
            return Err(CompressionError::AccelerationUnsupported {
                strategy: StrategyKind::Local,
                detail,
            });
        }

        Err(CompressionError::execution_failed(
            StrategyKind::Local,
            FailureCause::EncoderExit {
                code: output.status.code(),
            },
            detail,
        ))
    }
}

fn artifact_failure(error: ArtifactError) -> CompressionError {
    CompressionError::execution_failed(StrategyKind::Local, FailureCause::Artifact, error.to_string())
}

#[async_trait]
impl ExecutePort for LocalProcessStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Local
    }

    fn supports_acceleration(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        plan: &CommandPlan,
        media: Bytes,
    ) -> Result<ExecutionOutcome, CompressionError> {
        let output_ref = plan.output().cloned().ok_or_else(|| {
            CompressionError::execution_failed(
                StrategyKind::Local,
                FailureCause::MissingOutput,
                "plan has no steps",
            )
        })?;

        let store = DiskStore::new_in(&self.artifact_root).map_err(artifact_failure)?;
        let mut scope = ArtifactScope::new(store, ArtifactToken::generate(), self.ledger.clone());
        info!(
            token = %scope.token(),
            steps = plan.steps.len(),
            acceleration = %plan.acceleration,
            "Running plan with local encoder"
        );

        scope.stage(&plan.source, &media).map_err(artifact_failure)?;
        drop(media);

        for (index, step) in plan.steps.iter().enumerate() {
            let argv = scope.bind_step(step).map_err(artifact_failure)?;
            self.run_step(step, argv).await?;
            scope.release_after(plan, index);
        }

        let output = scope.materialize_output(&output_ref).map_err(|e| {
            CompressionError::execution_failed(
                StrategyKind::Local,
                FailureCause::MissingOutput,
                e.to_string(),
            )
        })?;
        scope.release(&output_ref);

        if output.is_empty() {
            return Err(CompressionError::execution_failed(
                StrategyKind::Local,
                FailureCause::MissingOutput,
                "encoder wrote an empty file",
            ));
        }

        Ok(ExecutionOutcome::new(output))
    }

    async fn probe_availability(&self) -> Availability {
        let result = ToolCommand::new(&self.ffmpeg_path)
            .arg("-version")
            .timeout(VERSION_CHECK_TIMEOUT)
            .output()
            .await;

        match result {
            Ok(output) if output.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                Availability::available(stdout.lines().next().unwrap_or("ffmpeg").trim().to_string())
            }
            Ok(output) => Availability::unavailable(format!(
                "{} -version exited with {}",
                self.ffmpeg_path.display(),
                output.status
            )),
            Err(e) => Availability::unavailable(e.to_string()),
        }
    }
}
