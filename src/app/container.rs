use std::sync::Arc;

use tracing::{debug, info};

use crate::adapters::probe_ffprobe::DEFAULT_PROBE_TIMEOUT;
use crate::adapters::{EngineHandle, FfprobeAdapter, LocalProcessStrategy, SandboxedStrategy};
use crate::app::compress_interactor::CompressInteractor;
use crate::app::fallback_controller::FallbackController;
use crate::artifacts::ArtifactLedger;
use crate::config::ServiceConfig;
use crate::ports::{Availability, ExecutePort, ProbePort};

pub trait AppContainer: Send + Sync {
    fn compress_interactor(&self) -> Arc<CompressInteractor>;
}

/// Availability of one backend, as reported by `check`
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub available: bool,
    pub detail: String,
}

impl BackendStatus {
    fn new(name: impl Into<String>, availability: Availability) -> Self {
        Self {
            name: name.into(),
            available: availability.available,
            detail: availability.detail,
        }
    }
}

pub struct DefaultAppContainer {
    compress_interactor: Arc<CompressInteractor>,
    strategies: Vec<Arc<dyn ExecutePort>>,
    probe_port: Option<Arc<dyn ProbePort>>,
    ledger: ArtifactLedger,
}

impl DefaultAppContainer {
    /// Wire the production adapters described by `config`
    pub fn new(config: &ServiceConfig) -> Self {
        Self::with_engine(config, EngineHandle::global())
    }

    /// Same as [`DefaultAppContainer::new`] with an explicit engine handle
    pub fn with_engine(config: &ServiceConfig, engine: Arc<EngineHandle>) -> Self {
        let ledger = ArtifactLedger::new();
        let root = &config.encoder.artifact_root;

        let mut strategies: Vec<Arc<dyn ExecutePort>> = vec![Arc::new(
            LocalProcessStrategy::new(&config.encoder.ffmpeg_path, root).with_ledger(ledger.clone()),
        )];
        if config.encoder.sandbox_enabled {
            strategies.push(Arc::new(SandboxedStrategy::new(engine).with_ledger(ledger.clone())));
        }

        let probe_port: Option<Arc<dyn ProbePort>> = if config.encoder.probe_enabled {
            Some(Arc::new(
                FfprobeAdapter::new(&config.encoder.ffprobe_path, root)
                    .with_timeout(config.attempt_timeout().min(DEFAULT_PROBE_TIMEOUT))
                    .with_ledger(ledger.clone()),
            ))
        } else {
            None
        };

        let controller = Arc::new(
            FallbackController::new(strategies.clone()).with_attempt_timeout(config.attempt_timeout()),
        );
        let compress_interactor = Arc::new(CompressInteractor::new(controller, probe_port.clone()));

        debug!(
            strategies = strategies.len(),
            probe = probe_port.is_some(),
            "Application container ready"
        );

        Self {
            compress_interactor,
            strategies,
            probe_port,
            ledger,
        }
    }

    /// Artifact counters shared by every adapter
    pub fn ledger(&self) -> &ArtifactLedger {
        &self.ledger
    }

    /// Ask every strategy and the probe whether they can run
    pub async fn check_backends(&self) -> Vec<BackendStatus> {
        let mut report = Vec::with_capacity(self.strategies.len() + 1);
        for strategy in &self.strategies {
            let status = BackendStatus::new(strategy.kind().to_string(), strategy.probe_availability().await);
            info!(backend = %status.name, available = status.available, "{}", status.detail);
            report.push(status);
        }
        if let Some(probe) = &self.probe_port {
            let status = BackendStatus::new("probe", probe.probe_availability().await);
            info!(backend = %status.name, available = status.available, "{}", status.detail);
            report.push(status);
        }
        report
    }
}

impl AppContainer for DefaultAppContainer {
    fn compress_interactor(&self) -> Arc<CompressInteractor> {
        Arc::clone(&self.compress_interactor)
    }
}
