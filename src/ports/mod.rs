// Ports - Interface definitions (contracts)

use std::sync::atomic::AtomicBool;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::artifacts::ArtifactError;
use crate::domain::errors::*;
use crate::domain::model::*;
use crate::planner::CommandPlan;

/// Result of an availability check for a backend or tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub available: bool,
    pub detail: String,
}

impl Availability {
    pub fn available(detail: impl Into<String>) -> Self {
        Self {
            available: true,
            detail: detail.into(),
        }
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            available: false,
            detail: detail.into(),
        }
    }
}

/// Port for running a command plan against a media payload
#[async_trait]
pub trait ExecutePort: Send + Sync {
    /// Backend identity
    fn kind(&self) -> StrategyKind;

    /// Whether plans with `-hwaccel` make sense on this backend
    fn supports_acceleration(&self) -> bool;

    /// Run every step of the plan and return the final artifact's bytes.
    ///
    /// Dropping the returned future must terminate in-flight work and
    /// release every artifact the execution created.
    async fn execute(
        &self,
        plan: &CommandPlan,
        media: Bytes,
    ) -> Result<ExecutionOutcome, CompressionError>;

    /// Check that the backend can run at all
    async fn probe_availability(&self) -> Availability;
}

/// Port for best-effort media metadata
#[async_trait]
pub trait ProbePort: Send + Sync {
    /// Summarize a media payload
    async fn probe(&self, media: Bytes) -> Result<MediaSummary, ProbeError>;

    /// Check that the probe tool can run
    async fn probe_availability(&self) -> Availability;
}

/// Named byte storage an [`ArtifactScope`](crate::artifacts::ArtifactScope) manages
pub trait ArtifactStore: Send {
    /// Create or replace an entry
    fn write(&mut self, name: &str, data: &[u8]) -> Result<(), ArtifactError>;

    /// Read an entry's full contents
    fn read(&mut self, name: &str) -> Result<Bytes, ArtifactError>;

    /// Delete an entry; deleting a missing entry is not an error
    fn remove(&mut self, name: &str) -> Result<(), ArtifactError>;

    /// Location string the encoder should use for an entry
    fn locate(&self, name: &str) -> String;
}

/// Errors reported by an in-process encoder engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("No such entry in virtual filesystem: {0}")]
    NotFound(String),

    #[error("Unsupported invocation: {0}")]
    InvalidArguments(String),

    #[error("Encoding failed: {0}")]
    Failed(String),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Virtual filesystem I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// In-process encoder with a private virtual filesystem.
///
/// Calls are blocking and must not be made from an async context directly.
pub trait SandboxEngine: Send {
    /// Engine description for logs
    fn describe(&self) -> String;

    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), EngineError>;

    fn read_file(&mut self, name: &str) -> Result<Vec<u8>, EngineError>;

    fn delete_file(&mut self, name: &str) -> Result<(), EngineError>;

    /// Run one encoder invocation; returns early with `Cancelled` once `cancel` is set
    fn exec(&mut self, args: &[String], cancel: &AtomicBool) -> Result<(), EngineError>;
}
