// Domain errors - Failure taxonomy for a compression request

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::domain::model::{StrategyAttempt, StrategyKind};

/// Public message for any failure that is not a client error
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Failed to compress video. Please try again with a smaller file or different settings.";

/// Why an execution strategy could not produce output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The encoder binary could not be found or spawned
    EncoderMissing,
    /// The encoder ran and exited unsuccessfully
    EncoderExit { code: Option<i32> },
    /// The encoder reported success but produced no readable output
    MissingOutput,
    /// The in-process engine could not be loaded
    EngineUnavailable,
    /// The in-process engine rejected or failed the invocation
    Engine,
    /// Staging or reading an artifact failed
    Artifact,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::EncoderMissing => write!(f, "encoder binary not available"),
            FailureCause::EncoderExit { code: Some(code) } => {
                write!(f, "encoder exited with status {}", code)
            }
            FailureCause::EncoderExit { code: None } => {
                write!(f, "encoder terminated by signal")
            }
            FailureCause::MissingOutput => write!(f, "encoder produced no output"),
            FailureCause::EngineUnavailable => write!(f, "sandboxed engine unavailable"),
            FailureCause::Engine => write!(f, "sandboxed engine error"),
            FailureCause::Artifact => write!(f, "artifact storage error"),
        }
    }
}

/// Errors produced while validating, planning or executing a compression
#[derive(Error, Debug)]
pub enum CompressionError {
    /// A request option failed validation; never retried
    #[error("Invalid option `{field}`: {reason}")]
    InvalidOption { field: String, reason: String },

    /// No media payload was supplied
    #[error("No video file provided")]
    MissingInput,

    /// An accelerated step failed; retried once without acceleration
    #[error("Hardware acceleration unavailable on {strategy}: {detail}")]
    AccelerationUnsupported { strategy: StrategyKind, detail: String },

    /// A strategy failed to run the plan
    #[error("{strategy} execution failed ({cause}): {detail}")]
    ExecutionFailed {
        strategy: StrategyKind,
        cause: FailureCause,
        detail: String,
    },

    /// An attempt exceeded the wall-clock limit
    #[error("{strategy} attempt timed out after {limit:?}")]
    Timeout { strategy: StrategyKind, limit: Duration },

    /// Every strategy failed; keeps the last concrete error
    #[error("All execution strategies failed after {} attempt(s); last error: {last}", attempts.len())]
    ExhaustedAllStrategies {
        attempts: Vec<StrategyAttempt>,
        last: Box<CompressionError>,
    },
}

/// Metadata probe failures; callers degrade to unknown values
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Probe tool not available: {0}")]
    ToolMissing(String),

    #[error("Probe failed: {0}")]
    Failed(String),

    #[error("Failed to parse probe output: {0}")]
    Parse(String),

    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),
}

impl CompressionError {
    /// Create an invalid option error
    pub fn invalid_option(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an execution failure
    pub fn execution_failed(
        strategy: StrategyKind,
        cause: FailureCause,
        detail: impl Into<String>,
    ) -> Self {
        Self::ExecutionFailed {
            strategy,
            cause,
            detail: detail.into(),
        }
    }

    /// Whether the request itself was at fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CompressionError::InvalidOption { .. } | CompressionError::MissingInput
        )
    }

    /// HTTP status code for this error
    pub fn http_status(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }

    /// Message safe to show to the submitter
    pub fn public_message(&self) -> String {
        match self {
            CompressionError::MissingInput => "No video file provided".to_string(),
            CompressionError::InvalidOption { field, .. } if field == "format" => {
                "Invalid output format".to_string()
            }
            CompressionError::InvalidOption { .. } => self.to_string(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}
