// Fallback controller - Ordered strategy attempts with acceleration retry

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::planner::CommandPlanner;
use crate::ports::*;

/// Wall-clock ceiling for a single attempt unless configured otherwise
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Successful execution plus the attempts that led to it
#[derive(Debug, Clone)]
pub struct FallbackReport {
    pub outcome: ExecutionOutcome,
    pub strategy: StrategyKind,
    pub acceleration: AccelerationMode,
    pub attempts: Vec<StrategyAttempt>,
}

/// Runs a request through an ordered list of execution strategies
pub struct FallbackController {
    strategies: Vec<Arc<dyn ExecutePort>>,
    planner: CommandPlanner,
    attempt_timeout: Duration,
}

impl FallbackController {
    /// Create new controller; strategies are tried in the given order
    pub fn new(strategies: Vec<Arc<dyn ExecutePort>>) -> Self {
        Self {
            strategies,
            planner: CommandPlanner::new(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    pub fn strategies(&self) -> &[Arc<dyn ExecutePort>] {
        &self.strategies
    }

    /// Try strategies until one succeeds.
    ///
    /// Only `ExhaustedAllStrategies` is returned as an error; individual
    /// attempt failures are recorded in its attempt log.
    pub async fn run(&self, request: &CompressionRequest) -> Result<FallbackReport, CompressionError> {
        let mut attempts: Vec<StrategyAttempt> = Vec::new();
        let mut last: Option<CompressionError> = None;

        for strategy in &self.strategies {
            let kind = strategy.kind();
            let mut acceleration = if request.acceleration().is_enabled() && strategy.supports_acceleration() {
                AccelerationMode::Enabled
            } else {
                AccelerationMode::Disabled
            };

            loop {
                if attempts.iter().any(|a| a.is_pair(kind, acceleration)) {
                    break;
                }

                let plan = self.planner.plan_with_acceleration(request, acceleration);
                let mut attempt = StrategyAttempt::new(kind, acceleration);
                info!(
                    strategy = %kind,
                    acceleration = %acceleration,
                    steps = plan.steps.len(),
                    "Starting attempt {}",
                    attempts.len() + 1
                );

                let started = Instant::now();
                let result = match tokio::time::timeout(
                    self.attempt_timeout,
                    strategy.execute(&plan, request.media.clone()),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(CompressionError::Timeout {
                        strategy: kind,
                        limit: self.attempt_timeout,
                    }),
                };
                attempt.elapsed_ms = started.elapsed().as_millis() as u64;

                match result {
                    Ok(outcome) => {
                        attempt.outcome = AttemptOutcome::Succeeded;
                        attempts.push(attempt);
                        info!(
                            strategy = %kind,
                            acceleration = %acceleration,
                            output_bytes = outcome.output_size_bytes,
                            "Attempt succeeded"
                        );
                        return Ok(FallbackReport {
                            outcome,
                            strategy: kind,
                            acceleration,
                            attempts,
                        });
                    }
                    Err(err @ CompressionError::AccelerationUnsupported { .. })
                        if acceleration.is_enabled() =>
                    {
                        warn!(strategy = %kind, "Retrying without hardware acceleration: {}", err);
                        attempt.outcome = AttemptOutcome::AccelerationUnsupported;
                        attempts.push(attempt);
                        last = Some(err);
                        acceleration = AccelerationMode::Disabled;
                    }
                    Err(err) => {
                        warn!(strategy = %kind, acceleration = %acceleration, "Attempt failed: {}", err);
                        attempt.outcome = match err {
                            CompressionError::Timeout { .. } => AttemptOutcome::TimedOut,
                            _ => AttemptOutcome::Failed,
                        };
                        attempts.push(attempt);
                        last = Some(err);
                        break;
                    }
                }
            }
        }

        let last = last.unwrap_or_else(|| {
            CompressionError::execution_failed(
                StrategyKind::Local,
                FailureCause::EngineUnavailable,
                "no execution strategies configured",
            )
        });
        Err(CompressionError::ExhaustedAllStrategies {
            attempts,
            last: Box::new(last),
        })
    }
}
