//! Sandboxed execution strategy
//!
//! Runs plans through an in-process engine that only sees its own virtual
//! filesystem. The engine is expensive to load, so a single process-wide
//! [`EngineHandle`] loads it lazily, at most once, and hands out serialized
//! access: one plan at a time holds the engine for all of its steps.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, OnceCell, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::artifacts::{ArtifactError, ArtifactLedger, ArtifactScope, ArtifactToken};
use crate::domain::errors::*;
use crate::domain::model::*;
use crate::planner::CommandPlan;
use crate::ports::*;

pub mod invocation;

pub use invocation::EngineInvocation;

type SharedEngine = Arc<Mutex<Box<dyn SandboxEngine>>>;

/// Loads an engine instance; runs on a blocking thread
pub type EngineLoader = Arc<dyn Fn() -> Result<Box<dyn SandboxEngine>, EngineError> + Send + Sync>;

/// Lazily loaded, serialized engine access
pub struct EngineHandle {
    engine: OnceCell<SharedEngine>,
    loader: EngineLoader,
    load_attempts: AtomicUsize,
}

static GLOBAL_HANDLE: OnceLock<Arc<EngineHandle>> = OnceLock::new();

impl EngineHandle {
    /// Create a handle that loads with `loader` on first use
    pub fn new(loader: EngineLoader) -> Self {
        Self {
            engine: OnceCell::new(),
            loader,
            load_attempts: AtomicUsize::new(0),
        }
    }

    /// The process-wide handle using [`default_engine_loader`]
    pub fn global() -> Arc<EngineHandle> {
        GLOBAL_HANDLE
            .get_or_init(|| Arc::new(EngineHandle::new(default_engine_loader())))
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.initialized()
    }

    /// How many times the loader has run
    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }

    /// Load if needed, then wait for exclusive access.
    ///
    /// A failed load is not cached; the next caller tries again.
    pub async fn acquire(&self) -> Result<OwnedMutexGuard<Box<dyn SandboxEngine>>, EngineError> {
        let shared = self
            .engine
            .get_or_try_init(|| async {
                self.load_attempts.fetch_add(1, Ordering::SeqCst);
                let loader = Arc::clone(&self.loader);
                let engine = tokio::task::spawn_blocking(move || loader())
                    .await
                    .map_err(|e| EngineError::Unavailable(format!("engine loader panicked: {}", e)))??;
                info!("Loaded sandboxed engine: {}", engine.describe());
                Ok::<_, EngineError>(Arc::new(Mutex::new(engine)))
            })
            .await?;

        Ok(Arc::clone(shared).lock_owned().await)
    }
}

/// Loader for the engine compiled into this build
pub fn default_engine_loader() -> EngineLoader {
    Arc::new(load_builtin_engine)
}

#[cfg(feature = "libav")]
fn load_builtin_engine() -> Result<Box<dyn SandboxEngine>, EngineError> {
    crate::adapters::exec_libav::LibavEngine::load()
        .map(|engine| Box::new(engine) as Box<dyn SandboxEngine>)
}

#[cfg(not(feature = "libav"))]
fn load_builtin_engine() -> Result<Box<dyn SandboxEngine>, EngineError> {
    Err(EngineError::Unavailable(
        "built without the `libav` feature".to_string(),
    ))
}

/// Engine virtual filesystem as an artifact store; holds the engine lock
pub struct VirtualStore {
    engine: OwnedMutexGuard<Box<dyn SandboxEngine>>,
}

impl VirtualStore {
    pub fn new(engine: OwnedMutexGuard<Box<dyn SandboxEngine>>) -> Self {
        Self { engine }
    }

    /// Run one invocation inside the engine
    pub fn exec(&mut self, argv: &[String], cancel: &AtomicBool) -> Result<(), EngineError> {
        self.engine.exec(argv, cancel)
    }
}

impl ArtifactStore for VirtualStore {
    fn write(&mut self, name: &str, data: &[u8]) -> Result<(), ArtifactError> {
        Ok(self.engine.write_file(name, data)?)
    }

    fn read(&mut self, name: &str) -> Result<Bytes, ArtifactError> {
        Ok(Bytes::from(self.engine.read_file(name)?))
    }

    fn remove(&mut self, name: &str) -> Result<(), ArtifactError> {
        match self.engine.delete_file(name) {
            Ok(()) | Err(EngineError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn locate(&self, name: &str) -> String {
        name.to_string()
    }
}

/// Sets the cancel flag when the owning future is dropped
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Strategy backed by the in-process engine
pub struct SandboxedStrategy {
    handle: Arc<EngineHandle>,
    ledger: ArtifactLedger,
}

impl SandboxedStrategy {
    /// Create new sandboxed strategy over a handle
    pub fn new(handle: Arc<EngineHandle>) -> Self {
        Self {
            handle,
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
}

fn sandbox_failure(cause: FailureCause, detail: impl Into<String>) -> CompressionError {
    CompressionError::execution_failed(StrategyKind::Sandboxed, cause, detail)
}

fn engine_failure(error: EngineError) -> CompressionError {
    match error {
        EngineError::Unavailable(detail) => sandbox_failure(FailureCause::EngineUnavailable, detail),
        other => sandbox_failure(FailureCause::Engine, other.to_string()),
    }
}

fn artifact_failure(error: ArtifactError) -> CompressionError {
    sandbox_failure(FailureCause::Artifact, error.to_string())
}

/// Blocking body of a sandboxed execution
fn run_plan(
    engine: OwnedMutexGuard<Box<dyn SandboxEngine>>,
    plan: &CommandPlan,
    media: &[u8],
    cancel: &AtomicBool,
    ledger: ArtifactLedger,
) -> Result<Bytes, CompressionError> {
    let output_ref = plan
        .output()
        .cloned()
        .ok_or_else(|| sandbox_failure(FailureCause::MissingOutput, "plan has no steps"))?;

    let mut scope = ArtifactScope::new(VirtualStore::new(engine), ArtifactToken::generate(), ledger);
    scope.stage(&plan.source, media).map_err(artifact_failure)?;

    for (index, step) in plan.steps.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            return Err(engine_failure(EngineError::Cancelled));
        }
        let argv = scope.bind_step(step).map_err(artifact_failure)?;
        EngineInvocation::parse(&argv).map_err(engine_failure)?;
        debug!(step = %step.kind, argv = ?argv, "Executing step in sandboxed engine");
        scope.store_mut().exec(&argv, cancel).map_err(engine_failure)?;
        scope.release_after(plan, index);
    }

    let output = scope
        .materialize_output(&output_ref)
        .map_err(|e| sandbox_failure(FailureCause::MissingOutput, e.to_string()))?;
    scope.release(&output_ref);

    if output.is_empty() {
        return Err(sandbox_failure(FailureCause::MissingOutput, "engine wrote an empty entry"));
    }
    Ok(output)
}

#[async_trait]
impl ExecutePort for SandboxedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sandboxed
    }

    fn supports_acceleration(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        plan: &CommandPlan,
        media: Bytes,
    ) -> Result<ExecutionOutcome, CompressionError> {
        if plan.is_accelerated() {
            warn!("Sandboxed engine ignores hardware acceleration");
        }

        let engine = self.handle.acquire().await.map_err(engine_failure)?;
        info!(steps = plan.steps.len(), "Running plan in sandboxed engine");

        let cancel = Arc::new(AtomicBool::new(false));
        let _cancel_guard = CancelOnDrop(Arc::clone(&cancel));
        let plan = plan.clone();
        let ledger = self.ledger.clone();

        let output = tokio::task::spawn_blocking(move || {
            run_plan(engine, &plan, &media, &cancel, ledger)
        })
        .await
        .map_err(|e| sandbox_failure(FailureCause::Engine, format!("engine task failed: {}", e)))??;

        Ok(ExecutionOutcome::new(output))
    }

    async fn probe_availability(&self) -> Availability {
        match self.handle.acquire().await {
            Ok(engine) => Availability::available(engine.describe()),
            Err(e) => Availability::unavailable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::CommandPlanner;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Copies the first input to the output
    #[derive(Default)]
    struct CopyEngine {
        files: HashMap<String, Vec<u8>>,
        delay: Option<Duration>,
    }

    impl SandboxEngine for CopyEngine {
        fn describe(&self) -> String {
            "copy engine".to_string()
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

        fn exec(&mut self, args: &[String], cancel: &AtomicBool) -> Result<(), EngineError> {
            if let Some(delay) = self.delay {
                let deadline = std::time::Instant::now() + delay;
                while std::time::Instant::now() < deadline {
                    if cancel.load(Ordering::SeqCst) {
                        return Err(EngineError::Cancelled);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
            let invocation = EngineInvocation::parse(args)?;
            let data = self.read_file(&invocation.inputs[0])?;
            self.write_file(&invocation.output, &data)
        }
    }

    fn handle_with(engine: fn() -> CopyEngine) -> Arc<EngineHandle> {
        Arc::new(EngineHandle::new(Arc::new(move || {
            Ok::<_, EngineError>(Box::new(engine()) as Box<dyn SandboxEngine>)
        })))
    }

    #[tokio::test]
    async fn test_runs_split_plan_and_cleans_virtual_fs() {
        let handle = handle_with(CopyEngine::default);
        let strategy = SandboxedStrategy::new(Arc::clone(&handle));
        let request = CompressionRequest::new(vec![9u8; 128], TargetFormat::Webm);
        let plan = CommandPlanner::new().plan(&request);
        assert_eq!(plan.steps.len(), 3);

        let outcome = strategy.execute(&plan, request.media.clone()).await.unwrap();
        assert_eq!(outcome.output_size_bytes, 128);
        assert_eq!(strategy.ledger().created(), 4);
        assert_eq!(strategy.ledger().outstanding(), 0);
        assert!(handle.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_engine_loaded_once_across_requests() {
        let handle = handle_with(CopyEngine::default);
        let strategy = Arc::new(SandboxedStrategy::new(Arc::clone(&handle)));
        let request = CompressionRequest::new(vec![1u8; 16], TargetFormat::Mp4);
        let plan = CommandPlanner::new().plan(&request);

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let strategy = Arc::clone(&strategy);
            let plan = plan.clone();
            let media = request.media.clone();
            tasks.push(tokio::spawn(async move { strategy.execute(&plan, media).await }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(handle.load_attempts(), 1);
        assert!(handle.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_load_reports_unavailable_and_retries() {
        let handle = Arc::new(EngineHandle::new(Arc::new(|| {
            Err::<Box<dyn SandboxEngine>, _>(EngineError::Unavailable("no engine".to_string()))
        })));
        let strategy = SandboxedStrategy::new(Arc::clone(&handle));
        let request = CompressionRequest::new(vec![1u8; 16], TargetFormat::Mp4);
        let plan = CommandPlanner::new().plan(&request);

        for _ in 0..2 {
            let err = strategy.execute(&plan, request.media.clone()).await.unwrap_err();
            assert!(matches!(
                err,
                CompressionError::ExecutionFailed { cause: FailureCause::EngineUnavailable, .. }
            ));
        }
        assert_eq!(handle.load_attempts(), 2);
        assert!(!strategy.probe_availability().await.available);
    }

    #[tokio::test]
    async fn test_dropped_execution_cancels_and_releases() {
        let handle = handle_with(|| CopyEngine {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let strategy = SandboxedStrategy::new(Arc::clone(&handle));
        let request = CompressionRequest::new(vec![1u8; 16], TargetFormat::Mp4);
        let plan = CommandPlanner::new().plan(&request);

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            strategy.execute(&plan, request.media.clone()),
        )
        .await;
        assert!(result.is_err());

        // The blocking task observes the flag, cleans up and frees the engine.
        let _engine = tokio::time::timeout(Duration::from_secs(2), handle.acquire())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(strategy.ledger().outstanding(), 0);
    }
}
