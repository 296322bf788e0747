//! Ephemeral artifact lifecycle
//!
//! Every file an execution creates (staged source, intermediates, final
//! output) lives in an [`ArtifactScope`]. The scope names artifacts with a
//! request-unique [`ArtifactToken`], releases intermediates as soon as the
//! plan no longer needs them and deletes whatever is left when it is dropped,
//! whether the execution succeeded, failed, timed out or was cancelled.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::planner::{ArtifactRef, CommandPlan, EncodeStep};
use crate::ports::{ArtifactStore, EngineError};

/// Prefix of every per-execution directory under the artifact root
pub const ARTIFACT_PREFIX: &str = "vidsqueeze-";

/// Artifact storage errors
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to {action} artifact {name}: {source}")]
    Io {
        action: &'static str,
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Artifact {0} was never staged")]
    NotStaged(String),

    #[error("Virtual filesystem error: {0}")]
    Engine(#[from] EngineError),
}

/// Request-unique name component: millisecond timestamp plus random suffix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactToken(String);

impl ArtifactToken {
    /// Generate a fresh token
    pub fn generate() -> Self {
        let random = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}-{}",
            Utc::now().format("%Y%m%d%H%M%S%3f"),
            &random[..12]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
struct LedgerCounts {
    created: AtomicUsize,
    released: AtomicUsize,
}

/// Shared counters of created vs. released artifacts
#[derive(Debug, Clone, Default)]
pub struct ArtifactLedger {
    counts: Arc<LedgerCounts>,
}

impl ArtifactLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.counts.created.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counts.released.load(Ordering::SeqCst)
    }

    /// Artifacts created but not yet released
    pub fn outstanding(&self) -> usize {
        self.created().saturating_sub(self.released())
    }

    fn record_created(&self) {
        self.counts.created.fetch_add(1, Ordering::SeqCst);
    }

    fn record_released(&self) {
        self.counts.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// A live artifact owned by a scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub reference: ArtifactRef,
    pub name: String,
    pub location: String,
}

/// Owns every artifact of one execution
pub struct ArtifactScope<S: ArtifactStore> {
    store: S,
    token: ArtifactToken,
    live: Vec<Artifact>,
    ledger: ArtifactLedger,
}

impl<S: ArtifactStore> ArtifactScope<S> {
    /// Create a new scope over a store
    pub fn new(store: S, token: ArtifactToken, ledger: ArtifactLedger) -> Self {
        Self {
            store,
            token,
            live: Vec::new(),
            ledger,
        }
    }

    pub fn token(&self) -> &ArtifactToken {
        &self.token
    }

    /// Direct access to the backing store
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Write bytes as the given artifact
    pub fn stage(&mut self, reference: &ArtifactRef, data: &[u8]) -> Result<Artifact, ArtifactError> {
        let artifact = self.register(reference);
        self.store.write(&artifact.name, data)?;
        debug!(artifact = %artifact.name, bytes = data.len(), "Staged artifact");
        Ok(artifact)
    }

    /// Register an artifact an encoder is about to write
    pub fn reserve(&mut self, reference: &ArtifactRef) -> Artifact {
        self.register(reference)
    }

    /// Live artifact for a reference
    pub fn locate(&self, reference: &ArtifactRef) -> Option<&Artifact> {
        self.live.iter().find(|a| &a.reference == reference)
    }

    /// Reserve the step's output and render its argument vector
    pub fn bind_step(&mut self, step: &EncodeStep) -> Result<Vec<String>, ArtifactError> {
        let inputs = step
            .inputs
            .iter()
            .map(|input| {
                self.locate(input)
                    .map(|a| a.location.clone())
                    .ok_or_else(|| ArtifactError::NotStaged(input.file_name(self.token.as_str())))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let output = self.reserve(&step.output);
        Ok(step.render(&inputs, &output.location))
    }

    /// Read an artifact's bytes back
    pub fn materialize_output(&mut self, reference: &ArtifactRef) -> Result<Bytes, ArtifactError> {
        let name = self
            .locate(reference)
            .map(|a| a.name.clone())
            .ok_or_else(|| ArtifactError::NotStaged(reference.file_name(self.token.as_str())))?;
        self.store.read(&name)
    }

    /// Delete an artifact; failures are logged, never returned
    pub fn release(&mut self, reference: &ArtifactRef) {
        let Some(index) = self.live.iter().position(|a| &a.reference == reference) else {
            return;
        };
        let artifact = self.live.swap_remove(index);
        if let Err(e) = self.store.remove(&artifact.name) {
            warn!(artifact = %artifact.name, "Failed to delete artifact: {}", e);
        }
        self.ledger.record_released();
        debug!(artifact = %artifact.name, "Released artifact");
    }

    /// Release the inputs of step `index` that later steps do not read
    pub fn release_after(&mut self, plan: &CommandPlan, index: usize) {
        for reference in plan.releasable_after(index) {
            self.release(&reference);
        }
    }

    /// Release everything still live
    pub fn release_all(&mut self) {
        let remaining: Vec<ArtifactRef> = self.live.iter().map(|a| a.reference.clone()).collect();
        for reference in remaining {
            self.release(&reference);
        }
    }

    /// Number of artifacts not yet released
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    fn register(&mut self, reference: &ArtifactRef) -> Artifact {
        if let Some(existing) = self.locate(reference) {
            return existing.clone();
        }
        let name = reference.file_name(self.token.as_str());
        let artifact = Artifact {
            reference: reference.clone(),
            location: self.store.locate(&name),
            name,
        };
        self.live.push(artifact.clone());
        self.ledger.record_created();
        artifact
    }
}

impl<S: ArtifactStore> Drop for ArtifactScope<S> {
    fn drop(&mut self) {
        if !self.live.is_empty() {
            debug!(token = %self.token, count = self.live.len(), "Releasing remaining artifacts");
            self.release_all();
        }
    }
}

/// Artifacts as files in a private temporary directory
pub struct DiskStore {
    dir: TempDir,
}

impl DiskStore {
    /// Create a private directory under `root`
    pub fn new_in(root: &Path) -> Result<Self, ArtifactError> {
        std::fs::create_dir_all(root).map_err(|source| ArtifactError::Io {
            action: "create root for",
            name: root.display().to_string(),
            source,
        })?;
        let dir = tempfile::Builder::new()
            .prefix(ARTIFACT_PREFIX)
            .tempdir_in(root)
            .map_err(|source| ArtifactError::Io {
                action: "create directory for",
                name: root.display().to_string(),
                source,
            })?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn entry(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

impl ArtifactStore for DiskStore {
    fn write(&mut self, name: &str, data: &[u8]) -> Result<(), ArtifactError> {
        std::fs::write(self.entry(name), data).map_err(|source| ArtifactError::Io {
            action: "write",
            name: name.to_string(),
            source,
        })
    }

    fn read(&mut self, name: &str) -> Result<Bytes, ArtifactError> {
        std::fs::read(self.entry(name))
            .map(Bytes::from)
            .map_err(|source| ArtifactError::Io {
                action: "read",
                name: name.to_string(),
                source,
            })
    }

    fn remove(&mut self, name: &str) -> Result<(), ArtifactError> {
        match std::fs::remove_file(self.entry(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ArtifactError::Io {
                action: "delete",
                name: name.to_string(),
                source,
            }),
        }
    }

    fn locate(&self, name: &str) -> String {
        self.entry(name).to_string_lossy().into_owned()
    }
}

/// Remove per-execution directories older than `max_age` left by a crashed process
pub fn sweep_stale(root: &Path, max_age: Duration) -> usize {
    if !root.is_dir() {
        return 0;
    }

    let mut removed = 0;
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
    {
        let is_ours = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with(ARTIFACT_PREFIX))
            .unwrap_or(false);
        if !is_ours {
            continue;
        }

        let age = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|modified| modified.elapsed().ok());
        if !matches!(age, Some(age) if age >= max_age) {
            continue;
        }

        let result = if entry.file_type().is_dir() {
            std::fs::remove_dir_all(entry.path())
        } else {
            std::fs::remove_file(entry.path())
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove stale artifact {}: {}", entry.path().display(), e),
        }
    }

    if removed > 0 {
        info!("Removed {} stale artifact director(ies) from {}", removed, root.display());
    }
    removed
}
