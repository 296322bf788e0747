//! In-process encoder engine using libav bindings
//!
//! The engine's virtual filesystem is a private scratch directory that
//! nothing else in the process writes to. Entry names are flat: no
//! separators, no parent references.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use tempfile::TempDir;
use tracing::debug;

use crate::adapters::exec_sandbox::EngineInvocation;
use crate::ports::{EngineError, SandboxEngine};

mod pipeline;

/// libav-backed [`SandboxEngine`]
pub struct LibavEngine {
    scratch: TempDir,
}

impl LibavEngine {
    /// Initialize libav and create the virtual filesystem
    pub fn load() -> Result<Self, EngineError> {
        ffmpeg_next::init()
            .map_err(|e| EngineError::Unavailable(format!("FFmpeg initialization failed: {}", e)))?;
        ffmpeg_next::util::log::set_level(ffmpeg_next::util::log::Level::Error);

        let scratch = tempfile::Builder::new()
            .prefix("vidsqueeze-vfs-")
            .tempdir()
            .map_err(|e| EngineError::Unavailable(format!("Failed to create virtual filesystem: {}", e)))?;

        Ok(Self { scratch })
    }

    fn entry(&self, name: &str) -> Result<PathBuf, EngineError> {
        let flat = !name.is_empty()
            && !name.contains('/')
            && !name.contains('\\')
            && name != "."
            && name != "..";
        if !flat {
            return Err(EngineError::InvalidArguments(format!(
                "invalid virtual filesystem entry `{}`",
                name
            )));
        }
        Ok(self.scratch.path().join(name))
    }
}

impl SandboxEngine for LibavEngine {
    fn describe(&self) -> String {
        format!("libav in-process engine (scratch {})", self.scratch.path().display())
    }

    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        std::fs::write(self.entry(name)?, data)?;
        Ok(())
    }

    fn read_file(&mut self, name: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.entry(name)?;
        std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::NotFound(name.to_string()),
            _ => EngineError::Io(e),
        })
    }

    fn delete_file(&mut self, name: &str) -> Result<(), EngineError> {
        let path = self.entry(name)?;
        std::fs::remove_file(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::NotFound(name.to_string()),
            _ => EngineError::Io(e),
        })
    }

    fn exec(&mut self, args: &[String], cancel: &AtomicBool) -> Result<(), EngineError> {
        let invocation = EngineInvocation::parse(args)?;
        let inputs = invocation
            .inputs
            .iter()
            .map(|name| self.entry(name))
            .collect::<Result<Vec<_>, _>>()?;
        for (name, path) in invocation.inputs.iter().zip(&inputs) {
            if !path.is_file() {
                return Err(EngineError::NotFound(name.clone()));
            }
        }
        let output = self.entry(&invocation.output)?;

        debug!(
            inputs = inputs.len(),
            transcode = invocation.needs_transcode(),
            "Running libav invocation"
        );
        let result = if invocation.needs_transcode() {
            pipeline::transcode(&invocation, &inputs, &output, cancel)
        } else {
            pipeline::remux(&invocation, &inputs, &output, cancel)
        };

        if result.is_err() {
            let _ = std::fs::remove_file(&output);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_fs_rejects_paths() {
        let mut engine = LibavEngine::load().unwrap();
        assert!(engine.write_file("../escape", b"x").is_err());
        assert!(engine.write_file("a/b", b"x").is_err());

        engine.write_file("clip.bin", b"data").unwrap();
        assert_eq!(engine.read_file("clip.bin").unwrap(), b"data");
        engine.delete_file("clip.bin").unwrap();
        assert!(matches!(engine.read_file("clip.bin"), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn test_missing_input_is_not_found() {
        let mut engine = LibavEngine::load().unwrap();
        let args: Vec<String> = ["-i", "absent.bin", "-c", "copy", "-f", "mp4", "-y", "out.mp4"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let cancel = AtomicBool::new(false);
        assert!(matches!(engine.exec(&args, &cancel), Err(EngineError::NotFound(_))));
    }
}
