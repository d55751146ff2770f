//! Final packaging of the export directory into a single archive file.

use crate::error::ExportError;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Packages a finished export directory into `dest`.
pub trait Archiver {
    fn package(&self, dir: &Path, dest: &Path) -> Result<PathBuf>;
}

/// `tar czf <dest> -C <dir> .` via the system `tar`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TarArchiver;

impl Archiver for TarArchiver {
    fn package(&self, dir: &Path, dest: &Path) -> Result<PathBuf> {
        let fail = |reason: String| ExportError::PackagingFailed {
            archive: dest.display().to_string(),
            reason,
        };
        let out = Command::new("tar")
            .arg("czf")
            .arg(dest)
            .arg("-C")
            .arg(dir)
            .arg(".")
            .output()
            .map_err(|e| fail(format!("cannot run tar: {e}")))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            return Err(fail(format!("tar exited with {}: {stderr}", out.status)).into());
        }
        let path = dest
            .canonicalize()
            .with_context(|| format!("archive {} missing after packaging", dest.display()))?;
        tracing::info!("packaged {} -> {}", dir.display(), path.display());
        Ok(path)
    }
}
