//! The export-session context: which site, where entities go, and how.

use crate::keys::normalize;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// How accepted entities reach disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Serialize each entity as soon as it is accepted.
    #[default]
    WriteThrough,
    /// Hold everything in memory and serialize during `write_archive`.
    Buffered,
}

/// Owned by one `ArchiveStore` for the lifetime of a run.
#[derive(Clone, Debug)]
pub struct ExportSession {
    site: String,
    export_dir: PathBuf,
    archive_path: PathBuf,
    mode: WriteMode,
}

impl ExportSession {
    /// Create `<work_dir>/export_<site>/` (fresh; a leftover tree from an earlier
    /// run is removed) and plan `<out_dir>/export_<site>.tgz`.
    pub fn create(site: &str, work_dir: &Path, out_dir: &Path, mode: WriteMode) -> Result<Self> {
        let site = site.trim();
        if site.is_empty() {
            return Err(anyhow!("site name must not be empty"));
        }
        let stem = format!("export_{}", normalize(site));
        let export_dir = work_dir.join(&stem);
        if export_dir.exists() {
            tracing::warn!("removing stale export dir {}", export_dir.display());
            crate::util::remove_dir_with_backoff(&export_dir)?;
        }
        fs::create_dir_all(&export_dir)
            .with_context(|| format!("create export dir {}", export_dir.display()))?;
        fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;

        Ok(Self {
            site: site.to_string(),
            export_dir,
            archive_path: out_dir.join(format!("{stem}.tgz")),
            mode,
        })
    }

    pub fn site(&self) -> &str {
        &self.site
    }
    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }
    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }
    pub fn mode(&self) -> WriteMode {
        self.mode
    }
}
