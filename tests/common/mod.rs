#![allow(dead_code)]

use anyhow::Result;
use helpdesk_export::{Archiver, ArchiveStore, ExportSession, RawResponse, Transport, WriteMode};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Scripted stand-in for the remote API.
/// Each path owns a queue of responses served in order; an unscripted (or drained)
/// path answers 404. Every request is logged.
#[derive(Default)]
pub struct FakeApi {
    routes: RefCell<HashMap<String, VecDeque<RawResponse>>>,
    log: RefCell<Vec<String>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(self, path: &str, body: Value) -> Self {
        self.status(path, 200, &body.to_string())
    }

    pub fn status(mut self, path: &str, status: u16, body: &str) -> Self {
        self.routes
            .get_mut()
            .entry(path.to_string())
            .or_default()
            .push_back(RawResponse::new(status, body));
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.log.borrow().iter().filter(|p| p.as_str() == path).count()
    }
}

impl Transport for FakeApi {
    fn get(&self, path: &str) -> Result<RawResponse> {
        self.log.borrow_mut().push(path.to_string());
        let next = self.routes.borrow_mut().get_mut(path).and_then(|q| q.pop_front());
        Ok(next.unwrap_or_else(|| RawResponse::new(404, r#"{"error":"RecordNotFound"}"#)))
    }
}

/// "Packages" by copying the export tree into `snapshot` and writing a marker
/// file at the archive path, so tests can inspect what would have been tarred.
pub struct SnapshotArchiver {
    pub snapshot: PathBuf,
}

impl SnapshotArchiver {
    pub fn new(snapshot: &Path) -> Self {
        Self { snapshot: snapshot.to_path_buf() }
    }
}

impl Archiver for SnapshotArchiver {
    fn package(&self, dir: &Path, dest: &Path) -> Result<PathBuf> {
        for entry in WalkDir::new(dir).min_depth(1) {
            let entry = entry?;
            let rel = entry.path().strip_prefix(dir)?;
            let target = self.snapshot.join(rel);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                fs::create_dir_all(target.parent().unwrap())?;
                fs::copy(entry.path(), &target)?;
            }
        }
        fs::write(dest, b"snapshot")?;
        Ok(dest.to_path_buf())
    }
}

/// Archiver that always fails, for the "no archive left behind" path.
pub struct FailingArchiver;

impl Archiver for FailingArchiver {
    fn package(&self, _dir: &Path, dest: &Path) -> Result<PathBuf> {
        fs::write(dest, b"half an archive")?;
        anyhow::bail!("disk full")
    }
}

/// Fresh store for site `acme` inside a temp dir (returned to keep it alive).
pub fn new_store(mode: WriteMode) -> (tempfile::TempDir, ArchiveStore) {
    let tmp = tempfile::tempdir().unwrap();
    let session = ExportSession::create("acme", &tmp.path().join("work"), &tmp.path().join("out"), mode).unwrap();
    (tmp, ArchiveStore::new(session))
}

/// Sorted, `/`-separated relative paths of every file under `root`.
pub fn list_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .collect();
    files.sort();
    files
}

/// Parse a single-object entity file, checking it is newline-terminated.
pub fn read_entity(path: &Path) -> Value {
    let text = fs::read_to_string(path).unwrap();
    assert!(text.ends_with('\n'), "{} must end with a newline", path.display());
    assert_eq!(text.matches('\n').count(), 1, "{} must hold exactly one line", path.display());
    serde_json::from_str(&text).unwrap()
}
