use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

static INIT_ONCE: std::sync::Once = std::sync::Once::new();

/// Install the fmt subscriber once per process; `RUST_LOG` wins, default `info`.
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

// -------- file ops with retry on transient errors --------

const TRIES: usize = 16;
const DELAY_MS: u64 = 50;

/// Transient errors seen on Windows when AV/backup filter drivers or sharing
/// violations hold a freshly written file.
#[cfg(windows)]
fn is_retriable_io_error(e: &io::Error) -> bool {
    // 5 access denied, 32 sharing violation, 33 lock violation, 225 AV blocked,
    // 1224 user-mapped section open, 21 device not ready
    matches!(e.raw_os_error(), Some(5 | 21 | 32 | 33 | 225 | 1224))
}

// The same numbers are EIO, EISDIR, EPIPE and EDOM elsewhere; nothing is retried.
#[cfg(not(windows))]
fn is_retriable_io_error(_e: &io::Error) -> bool {
    false
}

fn with_backoff<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut last_err = None;
    for i in 0..TRIES {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_retriable_io_error(&e) => {
                last_err = Some(e);
                sleep(Duration::from_millis(DELAY_MS.saturating_mul((i + 1) as u64)));
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "retries exhausted")))
}

pub fn create_with_backoff(path: &Path) -> io::Result<File> {
    with_backoff(|| File::create(path))
}

/// Succeeds if the file doesn't exist.
pub fn remove_with_backoff(path: &Path) -> Result<()> {
    match with_backoff(|| fs::remove_file(path)) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            Err(e).with_context(|| format!("remove {}", path.display()))
        }
        _ => Ok(()),
    }
}

/// Recursively remove a directory tree. Succeeds if it doesn't exist.
pub fn remove_dir_with_backoff(path: &Path) -> Result<()> {
    match with_backoff(|| fs::remove_dir_all(path)) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            Err(e).with_context(|| format!("remove dir {}", path.display()))
        }
        _ => Ok(()),
    }
}

/// Replace `dest` with `tmp`. Falls back to copy+remove when rename is refused.
pub fn replace_file_atomic_backoff(tmp: &Path, dest: &Path) -> Result<()> {
    if with_backoff(|| fs::rename(tmp, dest)).is_ok() {
        return Ok(());
    }
    if dest.exists() {
        remove_with_backoff(dest)?;
    }
    with_backoff(|| fs::copy(tmp, dest))
        .with_context(|| format!("copy {} -> {}", tmp.display(), dest.display()))?;
    remove_with_backoff(tmp)
}
