use crate::util::{create_with_backoff, replace_file_atomic_backoff};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One entity file's bytes: a single JSON object followed by `\n`.
pub fn to_json_line<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = serde_json::to_vec(value).context("serialize entity")?;
    buf.push(b'\n');
    Ok(buf)
}

/// Write `bytes` to a sibling `.tmp` file, then promote it to `path`.
/// Parent directories are created.
pub fn write_bytes_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    let f = create_with_backoff(&tmp).with_context(|| format!("create {}", tmp.display()))?;
    let mut w = BufWriter::new(f);
    w.write_all(bytes)?;
    w.flush().with_context(|| format!("flush {}", tmp.display()))?;
    drop(w);
    replace_file_atomic_backoff(&tmp, path)
}
