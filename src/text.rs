//! HTML-to-plain-text conversion for comment and discussion bodies.

use crate::error::ExportError;
use anyhow::{Context, Result};
use regex::Regex;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

pub trait TextExtractor {
    fn extract_plain_text(&self, html: &str) -> Result<String>;
}

/// Runs an external converter (default `html2text`) on a scratch file and reads
/// its stdout. The scratch file is removed as soon as the program returns.
#[derive(Clone, Debug)]
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
}

impl Default for CommandExtractor {
    fn default() -> Self {
        Self { program: "html2text".to_string(), args: Vec::new() }
    }
}

impl CommandExtractor {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    /// Arguments placed before the scratch file path.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Fails with `MissingPrerequisite` unless the program resolves on `PATH`
    /// (or is an existing path itself).
    pub fn ensure_available(&self) -> Result<PathBuf> {
        find_program(&self.program)
            .ok_or_else(|| ExportError::MissingPrerequisite { program: self.program.clone() }.into())
    }
}

fn find_program(program: &str) -> Option<PathBuf> {
    let direct = PathBuf::from(program);
    if direct.components().count() > 1 {
        return direct.is_file().then_some(direct);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        let exe = candidate.with_extension("exe");
        exe.is_file().then_some(exe)
    })
}

impl TextExtractor for CommandExtractor {
    fn extract_plain_text(&self, html: &str) -> Result<String> {
        let fail = |reason: String| ExportError::ExtractionFailed {
            program: self.program.clone(),
            reason,
        };
        let mut scratch = tempfile::Builder::new()
            .prefix("body_")
            .suffix(".html")
            .tempfile()
            .context("create scratch file for body text")?;
        scratch.write_all(html.as_bytes())?;
        scratch.flush()?;

        let out = Command::new(&self.program)
            .args(&self.args)
            .arg(scratch.path())
            .output();
        scratch.close().context("remove scratch file")?;

        let out = out.map_err(|e| fail(e.to_string()))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            return Err(fail(format!("exit {}: {stderr}", out.status)).into());
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }
}

/// In-process fallback: drop tags, decode the common entities, tidy whitespace.
#[derive(Clone, Copy, Debug, Default)]
pub struct TagStripExtractor;

struct StripPatterns {
    skip: Regex,
    breaks: Regex,
    tags: Regex,
    spaces: Regex,
    blank_lines: Regex,
}

fn patterns() -> &'static StripPatterns {
    static P: OnceLock<StripPatterns> = OnceLock::new();
    P.get_or_init(|| StripPatterns {
        skip: Regex::new(r"(?is)<(script|style)\b.*?</(script|style)\s*>").expect("static regex"),
        breaks: Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6]|tr|blockquote|pre)\s*>").expect("static regex"),
        tags: Regex::new(r"(?s)<[^>]*>").expect("static regex"),
        spaces: Regex::new(r"[ \t\r\f]+").expect("static regex"),
        blank_lines: Regex::new(r"\n\s*\n\s*\n+").expect("static regex"),
    })
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

impl TextExtractor for TagStripExtractor {
    fn extract_plain_text(&self, html: &str) -> Result<String> {
        let p = patterns();
        let s = p.skip.replace_all(html, "");
        let s = p.breaks.replace_all(&s, "\n");
        let s = p.tags.replace_all(&s, "");
        let s = decode_entities(&s);
        let s = p.spaces.replace_all(&s, " ");
        let lines: Vec<&str> = s.lines().map(str::trim).collect();
        let s = lines.join("\n");
        Ok(p.blank_lines.replace_all(&s, "\n\n").trim().to_string())
    }
}
