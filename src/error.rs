//! Fatal error classes. Anything in here aborts the run; data-quality problems never
//! surface as one of these (see `store::Outcome`).

use thiserror::Error;

/// Conditions that stop an export.
///
/// Library functions return `anyhow::Result`; use `err.downcast_ref::<ExportError>()`
/// to tell which class a failure belongs to.
#[derive(Debug, Error)]
pub enum ExportError {
    /// A discussion or article was handed to the store without a parent key.
    #[error("cannot add {kind}: no parent {parent} key given")]
    MissingParent { kind: &'static str, parent: &'static str },

    /// A parent key that no successful add ever produced.
    #[error("cannot add {kind}: unknown parent key {key}")]
    UnknownParent { kind: &'static str, key: String },

    /// Non-success, non-throttle HTTP status.
    #[error("GET {url} failed with HTTP {status}: {body}")]
    HttpStatus { url: String, status: u16, body: String },

    /// Success status, but the body was not structured JSON.
    #[error("GET {url} returned an unstructured body (check the API content type)")]
    UnstructuredBody { url: String },

    /// Structured body of a shape the caller cannot page through.
    #[error("GET {url}: expected a list of records, got {found}")]
    UnexpectedShape { url: String, found: &'static str },

    /// Only reachable when a throttle retry cap is configured.
    #[error("GET {url} still throttled after {attempts} retries")]
    ThrottleRetriesExhausted { url: String, attempts: u32 },

    /// An external tool the run depends on is not installed.
    #[error("required program `{program}` was not found on PATH")]
    MissingPrerequisite { program: String },

    #[error("text extraction with `{program}` failed: {reason}")]
    ExtractionFailed { program: String, reason: String },

    #[error("packaging {archive} failed: {reason}")]
    PackagingFailed { archive: String, reason: String },
}
