use crate::session::WriteMode;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How comment and discussion bodies are turned into plain text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextMode {
    /// External converter invoked on a scratch file (must be on PATH).
    Command { program: String, args: Vec<String> },
    /// In-process tag stripping.
    Builtin,
}

impl Default for TextMode {
    fn default() -> Self {
        TextMode::Command { program: "html2text".to_string(), args: Vec::new() }
    }
}

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub subdomain: String,
    pub email: String,
    pub password: String,
    pub base_url: Option<String>,     // if None, https://<subdomain>.zendesk.com/
    pub work_dir: PathBuf,            // export_<site>/ is created here
    pub out_dir: PathBuf,             // export_<site>.tgz lands here
    pub write_mode: WriteMode,
    pub throttle_wait: Duration,
    pub max_throttle_retries: Option<u32>, // None = retry forever
    pub request_timeout: Duration,
    pub text: TextMode,
    pub include_tickets: bool,
    pub progress: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            subdomain: String::new(),
            email: String::new(),
            password: String::new(),
            base_url: None,
            work_dir: std::env::temp_dir(),
            out_dir: PathBuf::from("."),
            write_mode: WriteMode::WriteThrough,
            throttle_wait: crate::fetcher::DEFAULT_THROTTLE_WAIT,
            max_throttle_retries: None,
            request_timeout: Duration::from_secs(120),
            text: TextMode::default(),
            include_tickets: true,
            progress: true,
        }
    }
}

impl ExportOptions {
    pub fn new(subdomain: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            subdomain: subdomain.into().trim().to_string(),
            email: email.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// Name of the exported site; names the export dir and archive.
    pub fn site(&self) -> &str {
        &self.subdomain
    }

    pub fn api_base_url(&self) -> String {
        match &self.base_url {
            Some(u) => u.clone(),
            None => format!("https://{}.zendesk.com/", self.subdomain),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_out_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.out_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }
    pub fn with_buffered(self, yes: bool) -> Self {
        self.with_write_mode(if yes { WriteMode::Buffered } else { WriteMode::WriteThrough })
    }
    pub fn with_throttle_wait(mut self, wait: Duration) -> Self {
        self.throttle_wait = wait;
        self
    }
    pub fn with_max_throttle_retries(mut self, n: Option<u32>) -> Self {
        self.max_throttle_retries = n;
        self
    }
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout.max(Duration::from_secs(1));
        self
    }
    pub fn with_text_mode(mut self, text: TextMode) -> Self {
        self.text = text;
        self
    }
    pub fn with_tickets(mut self, yes: bool) -> Self {
        self.include_tickets = yes;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
}
