//! Paginated Remote Fetcher: walks `page=%d` endpoints, waits out throttling,
//! and turns every "no more data" shape into an empty page.

use crate::error::ExportError;
use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::Value;
use std::thread::sleep;
use std::time::Duration;
use tracing::{debug, warn};

/// Placeholder in path templates replaced by the 1-based page number.
pub const PAGE_PLACEHOLDER: &str = "%d";

/// Status the remote uses to signal throttling.
pub const THROTTLE_STATUS: u16 = 503;

pub const DEFAULT_THROTTLE_WAIT: Duration = Duration::from_secs(30);

/// Status and body of one GET.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }
}

/// One HTTP GET against the remote API. `Err` means the request never produced a
/// response (DNS, connect, TLS); statuses are the fetcher's business.
pub trait Transport {
    fn get(&self, path: &str) -> Result<RawResponse>;
}

/// Blocking reqwest transport with HTTP basic auth.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    email: String,
    password: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, email: &str, password: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("build HTTP client")?;
        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self { client, base_url, email: email.to_string(), password: password.to_string() })
    }
}

impl Transport for HttpTransport {
    fn get(&self, path: &str) -> Result<RawResponse> {
        let url = format!("{}{}", self.base_url, path.trim_start_matches('/'));
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.email, Some(&self.password))
            .send()
            .with_context(|| format!("GET {url}"))?;
        let status = response.status().as_u16();
        let body = response.text().with_context(|| format!("read body of {url}"))?;
        Ok(RawResponse { status, body })
    }
}

pub struct Fetcher<T: Transport> {
    transport: T,
    throttle_wait: Duration,
    max_throttle_retries: Option<u32>,
    requests: u64,
    throttle_waits: u64,
}

impl<T: Transport> Fetcher<T> {
    /// Retries throttled requests forever, waiting 30s between attempts.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            throttle_wait: DEFAULT_THROTTLE_WAIT,
            max_throttle_retries: None,
            requests: 0,
            throttle_waits: 0,
        }
    }

    pub fn with_throttle_wait(mut self, wait: Duration) -> Self {
        self.throttle_wait = wait;
        self
    }

    /// Give up after `n` consecutive throttled retries of the same request.
    /// `None` (the default) retries forever.
    pub fn with_max_throttle_retries(mut self, n: Option<u32>) -> Self {
        self.max_throttle_retries = n;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
    /// GETs issued so far, throttled ones included.
    pub fn requests(&self) -> u64 {
        self.requests
    }
    /// Throttle-triggered waits so far.
    pub fn throttle_waits(&self) -> u64 {
        self.throttle_waits
    }

    /// Fetch one document. With `nested_key`, return the value under that key
    /// (`null` when absent).
    pub fn fetch_page(&mut self, path: &str, nested_key: Option<&str>) -> Result<Value> {
        let mut retries = 0u32;
        let response = loop {
            debug!("GET {path}");
            let response = self.transport.get(path)?;
            self.requests += 1;
            if response.status != THROTTLE_STATUS {
                break response;
            }
            if let Some(max) = self.max_throttle_retries {
                if retries >= max {
                    return Err(ExportError::ThrottleRetriesExhausted { url: path.to_string(), attempts: retries }.into());
                }
            }
            retries += 1;
            self.throttle_waits += 1;
            warn!("throttled on {path}; waiting {}s before retry {retries}", self.throttle_wait.as_secs());
            sleep(self.throttle_wait);
        };

        if !(200..300).contains(&response.status) {
            return Err(ExportError::HttpStatus {
                url: path.to_string(),
                status: response.status,
                body: truncate(&response.body, 200),
            }
            .into());
        }

        let value: Value = serde_json::from_str(&response.body)
            .map_err(|_| ExportError::UnstructuredBody { url: path.to_string() })?;
        if value.is_string() {
            return Err(ExportError::UnstructuredBody { url: path.to_string() }.into());
        }

        Ok(match (nested_key, value) {
            (None, v) => v,
            (Some(k), Value::Object(mut map)) => map.remove(k).unwrap_or(Value::Null),
            (Some(k), other) => {
                debug!("{path}: no key {k:?} in a {} body", shape_name(&other));
                Value::Null
            }
        })
    }

    /// Fetch a single, unpaginated list of records.
    pub fn fetch_list(&mut self, path: &str, nested_key: Option<&str>) -> Result<Vec<Value>> {
        let value = self.fetch_page(path, nested_key)?;
        into_records(value, path)
    }

    /// Fetch pages 1, 2, 3, ... of `template` until a page comes back empty, and
    /// return every record in order.
    pub fn fetch_paginated(&mut self, template: &str, nested_key: Option<&str>) -> Result<Vec<Value>> {
        if !template.contains(PAGE_PLACEHOLDER) {
            return Err(anyhow!("path template {template:?} has no {PAGE_PLACEHOLDER} page placeholder"));
        }
        let mut records = Vec::new();
        let mut page = 1u64;
        loop {
            let path = template.replace(PAGE_PLACEHOLDER, &page.to_string());
            let batch = self.fetch_list(&path, nested_key)?;
            if batch.is_empty() {
                break;
            }
            debug!("{path}: {} records", batch.len());
            records.extend(batch);
            page += 1;
        }
        Ok(records)
    }
}

/// `null` is an empty page; an array is the page's records; anything else is fatal.
fn into_records(value: Value, path: &str) -> Result<Vec<Value>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items),
        other => Err(ExportError::UnexpectedShape { url: path.to_string(), found: shape_name(&other) }.into()),
    }
}

fn shape_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}...", &s[..i]),
        None => s.to_string(),
    }
}
