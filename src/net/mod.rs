//! Network engine: request execution, retries, segmented downloads, hosts
//!
//! The engine wraps a shared [`reqwest::Client`] plus the process-wide
//! [`HostConfig`] published by the availability probe. A single request is
//! described by [`RequestConfig`] and always yields a [`RequestResult`];
//! transport failures are embedded in the result rather than raised, so the
//! retry wrapper can make uniform decisions.
//!
//! Submodules:
//! - [`retry`] — the retry wrapper and the [`retry::IsRetryable`] classification
//! - [`download`] — segment planning and pool-driven multi-part downloads
//! - [`hosts`] — the static host list, proxy validation and the probe

pub mod download;
pub mod hosts;
pub mod retry;

pub use download::{ContentDigest, MultiDownloadConfig, SegmentApproach};
pub use hosts::HostConfig;
pub use retry::{IsRetryable, RetryPolicy};

use crate::error::{Error, Result};
use reqwest::Method;
use reqwest::header::{RANGE, USER_AGENT};
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Default per-request deadline
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An inclusive byte range requested from the server
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset
    pub start: u64,
    /// Last byte offset (inclusive); `None` means "to the end"
    pub end: Option<u64>,
}

impl ByteRange {
    /// Render as a `Range` header value
    fn header_value(start: u64, end: Option<u64>) -> String {
        match end {
            Some(end) => format!("bytes={start}-{end}"),
            None => format!("bytes={start}-"),
        }
    }
}

/// Description of a single HTTP operation
#[derive(Clone, Debug)]
pub struct RequestConfig {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Extra headers appended to the request
    pub headers: Vec<(String, String)>,
    /// Request body, if any
    pub body: Option<String>,
    /// Destination file; when set, the body streams to disk instead of the
    /// result buffer
    pub file_path: Option<PathBuf>,
    /// Byte range to request
    pub range: Option<ByteRange>,
    /// Resume a partial file download: the resume offset is the destination
    /// file's current size, added to any configured range start
    pub resumable: bool,
    /// Caller-chosen id echoed in the result and in logs
    pub request_id: String,
    /// Override for the engine-wide user agent
    pub user_agent: Option<String>,
    /// Override for the engine-wide proxy
    pub proxy: Option<String>,
    /// Override for the engine-wide timeout
    pub timeout: Option<Duration>,
}

impl RequestConfig {
    /// A GET request for `url`
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            file_path: None,
            range: None,
            resumable: false,
            request_id: String::new(),
            user_agent: None,
            proxy: None,
            timeout: None,
        }
    }

    /// A POST request for `url` carrying `body`
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        let mut cfg = Self::get(url);
        cfg.method = Method::POST;
        cfg.body = Some(body.into());
        cfg
    }

    /// Stream the response body to `path`
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Request only the given byte range
    pub fn with_range(mut self, start: u64, end: Option<u64>) -> Self {
        self.range = Some(ByteRange { start, end });
        self
    }

    /// Resume an interrupted file download
    pub fn with_resume(mut self) -> Self {
        self.resumable = true;
        self
    }

    /// Tag the request for result correlation and logs
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = id.into();
        self
    }

    /// Append a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Classification of a failed request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetErrorKind {
    /// DNS, connect, TLS or mid-body transport failure
    Transport,
    /// The request deadline elapsed
    Timeout,
    /// Writing the response to the file sink failed
    Io,
}

/// Outcome of a single request
///
/// `is_success` holds exactly when no transport error occurred and the
/// status is in `200..300`.
#[derive(Clone, Debug, Default)]
pub struct RequestResult {
    /// The caller-chosen request id
    pub request_id: String,
    /// HTTP status, when a response line was received
    pub status: Option<u16>,
    /// Response body, when no file sink was configured
    pub content: String,
    /// Bytes written to the file sink
    pub bytes_written: u64,
    /// Transport-level failure classification, if any
    pub error_kind: Option<NetErrorKind>,
    /// Brief, user-facing failure description
    pub error_message: String,
    /// Diagnostic failure description
    pub detailed_error_message: String,
}

impl RequestResult {
    /// No transport error and a 2xx status
    pub fn is_success(&self) -> bool {
        self.error_kind.is_none() && matches!(self.status, Some(s) if (200..300).contains(&s))
    }

    /// Convert a failed result into the matching [`Error`]
    pub fn to_error(&self, url: &str) -> Error {
        match self.error_kind {
            Some(NetErrorKind::Timeout) => Error::Timeout {
                url: url.to_string(),
            },
            Some(NetErrorKind::Transport) => Error::Transport {
                message: self.detailed_error_message.clone(),
            },
            Some(NetErrorKind::Io) => Error::Io(std::io::Error::other(
                self.detailed_error_message.clone(),
            )),
            None => Error::HttpStatus {
                status: self.status.unwrap_or(0),
                url: url.to_string(),
            },
        }
    }
}

/// Configurable HTTP engine shared by every downloading component
pub struct NetworkEngine {
    client: reqwest::Client,
    hosts: RwLock<HostConfig>,
}

impl Default for NetworkEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkEngine {
    /// Create an engine with the default [`HostConfig`]
    pub fn new() -> Self {
        Self::with_host_config(HostConfig::default())
    }

    /// Create an engine from an explicit host configuration
    ///
    /// A malformed proxy value is ignored (the probe validates before
    /// publishing, but a caller-supplied config goes through the same gate).
    pub fn with_host_config(hosts: HostConfig) -> Self {
        let mut builder = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT);
        if let Some(proxy) = hosts.proxy.as_deref().and_then(hosts::validate_proxy) {
            match reqwest::Proxy::all(&proxy) {
                Ok(p) => builder = builder.proxy(p),
                Err(e) => tracing::warn!(proxy, error = %e, "proxy rejected by client, ignoring"),
            }
        }
        let client = builder.build().unwrap_or_default();
        Self {
            client,
            hosts: RwLock::new(hosts),
        }
    }

    /// Snapshot of the process-wide host configuration
    pub fn host_config(&self) -> HostConfig {
        self.hosts.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the healthy host set (done by the probe)
    pub fn set_healthy_hosts(&self, hosts: Vec<String>) {
        self.hosts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .healthy_hosts = hosts;
    }

    /// Build an absolute URL on the first healthy host
    ///
    /// Returns `None` until the probe has published at least one host.
    pub fn build_url(&self, path: &str) -> Option<String> {
        let hosts = self.hosts.read().unwrap_or_else(|e| e.into_inner());
        let host = hosts.healthy_hosts.first()?;
        Some(format!("{}://{}{}", hosts.protocol, host, path))
    }

    /// Build an absolute URL on an explicit host
    pub fn build_url_on(&self, host: &str, path: &str) -> String {
        let protocol = self
            .hosts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .protocol
            .clone();
        format!("{protocol}://{host}{path}")
    }

    /// Execute one request
    ///
    /// Never panics and never returns `Err`: every failure is embedded in
    /// the [`RequestResult`]. With a file sink, the body is streamed to disk
    /// only for 2xx responses; a resumed request appends at the current file
    /// size (a server answering 200 instead of 206 restarts the file).
    pub async fn execute(&self, cfg: &RequestConfig) -> RequestResult {
        let mut result = RequestResult {
            request_id: cfg.request_id.clone(),
            ..Default::default()
        };

        let mut resume_offset = 0u64;
        if cfg.resumable {
            if let Some(path) = &cfg.file_path {
                if let Ok(meta) = tokio::fs::metadata(path).await {
                    resume_offset = meta.len();
                }
            }
        }

        let range_header = match (&cfg.range, resume_offset) {
            (Some(range), offset) => Some(ByteRange::header_value(range.start + offset, range.end)),
            (None, offset) if offset > 0 => Some(ByteRange::header_value(offset, None)),
            _ => None,
        };

        // A per-request proxy override needs its own client.
        let client = match cfg.proxy.as_deref().and_then(hosts::validate_proxy) {
            Some(proxy) => reqwest::Proxy::all(&proxy)
                .ok()
                .and_then(|p| {
                    reqwest::Client::builder()
                        .timeout(DEFAULT_TIMEOUT)
                        .proxy(p)
                        .build()
                        .ok()
                })
                .unwrap_or_else(|| self.client.clone()),
            None => self.client.clone(),
        };

        let user_agent = cfg
            .user_agent
            .clone()
            .unwrap_or_else(|| self.host_config().user_agent);

        let mut request = client
            .request(cfg.method.clone(), &cfg.url)
            .header(USER_AGENT, user_agent);
        if let Some(timeout) = cfg.timeout {
            request = request.timeout(timeout);
        }
        for (name, value) in &cfg.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(range) = &range_header {
            request = request.header(RANGE, range.as_str());
        }
        if let Some(body) = &cfg.body {
            request = request.body(body.clone());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                result.error_kind = Some(if e.is_timeout() {
                    NetErrorKind::Timeout
                } else {
                    NetErrorKind::Transport
                });
                result.error_message = "request failed".into();
                result.detailed_error_message = e.to_string();
                tracing::warn!(
                    request_id = %cfg.request_id,
                    url = %cfg.url,
                    error = %e,
                    "request transport failure"
                );
                return result;
            }
        };

        let status = response.status();
        result.status = Some(status.as_u16());

        if !status.is_success() {
            result.error_message = format!("HTTP status {}", status.as_u16());
            // Drain the body so the connection can be reused.
            let _ = response.bytes().await;
            return result;
        }

        match &cfg.file_path {
            Some(path) => {
                // A 200 answer to a resume request carries the whole body.
                let append = resume_offset > 0 && status.as_u16() == 206;
                if let Err(e) = write_body_to_file(response, path, append, &mut result).await {
                    result.error_kind = Some(NetErrorKind::Io);
                    result.error_message = "failed to write response to file".into();
                    result.detailed_error_message = e.to_string();
                }
            }
            None => match response.text().await {
                Ok(text) => result.content = text,
                Err(e) => {
                    result.error_kind = Some(NetErrorKind::Transport);
                    result.error_message = "failed to read response body".into();
                    result.detailed_error_message = e.to_string();
                }
            },
        }

        result
    }

    /// Content length of `url` via a HEAD request
    ///
    /// # Errors
    /// Transport failures and non-2xx statuses are raised; an absent
    /// `Content-Length` yields `Ok(None)`.
    pub async fn content_size(&self, url: &str) -> Result<Option<u64>> {
        let response = self.client.head(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.content_length())
    }
}

async fn write_body_to_file(
    response: reqwest::Response,
    path: &std::path::Path,
    append: bool,
    result: &mut RequestResult,
) -> std::io::Result<()> {
    use futures::StreamExt;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .await?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(std::io::Error::other)?;
        file.write_all(&chunk).await?;
        result.bytes_written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(())
}
