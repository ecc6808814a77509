//! Retry wrapper with exponential backoff
//!
//! Wraps [`NetworkEngine::execute`](super::NetworkEngine::execute): a result
//! is accepted when it carries no transport error and its status is in the
//! policy's success set; anything else sleeps and retries until success or
//! exhaustion. On a resumable download, HTTP 416 ("range not satisfiable")
//! counts as success because it means the server has no bytes beyond what is
//! already on disk.
//!
//! Jitter is applied to each delay to avoid thundering-herd retries when
//! many segment tasks fail at once.

use super::{NetworkEngine, RequestConfig, RequestResult};
use crate::error::Error;
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, server overload) return
/// `true`; permanent failures (bad manifests, integrity mismatches after
/// repair, invalid arguments) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. } | Error::Transport { .. } => true,
            // Server-side failures may clear up; client errors will not.
            Error::HttpStatus { status, .. } => *status >= 500,
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

/// Retry configuration for a wrapped request
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = `max_retries + 1`)
    pub max_retries: u32,
    /// Delay before the first retry
    pub retry_delay: Duration,
    /// Ceiling for the backed-off delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failure
    pub backoff_multiplier: f64,
    /// Add random jitter to delays
    pub jitter: bool,
    /// HTTP statuses accepted as success
    pub success_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
            success_codes: vec![200],
        }
    }
}

impl RetryPolicy {
    /// A short policy for availability probing: one retry, small delay
    pub fn probe() -> Self {
        Self {
            max_retries: 1,
            retry_delay: Duration::from_millis(300),
            jitter: false,
            ..Self::default()
        }
    }

    /// Whether `result` is acceptable under this policy for `cfg`
    pub fn accepts(&self, cfg: &RequestConfig, result: &RequestResult) -> bool {
        if result.error_kind.is_some() {
            return false;
        }
        match result.status {
            Some(status) if self.success_codes.contains(&status) => true,
            // The server has nothing past our resume offset; the file is
            // already complete.
            Some(416) if cfg.resumable => true,
            Some(status) => (200..300).contains(&status) && self.success_codes.is_empty(),
            None => false,
        }
    }
}

impl NetworkEngine {
    /// Execute `cfg`, retrying under `policy` until success or exhaustion
    ///
    /// Returns the last [`RequestResult`]; the caller decides whether a
    /// still-failing result is fatal.
    pub async fn execute_with_retry(
        &self,
        cfg: &RequestConfig,
        policy: &RetryPolicy,
    ) -> RequestResult {
        let mut attempt: u32 = 0;
        let mut delay = policy.retry_delay;

        loop {
            let result = self.execute(cfg).await;
            if policy.accepts(cfg, &result) {
                if attempt > 0 {
                    tracing::info!(
                        request_id = %cfg.request_id,
                        attempts = attempt + 1,
                        "request succeeded after retry"
                    );
                }
                return result;
            }

            if attempt >= policy.max_retries {
                tracing::error!(
                    request_id = %cfg.request_id,
                    url = %cfg.url,
                    status = ?result.status,
                    attempts = attempt + 1,
                    "request failed after all retry attempts exhausted"
                );
                return result;
            }
            attempt += 1;

            tracing::warn!(
                request_id = %cfg.request_id,
                url = %cfg.url,
                status = ?result.status,
                attempt,
                max_retries = policy.max_retries,
                delay_ms = delay.as_millis(),
                "request failed, retrying"
            );

            let sleep_for = if policy.jitter { add_jitter(delay) } else { delay };
            tokio::time::sleep(sleep_for).await;

            delay = Duration::from_secs_f64(delay.as_secs_f64() * policy.backoff_multiplier)
                .min(policy.max_delay);
        }
    }
}

/// Add random jitter between 0% and 100% of the delay
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            retry_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            jitter: false,
            ..RetryPolicy::default()
        }
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let server = MockServer::start().await;
        // Two failures, then success.
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let engine = NetworkEngine::new();
        let cfg = RequestConfig::get(format!("{}/flaky", server.uri()));
        let result = engine.execute_with_retry(&cfg, &fast_policy(3)).await;
        assert!(result.is_success());
        assert_eq!(result.content, "ok");
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_last_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let engine = NetworkEngine::new();
        let cfg = RequestConfig::get(format!("{}/down", server.uri()));
        let result = engine.execute_with_retry(&cfg, &fast_policy(2)).await;
        assert!(!result.is_success());
        assert_eq!(result.status, Some(500));
    }

    #[tokio::test]
    async fn test_416_accepted_for_resumable() {
        let policy = RetryPolicy::default();
        let resumable = RequestConfig::get("http://example/file").with_resume();
        let plain = RequestConfig::get("http://example/file");
        let result = RequestResult {
            status: Some(416),
            ..Default::default()
        };
        assert!(policy.accepts(&resumable, &result));
        assert!(!policy.accepts(&plain, &result));
    }

    #[tokio::test]
    async fn test_custom_success_codes() {
        let policy = RetryPolicy {
            success_codes: vec![200, 204],
            ..fast_policy(0)
        };
        let cfg = RequestConfig::get("http://example/x");
        let no_content = RequestResult {
            status: Some(204),
            ..Default::default()
        };
        assert!(policy.accepts(&cfg, &no_content));
        let teapot = RequestResult {
            status: Some(418),
            ..Default::default()
        };
        assert!(!policy.accepts(&cfg, &teapot));
    }

    #[test]
    fn test_error_retryability() {
        assert!(Error::Timeout { url: "u".into() }.is_retryable());
        assert!(
            Error::Transport {
                message: "reset".into()
            }
            .is_retryable()
        );
        assert!(
            Error::HttpStatus {
                status: 503,
                url: "u".into()
            }
            .is_retryable()
        );
        assert!(
            !Error::HttpStatus {
                status: 404,
                url: "u".into()
            }
            .is_retryable()
        );
        assert!(!Error::InvalidArgument("x".into()).is_retryable());
        assert!(
            !Error::Integrity {
                path: "p".into(),
                expected: "a".into(),
                actual: "b".into()
            }
            .is_retryable()
        );
    }
}
