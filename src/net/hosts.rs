//! Host configuration and the availability probe
//!
//! During initialisation every host from the static list is probed with a
//! short-retry GET against a known path; hosts answering 200 form the
//! healthy set, in probe order, and are published into the engine's
//! process-wide [`HostConfig`] for all later API and download traffic.

use super::retry::RetryPolicy;
use super::{NetworkEngine, RequestConfig};
use regex::Regex;
use std::sync::OnceLock;

/// Built-in host candidates, probed in order
pub const DEFAULT_HOSTS: &[&str] = &["api.nekolc.org", "api2.nekolc.org"];

/// Path every API host answers 200 on when it is up
pub const PROBE_PATH: &str = "/v1/testing/ping";

/// Process-wide network settings published by the probe
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostConfig {
    /// User agent sent with every request
    pub user_agent: String,
    /// Proxy URL, already validated, or `None`
    pub proxy: Option<String>,
    /// URL scheme used to reach the hosts (`https`, or `http` in insecure
    /// developer mode)
    pub protocol: String,
    /// Hosts that answered the probe, in probe order
    pub healthy_hosts: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("NekoLauncher/{}", env!("CARGO_PKG_VERSION")),
            proxy: None,
            protocol: "https".into(),
            healthy_hosts: Vec::new(),
        }
    }
}

/// Validate a user-specified proxy string
///
/// Accepts `http`, `https`, `socks4` and `socks5` URLs with an explicit
/// port; the candidate must also parse as a URL with a host. Anything else
/// is ignored by returning `None`.
pub fn validate_proxy(value: &str) -> Option<String> {
    static PROXY_RE: OnceLock<Regex> = OnceLock::new();
    let re = PROXY_RE.get_or_init(|| {
        Regex::new(r"^(http|https|socks4|socks5)://[^\s/]+:\d+$").unwrap_or_else(|e| {
            unreachable!("proxy pattern is static and valid: {e}");
        })
    });
    let value = value.trim();
    let well_formed = re.is_match(value)
        && url::Url::parse(value).is_ok_and(|url| url.host_str().is_some());
    if well_formed {
        Some(value.to_string())
    } else {
        if !value.is_empty() {
            tracing::warn!(proxy = value, "malformed proxy ignored");
        }
        None
    }
}

/// Probe `candidates` and publish the healthy subset into the engine
///
/// Each host gets a short-retry GET on [`PROBE_PATH`]; a 200 marks it
/// healthy. The healthy list preserves candidate order.
pub async fn probe_hosts(engine: &NetworkEngine, candidates: &[String]) -> Vec<String> {
    let policy = RetryPolicy::probe();
    let mut healthy = Vec::new();

    for host in candidates {
        let url = engine.build_url_on(host, PROBE_PATH);
        let request = RequestConfig::get(&url).with_request_id(format!("probe-{host}"));
        let result = engine.execute_with_retry(&request, &policy).await;
        if result.is_success() {
            tracing::info!(host = %host, "host probe succeeded");
            healthy.push(host.clone());
        } else {
            tracing::warn!(host = %host, status = ?result.status, "host probe failed");
        }
    }

    engine.set_healthy_hosts(healthy.clone());
    healthy
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_proxy_accepts_supported_schemes() {
        for proxy in [
            "http://127.0.0.1:8080",
            "https://proxy.example:443",
            "socks4://10.0.0.1:1080",
            "socks5://localhost:9050",
        ] {
            assert_eq!(validate_proxy(proxy).as_deref(), Some(proxy));
        }
    }

    #[test]
    fn test_validate_proxy_rejects_malformed() {
        for proxy in [
            "ftp://host:21",
            "http://host",
            "host:8080",
            "socks5://host:notaport",
            "",
        ] {
            assert_eq!(validate_proxy(proxy), None, "should reject {proxy:?}");
        }
    }

    #[tokio::test]
    async fn test_probe_publishes_healthy_subset_in_order() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let up = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROBE_PATH))
            .respond_with(ResponseTemplate::new(200))
            .mount(&up)
            .await;

        let down = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROBE_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&down)
            .await;

        // The mock servers speak plain HTTP.
        let engine = NetworkEngine::with_host_config(HostConfig {
            protocol: "http".into(),
            ..HostConfig::default()
        });

        let up_host = up.address().to_string();
        let down_host = down.address().to_string();
        let healthy = probe_hosts(
            &engine,
            &[down_host.clone(), up_host.clone()],
        )
        .await;

        assert_eq!(healthy, vec![up_host.clone()]);
        assert_eq!(engine.host_config().healthy_hosts, vec![up_host.clone()]);
        assert_eq!(
            engine.build_url(PROBE_PATH).unwrap(),
            format!("http://{up_host}{PROBE_PATH}")
        );
    }
}
