//! Server API payloads and fetch operations
//!
//! Typed models for everything the launcher exchanges with its backend:
//! launcher configuration, maintenance notices, news, update manifests,
//! feedback uploads and the WebSocket envelopes. Servers may wrap a payload
//! under a response key (`{"launcherConfigResponse": {...}, "meta": {...}}`)
//! or send it flat; both parse to the same model via [`parse_wrapped`].
//!
//! All fields default when absent, so old servers and trimmed payloads
//! deserialize without errors.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::net::retry::IsRetryable;
use crate::net::{NetworkEngine, RequestConfig, RetryPolicy};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// API endpoint paths, relative to a healthy host
pub mod endpoints {
    /// Launcher configuration document
    pub const LAUNCHER_CONFIG: &str = "/v1/api/launcherConfig";
    /// Maintenance status
    pub const MAINTENANCE: &str = "/v1/api/maintenance";
    /// News feed
    pub const NEWS: &str = "/v1/api/news";
    /// Update manifest
    pub const CHECK_UPDATES: &str = "/v1/api/checkUpdates";
    /// Feedback log upload
    pub const FEEDBACK_LOG: &str = "/v1/api/feedbacklog";
}

/// Structured error entry carried by server responses
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiError {
    /// Short error code
    pub error: String,
    /// Error category
    pub error_type: String,
    /// Human-readable message
    pub error_message: String,
}

/// Response metadata block
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Meta {
    /// API version the server spoke
    pub api_version: String,
    /// Oldest API version the server still accepts
    pub min_api_version: String,
    /// Server build identifier
    pub build_version: String,
    /// Server release date
    pub release_date: String,
    /// Message shown when the client's API version is deprecated
    pub deprecated_message: String,
    /// Server-side unix timestamp
    pub timestamp: i64,
    /// Whether the client's API version is deprecated
    pub is_deprecated: bool,
}

/// Client locale preferences sent with requests
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    /// UI language tag
    pub language: String,
}

/// Launcher build identity
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct App {
    /// Product name
    pub app_name: String,
    /// Core library version
    pub core_version: String,
    /// Installed resource-pack version
    pub resource_version: String,
    /// Build identifier
    pub build_id: String,
}

/// Host machine identity
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct System {
    /// Operating system name
    pub os: String,
    /// CPU architecture
    pub arch: String,
    /// OS version string
    pub os_version: String,
}

/// Client identity block sent with most requests
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientInfo {
    /// Launcher build identity
    pub app: App,
    /// Host machine identity
    pub system: System,
    /// Free-form extension block
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// Stable per-installation device identifier
    pub device_id: String,
}

impl ClientInfo {
    /// Gather the client identity from the running process and `config`
    pub fn gather(config: &ClientConfig) -> Self {
        Self {
            app: App {
                app_name: "NekoLauncher".into(),
                core_version: env!("CARGO_PKG_VERSION").into(),
                resource_version: config.main.resource_version.clone(),
                build_id: String::new(),
            },
            system: System {
                os: std::env::consts::OS.into(),
                arch: std::env::consts::ARCH.into(),
                os_version: sysinfo::System::os_version().unwrap_or_default(),
            },
            extra: serde_json::Map::new(),
            device_id: config.main.device_id.clone(),
        }
    }
}

/// WebSocket sub-config of the launcher configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebSocketConfig {
    /// Whether the client should open a socket
    pub enable: bool,
    /// Socket endpoint
    pub socket_host: String,
    /// Heartbeat cadence in seconds
    pub heartbeat_interval_sec: i32,
}

/// Security sub-config of the launcher configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecurityConfig {
    /// Whether authentication is required
    pub enable_authentication: bool,
    /// Access-token lifetime in seconds
    pub token_expiration_sec: i32,
    /// Refresh-token lifetime in days
    pub refresh_token_expiration_days: i32,
    /// Login endpoint
    pub login_url: String,
    /// Logout endpoint
    pub logout_url: String,
    /// Token refresh endpoint; servers historically used either
    /// `refreshTokenUrl` or `refreshUrl`
    #[serde(alias = "refreshUrl")]
    pub refresh_token_url: String,
}

/// Server-driven launcher configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LauncherConfigResponse {
    /// API host candidates
    pub host: Vec<String>,
    /// Suggested retry interval
    pub retry_interval_sec: i32,
    /// Suggested retry count
    pub max_retry_count: i32,
    /// WebSocket settings
    pub web_socket: WebSocketConfig,
    /// Security settings
    pub security: SecurityConfig,
    /// Response metadata
    pub meta: Meta,
}

/// Maintenance notice
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MaintenanceResponse {
    /// `progress`, `scheduled` or `completed`
    pub status: String,
    /// Display message
    pub message: String,
    /// Maintenance start time
    pub start_time: String,
    /// Expected end time
    pub ex_end_time: String,
    /// Poster image URL
    pub poster_url: String,
    /// Details link
    pub link: String,
    /// Response metadata
    pub meta: Meta,
}

impl MaintenanceResponse {
    /// Maintenance is underway right now
    pub fn is_in_progress(&self) -> bool {
        self.status == "progress"
    }

    /// Maintenance is announced but not started
    pub fn is_scheduled(&self) -> bool {
        self.status == "scheduled"
    }
}

/// One downloadable file in an update manifest
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateFile {
    /// Source URL (absolute when `is_absolute_url`)
    pub url: String,
    /// Destination file name
    pub file_name: String,
    /// Expected digest
    pub checksum: String,
    /// Digest algorithm name (`sha256`, `sha1`, ...)
    pub hash_algorithm: String,
    /// Large file worth a segmented download
    pub suggest_multi_thread: bool,
    /// Replaces a launcher core file (applies on restart)
    pub is_core_file: bool,
    /// `url` is absolute rather than host-relative
    pub is_absolute_url: bool,
}

/// Update manifest
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateResponse {
    /// Update title
    pub title: String,
    /// Update description
    pub description: String,
    /// Poster image URL
    pub poster_url: String,
    /// Publish time
    pub publish_time: String,
    /// Resource version this update brings the client to
    pub resource_version: String,
    /// Whether the update must be applied before launching
    pub is_mandatory: bool,
    /// Files to fetch
    pub files: Vec<UpdateFile>,
    /// Response metadata
    pub meta: Meta,
}

/// One news entry
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewsItem {
    /// Stable item id
    pub id: String,
    /// Title
    pub title: String,
    /// Short summary
    pub summary: String,
    /// Full content
    pub content: String,
    /// Poster image URL
    pub poster_url: String,
    /// Details link
    pub link: String,
    /// Publish time
    pub publish_time: String,
    /// Category name
    pub category: String,
    /// Tags
    pub tags: Vec<String>,
    /// Display priority
    pub priority: i32,
}

/// News feed page
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewsResponse {
    /// Items in this page
    pub items: Vec<NewsItem>,
    /// More pages are available
    pub has_more: bool,
    /// Response metadata
    pub meta: Meta,
}

/// News feed request
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewsRequest {
    /// Client identity
    pub client_info: ClientInfo,
    /// Client unix timestamp
    pub timestamp: i64,
    /// Page size
    pub limit: i32,
    /// Category filter
    pub categories: Vec<String>,
    /// Pagination cursor
    pub last_id: String,
    /// Locale preferences
    pub preferences: Preferences,
}

impl NewsRequest {
    /// A first-page request stamped with the current time
    pub fn new(client_info: ClientInfo, preferences: Preferences) -> Self {
        Self {
            client_info,
            timestamp: chrono::Utc::now().timestamp(),
            limit: 10,
            categories: Vec::new(),
            last_id: String::new(),
            preferences,
        }
    }
}

/// Feedback log upload
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeedbackLogRequest {
    /// Client identity
    pub client_info: ClientInfo,
    /// Client unix timestamp
    pub timestamp: i64,
    /// Log text
    pub log_content: String,
    /// Locale preferences
    pub preferences: Preferences,
}

impl FeedbackLogRequest {
    /// A request carrying `log_content`, stamped with the current time
    pub fn new(client_info: ClientInfo, log_content: impl Into<String>) -> Self {
        Self {
            client_info,
            timestamp: chrono::Utc::now().timestamp(),
            log_content: log_content.into(),
            preferences: Preferences::default(),
        }
    }
}

/// Server-to-client WebSocket envelope
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebSocketServerSide {
    /// `ping`, `pong` or `notifyChanged`
    pub action: String,
    /// Message id for acknowledgement
    pub message_id: String,
    /// Errors attached to the message
    pub errors: Vec<ApiError>,
    /// Response metadata
    pub meta: Meta,
    /// Payload of a `notifyChanged` action
    pub notify_changed: NotifyChanged,
}

/// `notifyChanged` payload
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotifyChanged {
    /// What changed (`maintenance`, `news`, `update`, ...)
    #[serde(rename = "type")]
    pub change_type: String,
    /// Display message
    pub message: String,
    /// Identity of the client the change targets
    pub client_info: ClientInfo,
}

impl WebSocketServerSide {
    /// The server pinged us
    pub fn is_ping(&self) -> bool {
        self.action == "ping"
    }

    /// The server answered our ping
    pub fn is_pong(&self) -> bool {
        self.action == "pong"
    }

    /// The server announced changed state
    pub fn is_notify_changed(&self) -> bool {
        self.action == "notifyChanged"
    }
}

/// Client-to-server WebSocket envelope
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebSocketClientSide {
    /// `ping`, `pong` or `query`
    pub action: String,
    /// Session token
    pub access_token: String,
    /// Last message id seen, for resume
    pub last_message_id: String,
    /// Client identity
    pub client_info: ClientInfo,
    /// Locale preferences
    pub preferences: Preferences,
}

/// Parse a payload that may be wrapped under `wrapper_key` or sent flat
///
/// # Errors
/// Propagates the JSON error when neither form deserializes.
pub fn parse_wrapped<T: DeserializeOwned>(text: &str, wrapper_key: &str) -> Result<T> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let payload = match value.get(wrapper_key) {
        Some(inner) => inner.clone(),
        None => value,
    };
    Ok(serde_json::from_value(payload)?)
}

/// High-level API client over the network engine and the healthy host set
pub struct LauncherApi {
    engine: Arc<NetworkEngine>,
    retry: RetryPolicy,
}

impl LauncherApi {
    /// Create an API client with the default retry policy
    pub fn new(engine: Arc<NetworkEngine>) -> Self {
        Self {
            engine,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy applied to API calls
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> Result<String> {
        self.engine
            .build_url(path)
            .ok_or_else(|| Error::config("no healthy API host available"))
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        wrapper_key: &str,
    ) -> Result<T> {
        let url = self.url(path)?;
        let request = RequestConfig::post(&url, serde_json::to_string(body)?)
            .with_header("Content-Type", "application/json")
            .with_request_id(path.trim_start_matches('/').replace('/', "-"));
        let result = self.engine.execute_with_retry(&request, &self.retry).await;
        if !result.is_success() {
            return Err(result.to_error(&url));
        }
        parse_wrapped(&result.content, wrapper_key)
    }

    /// Fetch the server-driven launcher configuration
    pub async fn launcher_config(&self, client: &ClientInfo) -> Result<LauncherConfigResponse> {
        self.post_json(
            endpoints::LAUNCHER_CONFIG,
            client,
            "launcherConfigResponse",
        )
        .await
    }

    /// Fetch the current maintenance notice
    pub async fn maintenance(&self, client: &ClientInfo) -> Result<MaintenanceResponse> {
        self.post_json(endpoints::MAINTENANCE, client, "maintenanceResponse")
            .await
    }

    /// Fetch a page of news
    pub async fn news(&self, request: &NewsRequest) -> Result<NewsResponse> {
        self.post_json(endpoints::NEWS, request, "newsResponse").await
    }

    /// Fetch the update manifest for this client
    pub async fn check_updates(&self, client: &ClientInfo) -> Result<UpdateResponse> {
        self.post_json(endpoints::CHECK_UPDATES, client, "updateResponse")
            .await
    }

    /// Upload a feedback log, retrying once more on a transient failure
    pub async fn send_feedback_log(&self, request: &FeedbackLogRequest) -> Result<()> {
        let attempt = self
            .post_json::<_, serde_json::Value>(endpoints::FEEDBACK_LOG, request, "meta")
            .await;
        match attempt {
            Ok(_) => Ok(()),
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, "feedback upload failed, retrying once");
                self.post_json::<_, serde_json::Value>(endpoints::FEEDBACK_LOG, request, "meta")
                    .await
                    .map(|_| ())
            }
            Err(e) => Err(e),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_and_flat_parse_identically() {
        let flat = r#"{
            "host": ["a.example", "b.example"],
            "retryIntervalSec": 5,
            "maxRetryCount": 3,
            "webSocket": {"enable": true, "socketHost": "ws.example", "heartbeatIntervalSec": 30},
            "security": {"enableAuthentication": true, "refreshTokenUrl": "https://a/refresh"}
        }"#;
        let wrapped = format!(r#"{{"launcherConfigResponse": {flat}, "meta": {{"apiVersion": "1"}}}}"#);

        let from_flat: LauncherConfigResponse =
            parse_wrapped(flat, "launcherConfigResponse").unwrap();
        let from_wrapped: LauncherConfigResponse =
            parse_wrapped(&wrapped, "launcherConfigResponse").unwrap();

        assert_eq!(from_flat.host, from_wrapped.host);
        assert_eq!(from_flat.web_socket, from_wrapped.web_socket);
        assert_eq!(from_flat.security, from_wrapped.security);
        assert_eq!(from_flat.retry_interval_sec, 5);
    }

    #[test]
    fn test_refresh_url_alias() {
        let json = r#"{"security": {"refreshUrl": "https://a/refresh"}}"#;
        let config: LauncherConfigResponse = serde_json::from_str(json).unwrap();
        assert_eq!(config.security.refresh_token_url, "https://a/refresh");
    }

    #[test]
    fn test_maintenance_status_helpers() {
        let in_progress: MaintenanceResponse =
            serde_json::from_str(r#"{"status": "progress", "message": "down"}"#).unwrap();
        assert!(in_progress.is_in_progress());
        assert!(!in_progress.is_scheduled());

        let done: MaintenanceResponse =
            serde_json::from_str(r#"{"status": "completed"}"#).unwrap();
        assert!(!done.is_in_progress());
    }

    #[test]
    fn test_update_response_defaults() {
        let update: UpdateResponse = serde_json::from_str(
            r#"{"files": [{"url": "/f.zip", "fileName": "f.zip", "checksum": "ab", "hashAlgorithm": "sha256"}]}"#,
        )
        .unwrap();
        assert_eq!(update.files.len(), 1);
        assert!(!update.files[0].is_core_file);
        assert!(!update.files[0].is_absolute_url);
        assert!(!update.is_mandatory);
    }

    #[test]
    fn test_websocket_envelope_actions() {
        let ping: WebSocketServerSide = serde_json::from_str(r#"{"action": "ping"}"#).unwrap();
        assert!(ping.is_ping());

        let changed: WebSocketServerSide = serde_json::from_str(
            r#"{"action": "notifyChanged", "notifyChanged": {"type": "maintenance", "message": "m"}}"#,
        )
        .unwrap();
        assert!(changed.is_notify_changed());
        assert_eq!(changed.notify_changed.change_type, "maintenance");
    }

    #[test]
    fn test_request_constructors_stamp_time() {
        let news = NewsRequest::new(ClientInfo::default(), Preferences::default());
        assert!(news.timestamp > 0);
        assert_eq!(news.limit, 10);

        let feedback = FeedbackLogRequest::new(ClientInfo::default(), "log line");
        assert!(feedback.timestamp > 0);
        assert_eq!(feedback.log_content, "log line");
    }

    #[test]
    fn test_client_info_gather() {
        let info = ClientInfo::gather(&ClientConfig::default());
        assert_eq!(info.app.app_name, "NekoLauncher");
        assert_eq!(info.system.os, std::env::consts::OS);
        assert!(!info.app.core_version.is_empty());
    }

    #[tokio::test]
    async fn test_launcher_config_fetch_over_engine() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(endpoints::LAUNCHER_CONFIG))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"launcherConfigResponse": {"host": ["h1"], "maxRetryCount": 2}}"#,
            ))
            .mount(&server)
            .await;

        let engine = Arc::new(NetworkEngine::with_host_config(crate::net::HostConfig {
            protocol: "http".into(),
            ..Default::default()
        }));
        engine.set_healthy_hosts(vec![server.address().to_string()]);

        let api = LauncherApi::new(engine);
        let config = api
            .launcher_config(&ClientInfo::default())
            .await
            .unwrap();
        assert_eq!(config.host, vec!["h1"]);
        assert_eq!(config.max_retry_count, 2);
    }
}
