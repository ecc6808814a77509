//! Authlib-injector provisioning
//!
//! The injector JAR redirects yggdrasil authentication calls. When enabled,
//! the launcher verifies the JAR in the game directory against its recorded
//! SHA-256, downloads the latest build from the injector index when missing
//! or mismatched, persists the new digest back to the configuration and
//! prepends the `-javaagent` argument set.

use crate::config::ConfigStore;
use crate::error::{Error, Result};
use crate::net::{NetworkEngine, RequestConfig, RetryPolicy};
use crate::util::sha256_file;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Index document describing the latest injector build
pub const AUTHLIB_INDEX_URL: &str = "https://authlib-injector.yushi.moe/artifact/latest.json";

/// Yggdrasil API root path on the launcher's auth server
pub const AUTHLIB_ROOT_PATH: &str = "/api/yggdrasil";

/// Authlib settings of a launch
#[derive(Clone, Debug)]
pub struct AuthlibSettings {
    /// Whether the injector is used at all
    pub enabled: bool,
    /// JAR file name inside the game directory
    pub name: String,
    /// Recorded SHA-256 of the JAR
    pub expected_sha256: String,
    /// Prefetched yggdrasil metadata blob (stored with escaping)
    pub prefetched: String,
    /// Override for the yggdrasil root URL; defaults to the healthy host
    pub root_url: Option<String>,
    /// Override for the injector index URL; defaults to [`AUTHLIB_INDEX_URL`]
    pub index_url: Option<String>,
}

impl Default for AuthlibSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "authlib-injector.jar".into(),
            expected_sha256: String::new(),
            prefetched: String::new(),
            root_url: None,
            index_url: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthlibIndex {
    download_url: String,
    checksums: AuthlibChecksums,
}

#[derive(Debug, Deserialize)]
struct AuthlibChecksums {
    sha256: String,
}

async fn download_injector(
    engine: &NetworkEngine,
    store: Option<&ConfigStore>,
    jar_path: &Path,
    index_url: &str,
) -> Result<String> {
    let policy = RetryPolicy::default();
    let index_request = RequestConfig::get(index_url).with_request_id("authlib-injector-latest");
    let index_result = engine.execute_with_retry(&index_request, &policy).await;
    if !index_result.is_success() {
        return Err(index_result.to_error(index_url));
    }
    let index: AuthlibIndex =
        serde_json::from_str(&index_result.content).map_err(|e| Error::ManifestKeyMissing {
            key: format!("authlib index download_url/checksums.sha256 ({e})"),
        })?;

    let jar_request = RequestConfig::get(&index.download_url)
        .with_file(jar_path)
        .with_request_id("authlib-injector-download");
    let jar_result = engine.execute_with_retry(&jar_request, &policy).await;
    if !jar_result.is_success() {
        return Err(jar_result.to_error(&index.download_url));
    }

    let actual = {
        let path = jar_path.to_path_buf();
        tokio::task::spawn_blocking(move || sha256_file(&path))
            .await
            .map_err(|e| Error::InvalidArgument(format!("hash task failed: {e}")))??
    };
    if !actual.eq_ignore_ascii_case(&index.checksums.sha256) {
        tokio::fs::remove_file(jar_path).await.ok();
        return Err(Error::Integrity {
            path: jar_path.to_path_buf(),
            expected: index.checksums.sha256,
            actual,
        });
    }

    if let Some(store) = store {
        let sha256 = actual.clone();
        store.update_client_config(|cfg| {
            cfg.minecraft.authlib_sha256 = sha256.clone();
        })?;
    }
    tracing::info!(path = %jar_path.display(), sha256 = %actual, "authlib injector downloaded");
    Ok(actual)
}

/// Verify (and if needed provision) the injector, returning the JVM arguments
///
/// In tolerant mode a digest mismatch of an existing JAR is accepted as-is;
/// a missing JAR is always downloaded.
///
/// # Errors
/// Network errors from the index or artifact fetch, [`Error::Integrity`]
/// when the downloaded JAR hashes wrong.
pub async fn ensure_authlib_args(
    engine: &NetworkEngine,
    store: Option<&ConfigStore>,
    game_dir: &Path,
    settings: &AuthlibSettings,
    tolerant: bool,
) -> Result<Vec<String>> {
    if !settings.enabled {
        return Ok(Vec::new());
    }

    let jar_path: PathBuf = game_dir.join(&settings.name);
    let index_url = settings.index_url.as_deref().unwrap_or(AUTHLIB_INDEX_URL);

    if !jar_path.is_file() {
        download_injector(engine, store, &jar_path, index_url).await?;
    } else if !tolerant {
        let actual = {
            let path = jar_path.clone();
            tokio::task::spawn_blocking(move || sha256_file(&path))
                .await
                .map_err(|e| Error::InvalidArgument(format!("hash task failed: {e}")))??
        };
        if !settings.expected_sha256.is_empty()
            && !actual.eq_ignore_ascii_case(&settings.expected_sha256)
        {
            tracing::warn!(
                path = %jar_path.display(),
                expected = %settings.expected_sha256,
                actual = %actual,
                "authlib injector digest mismatch, re-downloading"
            );
            tokio::fs::remove_file(&jar_path).await?;
            download_injector(engine, store, &jar_path, index_url).await?;
        }
    }

    let root_url = settings
        .root_url
        .clone()
        .or_else(|| engine.build_url(AUTHLIB_ROOT_PATH))
        .unwrap_or_default();

    // The stored blob carries JSON escaping from the config layer.
    let prefetched = settings.prefetched.replace('\\', "");

    Ok(vec![
        format!("-javaagent:{}={}", jar_path.display(), root_url),
        "-Dauthlibinjector.side=client".to_string(),
        format!("-Dauthlibinjector.yggdrasil.prefetched={prefetched}"),
    ])
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::sha256_file;

    #[tokio::test]
    async fn test_disabled_authlib_yields_no_args() {
        let engine = NetworkEngine::new();
        let settings = AuthlibSettings {
            enabled: false,
            ..Default::default()
        };
        let args = ensure_authlib_args(&engine, None, Path::new("/tmp"), &settings, false)
            .await
            .unwrap();
        assert!(args.is_empty());
    }

    #[tokio::test]
    async fn test_existing_valid_jar_builds_args() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("authlib-injector.jar");
        std::fs::write(&jar, b"jar contents").unwrap();
        let sha256 = sha256_file(&jar).unwrap();

        let engine = NetworkEngine::new();
        engine.set_healthy_hosts(vec!["auth.example".into()]);

        let settings = AuthlibSettings {
            expected_sha256: sha256,
            prefetched: "eyJh\\bGci".into(),
            ..Default::default()
        };
        let args = ensure_authlib_args(&engine, None, dir.path(), &settings, false)
            .await
            .unwrap();

        assert_eq!(args.len(), 3);
        assert!(args[0].starts_with("-javaagent:"));
        assert!(args[0].ends_with("=https://auth.example/api/yggdrasil"));
        assert_eq!(args[1], "-Dauthlibinjector.side=client");
        // Backslashes are stripped from the prefetched blob.
        assert_eq!(args[2], "-Dauthlibinjector.yggdrasil.prefetched=eyJhbGci");
    }

    #[tokio::test]
    async fn test_tolerant_mode_skips_digest_check() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("authlib-injector.jar");
        std::fs::write(&jar, b"stale contents").unwrap();

        let engine = NetworkEngine::new();
        let settings = AuthlibSettings {
            expected_sha256: "not-the-real-digest".into(),
            ..Default::default()
        };
        // Would have to re-download in strict mode; tolerant accepts the file.
        let args = ensure_authlib_args(&engine, None, dir.path(), &settings, true)
            .await
            .unwrap();
        assert_eq!(args.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_jar_downloads_and_persists_digest() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let jar_bytes = b"fresh injector".to_vec();
        let expected_sha256 = {
            let dir = tempfile::tempdir().unwrap();
            let tmp = dir.path().join("ref");
            std::fs::write(&tmp, &jar_bytes).unwrap();
            sha256_file(&tmp).unwrap()
        };

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/artifact/latest.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"{{"download_url": "{}/artifact/injector.jar", "checksums": {{"sha256": "{expected_sha256}"}}}}"#,
                server.uri(),
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/artifact/injector.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(jar_bytes.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_memory(Default::default());
        let engine = NetworkEngine::new();

        let settings = AuthlibSettings {
            index_url: Some(format!("{}/artifact/latest.json", server.uri())),
            root_url: Some("https://auth.example/api/yggdrasil".into()),
            ..Default::default()
        };
        let args = ensure_authlib_args(&engine, Some(&store), dir.path(), &settings, false)
            .await
            .unwrap();

        assert_eq!(args.len(), 3);
        let jar_path = dir.path().join("authlib-injector.jar");
        assert_eq!(sha256_file(&jar_path).unwrap(), expected_sha256);
        // The fresh digest is written back to the configuration.
        assert_eq!(
            store.get_client_config().minecraft.authlib_sha256,
            expected_sha256
        );
    }
}
