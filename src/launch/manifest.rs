//! Version-manifest model
//!
//! The manifest is the JSON document under
//! `<gameDir>/versions/<version>/<version>.json` describing how to launch a
//! version: main class, asset index, argument lists and libraries. Every
//! field defaults when absent; arguments are either literal strings or
//! rule-conditioned objects whose value is a string or an array.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Fallback main class when the manifest omits one
pub const DEFAULT_MAIN_CLASS: &str = "net.minecraft.client.main.Main";

/// Parsed version manifest
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VersionManifest {
    /// Java main class
    pub main_class: String,
    /// Client JAR base name; empty means the version name
    pub jar: String,
    /// Asset index reference
    pub asset_index: AssetIndexRef,
    /// JVM and game argument lists
    pub arguments: Arguments,
    /// Libraries to place on the classpath
    pub libraries: Vec<Library>,
}

impl VersionManifest {
    /// Load and parse a manifest file
    ///
    /// # Errors
    /// [`Error::ManifestInvalid`] when the file is missing, unreadable or
    /// not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::ManifestInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| Error::ManifestInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// The main class, falling back to the standard client entry point
    pub fn main_class(&self) -> &str {
        if self.main_class.is_empty() {
            DEFAULT_MAIN_CLASS
        } else {
            &self.main_class
        }
    }

    /// The asset index id
    ///
    /// # Errors
    /// [`Error::ManifestKeyMissing`] when the manifest has no asset index.
    pub fn asset_index_id(&self) -> Result<&str> {
        if self.asset_index.id.is_empty() {
            return Err(Error::ManifestKeyMissing {
                key: "assetIndex.id".into(),
            });
        }
        Ok(&self.asset_index.id)
    }
}

/// Reference to the asset index document
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetIndexRef {
    /// Index id (e.g. `1.16`)
    pub id: String,
    /// Index URL
    pub url: String,
}

/// JVM and game argument lists
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Arguments {
    /// JVM arguments
    pub jvm: Vec<ArgumentEntry>,
    /// Game arguments
    pub game: Vec<ArgumentEntry>,
}

/// One entry of an argument list
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentEntry {
    /// A literal argument, always included
    Literal(String),
    /// A value guarded by rules
    Conditional(ConditionalArgument),
}

/// A rule-conditioned argument value
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionalArgument {
    /// The argument text, single or multiple
    pub value: ArgumentValue,
    /// Rules deciding inclusion; empty means included
    pub rules: Vec<Rule>,
}

impl Default for ConditionalArgument {
    fn default() -> Self {
        Self {
            value: ArgumentValue::One(String::new()),
            rules: Vec::new(),
        }
    }
}

/// A conditional argument's value
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    /// A single argument
    One(String),
    /// Several arguments appended in order
    Many(Vec<String>),
}

/// An inclusion rule
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    /// `allow` or `disallow`
    pub action: String,
    /// OS clauses; absent clauses match anything
    pub os: Option<OsRule>,
    /// Feature-flag clauses
    pub features: Option<FeatureRule>,
}

/// OS clauses of a rule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsRule {
    /// OS name (`windows`, `osx`, `linux`)
    pub name: String,
    /// Regex matched against the OS version string
    pub version: String,
    /// CPU architecture
    pub arch: String,
}

/// Feature-flag clauses of a rule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeatureRule {
    /// Requires the demo-user flag to equal this
    pub is_demo_user: Option<bool>,
    /// Requires the custom-resolution flag to equal this
    pub has_custom_resolution: Option<bool>,
}

/// One library entry
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Library {
    /// Maven coordinate `group:artifact:version`
    pub name: String,
    /// Downloadable artifacts, when the entry is repairable
    pub downloads: Option<LibraryDownloads>,
    /// OS name to classifier key, for native libraries
    pub natives: HashMap<String, String>,
    /// Inclusion rules
    pub rules: Vec<Rule>,
}

/// Downloadable artifacts of a library
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryDownloads {
    /// The main JAR
    pub artifact: Option<ArtifactRef>,
    /// Platform-specific artifacts keyed by classifier
    pub classifiers: HashMap<String, ArtifactRef>,
}

/// One downloadable artifact
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactRef {
    /// Path relative to the libraries directory
    pub path: String,
    /// Source URL
    pub url: String,
    /// Expected SHA-1, hex-encoded
    pub sha1: String,
    /// Size in bytes
    pub size: u64,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_arguments() {
        let json = r#"{
            "mainClass": "net.minecraft.client.main.Main",
            "assetIndex": {"id": "1.16", "url": "https://x/idx.json"},
            "arguments": {
                "jvm": [
                    "-cp",
                    "${classpath}",
                    {"value": "-Xss1M", "rules": [{"action": "allow", "os": {"name": "windows"}}]},
                    {"value": ["-Da=1", "-Db=2"], "rules": []}
                ],
                "game": ["--username", "${auth_player_name}"]
            },
            "libraries": []
        }"#;
        let manifest: VersionManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.main_class(), "net.minecraft.client.main.Main");
        assert_eq!(manifest.asset_index_id().unwrap(), "1.16");
        assert_eq!(manifest.arguments.jvm.len(), 4);
        match &manifest.arguments.jvm[3] {
            ArgumentEntry::Conditional(arg) => match &arg.value {
                ArgumentValue::Many(values) => assert_eq!(values.len(), 2),
                other => panic!("expected array value, got {other:?}"),
            },
            other => panic!("expected conditional, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_library_with_natives() {
        let json = r#"{
            "name": "org.lwjgl:lwjgl:3.2.2",
            "downloads": {
                "artifact": {"path": "org/lwjgl/lwjgl/3.2.2/lwjgl-3.2.2.jar", "url": "https://x/l.jar", "sha1": "ab", "size": 10},
                "classifiers": {
                    "natives-linux": {"path": "org/lwjgl/lwjgl/3.2.2/lwjgl-3.2.2-natives-linux.jar", "url": "https://x/n.jar", "sha1": "cd", "size": 20}
                }
            },
            "natives": {"linux": "natives-linux"},
            "rules": [{"action": "allow"}]
        }"#;
        let library: Library = serde_json::from_str(json).unwrap();
        assert_eq!(library.name, "org.lwjgl:lwjgl:3.2.2");
        let downloads = library.downloads.unwrap();
        assert!(downloads.artifact.is_some());
        assert!(downloads.classifiers.contains_key("natives-linux"));
        assert_eq!(library.natives.get("linux").unwrap(), "natives-linux");
    }

    #[test]
    fn test_missing_asset_index_is_reported() {
        let manifest: VersionManifest = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            manifest.asset_index_id(),
            Err(Error::ManifestKeyMissing { .. })
        ));
        assert_eq!(manifest.main_class(), DEFAULT_MAIN_CLASS);
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            VersionManifest::load(&path),
            Err(Error::ManifestInvalid { .. })
        ));
        assert!(matches!(
            VersionManifest::load(&dir.path().join("absent.json")),
            Err(Error::ManifestInvalid { .. })
        ));
    }
}
