//! Launcher configuration and the thread-safe config store
//!
//! The launcher persists its settings as an INI file with a fixed set of
//! sections and keys. [`ClientConfig`] models those sections as owned typed
//! structs; [`ConfigStore`] guards a shared snapshot behind a reader-writer
//! lock and exposes an atomic read-modify-write through
//! [`ConfigStore::update_client_config`].
//!
//! Every string is owned: nothing in the store borrows parser-held memory,
//! so a reload can never dangle a previously handed-out value.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

/// `[main]` section: shell appearance and identity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MainSection {
    /// UI language tag (e.g. `en`)
    pub language: String,
    /// Background kind (`image` or `video`)
    pub background_type: String,
    /// Background resource path
    pub background: String,
    /// Persisted window geometry, `WxH` or empty
    pub window_size: String,
    /// Launch behaviour selector (keep window, minimize, close)
    pub launcher_method: i64,
    /// Use the system-provided window frame
    pub use_system_window_frame: bool,
    /// Keep the head bar controls on the right edge
    pub head_bar_keep_right: bool,
    /// Installed resource-pack version
    pub resource_version: String,
    /// Stable per-installation device identifier
    pub device_id: String,
}

impl Default for MainSection {
    fn default() -> Self {
        Self {
            language: "en".into(),
            background_type: "image".into(),
            background: "img/bg.png".into(),
            window_size: String::new(),
            launcher_method: 1,
            use_system_window_frame: true,
            head_bar_keep_right: true,
            resource_version: String::new(),
            device_id: String::new(),
        }
    }
}

/// `[style]` section: fonts and effects
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StyleSection {
    /// Background blur mode
    pub blur_effect: i64,
    /// Blur radius in pixels
    pub blur_radius: i64,
    /// Base font size in points
    pub font_point_size: i64,
    /// Comma-separated font family list
    pub font_families: String,
    /// Theme name
    pub theme: String,
}

impl Default for StyleSection {
    fn default() -> Self {
        Self {
            blur_effect: 1,
            blur_radius: 10,
            font_point_size: 10,
            font_families: String::new(),
            theme: "dark".into(),
        }
    }
}

/// How the `[net] proxy` value should be applied
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProxySetting {
    /// Use the system proxy (`proxy = true`)
    System,
    /// Use an explicit proxy URL
    Url(String),
    /// No proxy
    Off,
}

/// `[net]` section: transfer tuning
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetSection {
    /// Worker threads for transfers; 0 means hardware concurrency
    pub thread: i64,
    /// `"true"` for the system proxy, a proxy URL, or empty for none
    pub proxy: String,
}

impl NetSection {
    /// Interpret the raw proxy value
    pub fn proxy_setting(&self) -> ProxySetting {
        match self.proxy.trim() {
            "" => ProxySetting::Off,
            "true" => ProxySetting::System,
            url => ProxySetting::Url(url.to_string()),
        }
    }
}

impl Default for NetSection {
    fn default() -> Self {
        Self {
            thread: 0,
            proxy: "true".into(),
        }
    }
}

/// `[dev]` section: developer overrides
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DevSection {
    /// Developer mode master switch
    pub enable: bool,
    /// Verbose logging
    pub debug: bool,
    /// `"auto"` for the probed host list, or an explicit server URL
    pub server: String,
    /// Require TLS even in developer mode
    pub tls: bool,
}

impl DevSection {
    /// Plain HTTP is only honoured in developer mode with TLS waived
    pub fn allow_insecure_http(&self) -> bool {
        self.enable && !self.tls
    }
}

impl Default for DevSection {
    fn default() -> Self {
        Self {
            enable: false,
            debug: false,
            server: "auto".into(),
            tls: true,
        }
    }
}

/// `[other]` section
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OtherSection {
    /// Override for the temp directory; empty means the OS default
    pub temp_folder: String,
}

/// `[minecraft]` section: game installation and identity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MinecraftSection {
    /// Game directory, absolute or relative to the launcher
    pub minecraft_folder: String,
    /// Java executable; empty means discover from `PATH`
    pub java_path: String,
    /// Asset download source selector
    pub download_source: String,
    /// Display name used in-game
    pub player_name: String,
    /// Account identifier
    pub account: String,
    /// Player UUID
    pub uuid: String,
    /// Session access token
    pub access_token: String,
    /// Version to launch; empty means the only installed version
    pub target_version: String,
    /// `-Xmx` ceiling in GiB
    pub max_memory_limit: u64,
    /// `-Xms` floor in GiB
    pub min_memory_limit: u64,
    /// Minimum installed memory to allow a launch, in GiB
    pub need_memory_limit: u64,
    /// File name of the authlib-injector JAR inside the game directory
    pub authlib_name: String,
    /// Prefetched yggdrasil metadata blob
    pub authlib_prefetched: String,
    /// Expected SHA-256 of the injector JAR
    pub authlib_sha256: String,
    /// Demote integrity and rule-parse errors to warnings
    pub tolerant_mode: bool,
    /// `WxH` custom resolution, or empty
    pub custom_resolution: String,
    /// Server address appended as `--server`, or empty
    pub join_server_address: String,
    /// Server port appended as `--port`, or empty
    pub join_server_port: String,
}

impl Default for MinecraftSection {
    fn default() -> Self {
        Self {
            minecraft_folder: ".minecraft".into(),
            java_path: String::new(),
            download_source: "Official".into(),
            player_name: String::new(),
            account: String::new(),
            uuid: String::new(),
            access_token: String::new(),
            target_version: String::new(),
            max_memory_limit: 8,
            min_memory_limit: 2,
            need_memory_limit: 4,
            authlib_name: "authlib-injector.jar".into(),
            authlib_prefetched: String::new(),
            authlib_sha256: String::new(),
            tolerant_mode: false,
            custom_resolution: String::new(),
            join_server_address: String::new(),
            join_server_port: String::new(),
        }
    }
}

/// The full persisted launcher configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// `[main]` section
    pub main: MainSection,
    /// `[style]` section
    pub style: StyleSection,
    /// `[net]` section
    pub net: NetSection,
    /// `[dev]` section
    pub dev: DevSection,
    /// `[other]` section
    pub other: OtherSection,
    /// `[minecraft]` section
    pub minecraft: MinecraftSection,
}

type IniMap = HashMap<String, HashMap<String, String>>;

fn parse_ini(text: &str) -> IniMap {
    let mut map: IniMap = HashMap::new();
    let mut section = String::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.trim().to_string();
            map.entry(section.clone()).or_default();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            map.entry(section.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    map
}

fn get_str(map: &IniMap, section: &str, key: &str, default: &str) -> String {
    map.get(section)
        .and_then(|s| s.get(key))
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

fn get_bool(map: &IniMap, section: &str, key: &str, default: bool) -> bool {
    map.get(section)
        .and_then(|s| s.get(key))
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(default)
}

fn get_i64(map: &IniMap, section: &str, key: &str, default: i64) -> i64 {
    map.get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_u64(map: &IniMap, section: &str, key: &str, default: u64) -> u64 {
    map.get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ClientConfig {
    /// Parse an INI document; missing keys take their defaults
    pub fn from_ini(text: &str) -> Self {
        let map = parse_ini(text);
        let d = Self::default();
        Self {
            main: MainSection {
                language: get_str(&map, "main", "language", &d.main.language),
                background_type: get_str(&map, "main", "backgroundType", &d.main.background_type),
                background: get_str(&map, "main", "background", &d.main.background),
                window_size: get_str(&map, "main", "windowSize", &d.main.window_size),
                launcher_method: get_i64(&map, "main", "launcherMethod", d.main.launcher_method),
                use_system_window_frame: get_bool(
                    &map,
                    "main",
                    "useSystemWindowFrame",
                    d.main.use_system_window_frame,
                ),
                head_bar_keep_right: get_bool(
                    &map,
                    "main",
                    "headBarKeepRight",
                    d.main.head_bar_keep_right,
                ),
                resource_version: get_str(&map, "main", "resourceVersion", &d.main.resource_version),
                device_id: get_str(&map, "main", "deviceID", &d.main.device_id),
            },
            style: StyleSection {
                blur_effect: get_i64(&map, "style", "blurEffect", d.style.blur_effect),
                blur_radius: get_i64(&map, "style", "blurRadius", d.style.blur_radius),
                font_point_size: get_i64(&map, "style", "fontPointSize", d.style.font_point_size),
                font_families: get_str(&map, "style", "fontFamilies", &d.style.font_families),
                theme: get_str(&map, "style", "theme", &d.style.theme),
            },
            net: NetSection {
                thread: get_i64(&map, "net", "thread", d.net.thread),
                proxy: get_str(&map, "net", "proxy", &d.net.proxy),
            },
            dev: DevSection {
                enable: get_bool(&map, "dev", "enable", d.dev.enable),
                debug: get_bool(&map, "dev", "debug", d.dev.debug),
                server: get_str(&map, "dev", "server", &d.dev.server),
                tls: get_bool(&map, "dev", "tls", d.dev.tls),
            },
            other: OtherSection {
                temp_folder: get_str(&map, "other", "tempFolder", &d.other.temp_folder),
            },
            minecraft: MinecraftSection {
                minecraft_folder: get_str(
                    &map,
                    "minecraft",
                    "minecraftFolder",
                    &d.minecraft.minecraft_folder,
                ),
                java_path: get_str(&map, "minecraft", "javaPath", &d.minecraft.java_path),
                download_source: get_str(
                    &map,
                    "minecraft",
                    "downloadSource",
                    &d.minecraft.download_source,
                ),
                player_name: get_str(&map, "minecraft", "playerName", &d.minecraft.player_name),
                account: get_str(&map, "minecraft", "account", &d.minecraft.account),
                uuid: get_str(&map, "minecraft", "uuid", &d.minecraft.uuid),
                access_token: get_str(&map, "minecraft", "accessToken", &d.minecraft.access_token),
                target_version: get_str(
                    &map,
                    "minecraft",
                    "targetVersion",
                    &d.minecraft.target_version,
                ),
                max_memory_limit: get_u64(
                    &map,
                    "minecraft",
                    "maxMemoryLimit",
                    d.minecraft.max_memory_limit,
                ),
                min_memory_limit: get_u64(
                    &map,
                    "minecraft",
                    "minMemoryLimit",
                    d.minecraft.min_memory_limit,
                ),
                need_memory_limit: get_u64(
                    &map,
                    "minecraft",
                    "needMemoryLimit",
                    d.minecraft.need_memory_limit,
                ),
                authlib_name: get_str(&map, "minecraft", "authlibName", &d.minecraft.authlib_name),
                authlib_prefetched: get_str(
                    &map,
                    "minecraft",
                    "authlibPrefetched",
                    &d.minecraft.authlib_prefetched,
                ),
                authlib_sha256: get_str(
                    &map,
                    "minecraft",
                    "authlibSha256",
                    &d.minecraft.authlib_sha256,
                ),
                tolerant_mode: get_bool(
                    &map,
                    "minecraft",
                    "tolerantMode",
                    d.minecraft.tolerant_mode,
                ),
                custom_resolution: get_str(
                    &map,
                    "minecraft",
                    "customResolution",
                    &d.minecraft.custom_resolution,
                ),
                join_server_address: get_str(
                    &map,
                    "minecraft",
                    "joinServerAddress",
                    &d.minecraft.join_server_address,
                ),
                join_server_port: get_str(
                    &map,
                    "minecraft",
                    "joinServerPort",
                    &d.minecraft.join_server_port,
                ),
            },
        }
    }

    /// Render the configuration as an INI document
    pub fn to_ini_string(&self) -> String {
        let mut out = String::new();
        out.push_str("[main]\n");
        out.push_str(&format!("language={}\n", self.main.language));
        out.push_str(&format!("backgroundType={}\n", self.main.background_type));
        out.push_str(&format!("background={}\n", self.main.background));
        out.push_str(&format!("windowSize={}\n", self.main.window_size));
        out.push_str(&format!("launcherMethod={}\n", self.main.launcher_method));
        out.push_str(&format!(
            "useSystemWindowFrame={}\n",
            self.main.use_system_window_frame
        ));
        out.push_str(&format!(
            "headBarKeepRight={}\n",
            self.main.head_bar_keep_right
        ));
        out.push_str(&format!("resourceVersion={}\n", self.main.resource_version));
        out.push_str(&format!("deviceID={}\n", self.main.device_id));

        out.push_str("\n[style]\n");
        out.push_str(&format!("blurEffect={}\n", self.style.blur_effect));
        out.push_str(&format!("blurRadius={}\n", self.style.blur_radius));
        out.push_str(&format!("fontPointSize={}\n", self.style.font_point_size));
        out.push_str(&format!("fontFamilies={}\n", self.style.font_families));
        out.push_str(&format!("theme={}\n", self.style.theme));

        out.push_str("\n[net]\n");
        out.push_str(&format!("thread={}\n", self.net.thread));
        out.push_str(&format!("proxy={}\n", self.net.proxy));

        out.push_str("\n[dev]\n");
        out.push_str(&format!("enable={}\n", self.dev.enable));
        out.push_str(&format!("debug={}\n", self.dev.debug));
        out.push_str(&format!("server={}\n", self.dev.server));
        out.push_str(&format!("tls={}\n", self.dev.tls));

        out.push_str("\n[other]\n");
        out.push_str(&format!("tempFolder={}\n", self.other.temp_folder));

        out.push_str("\n[minecraft]\n");
        let mc = &self.minecraft;
        out.push_str(&format!("minecraftFolder={}\n", mc.minecraft_folder));
        out.push_str(&format!("javaPath={}\n", mc.java_path));
        out.push_str(&format!("downloadSource={}\n", mc.download_source));
        out.push_str(&format!("playerName={}\n", mc.player_name));
        out.push_str(&format!("account={}\n", mc.account));
        out.push_str(&format!("uuid={}\n", mc.uuid));
        out.push_str(&format!("accessToken={}\n", mc.access_token));
        out.push_str(&format!("targetVersion={}\n", mc.target_version));
        out.push_str(&format!("maxMemoryLimit={}\n", mc.max_memory_limit));
        out.push_str(&format!("minMemoryLimit={}\n", mc.min_memory_limit));
        out.push_str(&format!("needMemoryLimit={}\n", mc.need_memory_limit));
        out.push_str(&format!("authlibName={}\n", mc.authlib_name));
        out.push_str(&format!("authlibPrefetched={}\n", mc.authlib_prefetched));
        out.push_str(&format!("authlibSha256={}\n", mc.authlib_sha256));
        out.push_str(&format!("tolerantMode={}\n", mc.tolerant_mode));
        out.push_str(&format!("customResolution={}\n", mc.custom_resolution));
        out.push_str(&format!("joinServerAddress={}\n", mc.join_server_address));
        out.push_str(&format!("joinServerPort={}\n", mc.join_server_port));
        out
    }

    /// Parse a `WxH` resolution string such as `1920x1080`
    pub fn parse_resolution(value: &str) -> Option<(u32, u32)> {
        let (w, h) = value.trim().split_once(['x', 'X'])?;
        Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
    }
}

/// Thread-safe accessor over the persisted launcher configuration
///
/// Reads return owned snapshots. [`ConfigStore::update_client_config`] holds
/// the write lock across the read-modify-write-persist cycle, so concurrent
/// updates never interleave.
pub struct ConfigStore {
    path: Mutex<Option<PathBuf>>,
    inner: RwLock<ClientConfig>,
}

impl ConfigStore {
    /// Create a store with the given configuration and no backing file
    pub fn in_memory(config: ClientConfig) -> Self {
        Self {
            path: Mutex::new(None),
            inner: RwLock::new(config),
        }
    }

    /// Load a store from an INI file
    ///
    /// A missing file yields the default configuration; the path is
    /// remembered so the first save creates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let config = match std::fs::read_to_string(&path) {
            Ok(text) => ClientConfig::from_ini(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ClientConfig::default(),
            Err(e) => return Err(Error::Io(e)),
        };
        Ok(Self {
            path: Mutex::new(Some(path)),
            inner: RwLock::new(config),
        })
    }

    /// Owned snapshot of the current configuration
    pub fn get_client_config(&self) -> ClientConfig {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Atomically read, modify and persist the configuration
    ///
    /// # Errors
    /// Returns the I/O error if persisting to the backing file fails; the
    /// in-memory update is kept either way.
    pub fn update_client_config<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut ClientConfig),
    {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot)
    }

    /// Persist the current configuration to the backing file, if any
    pub fn save(&self) -> Result<()> {
        let snapshot = self.get_client_config();
        self.persist(&snapshot)
    }

    fn persist(&self, config: &ClientConfig) -> Result<()> {
        let path = self.path.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(path) = path {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(&path, config.to_ini_string())?;
            tracing::debug!(path = %path.display(), "configuration saved");
        }
        Ok(())
    }
}
