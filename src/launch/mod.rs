//! Game launch pipeline
//!
//! Turns a [`LaunchConfig`] and an installed version into a running game
//! process: manifest resolution, rule-filtered library repair, native
//! extraction, classpath and argument assembly, authlib provisioning, and
//! the final spawn with output streamed into the event bus.
//!
//! A launch attempt moves through the phases `Idle → Validating →
//! Downloading → Installing → Assembling → Spawned → Exited`. A validation
//! error is fatal; an integrity error during download is fatal unless
//! tolerant mode is set, which skips the affected libraries instead.

pub mod assets;
pub mod authlib;
pub mod command;
pub mod manifest;
pub mod process;
pub mod rules;

pub use assets::{AssetDescriptor, PreparedLibraries};
pub use authlib::AuthlibSettings;
pub use manifest::VersionManifest;
pub use process::{GameProcess, LaunchCommand, ProcessRunner};
pub use rules::RuleContext;

use crate::config::{ClientConfig, ConfigStore};
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::net::NetworkEngine;
use crate::types::{EventKind, EventPayload};
use crate::{LAUNCHER_NAME, LAUNCHER_VERSION};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Memory limits of a launch, in GiB
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryPolicy {
    /// `-Xms` floor
    pub min_gib: u64,
    /// `-Xmx` ceiling
    pub max_gib: u64,
    /// Minimum installed memory to allow a launch
    pub required_gib: u64,
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            min_gib: 2,
            max_gib: 8,
            required_gib: 4,
        }
    }
}

/// Everything a launch attempt needs from the user configuration
#[derive(Clone, Debug)]
pub struct LaunchConfig {
    /// Game directory (absolute, or relative to the working directory)
    pub game_dir: PathBuf,
    /// Java executable; `None` discovers `java` on `PATH`
    pub java_path: Option<PathBuf>,
    /// Version to launch; `None` picks the installed version
    pub version: Option<String>,
    /// Player display name
    pub player_name: String,
    /// Player UUID
    pub uuid: String,
    /// Session access token
    pub access_token: String,
    /// Server address appended as `--server`, or empty
    pub join_server_address: String,
    /// Server port appended as `--port`, or empty
    pub join_server_port: String,
    /// Memory limits
    pub memory: MemoryPolicy,
    /// Launch as demo user
    pub demo: bool,
    /// Custom resolution, when configured
    pub resolution: Option<(u32, u32)>,
    /// Authlib-injector settings
    pub authlib: AuthlibSettings,
    /// Demote integrity and rule-parse errors to warnings
    pub tolerant: bool,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            game_dir: PathBuf::from(".minecraft"),
            java_path: None,
            version: None,
            player_name: String::new(),
            uuid: String::new(),
            access_token: String::new(),
            join_server_address: String::new(),
            join_server_port: String::new(),
            memory: MemoryPolicy::default(),
            demo: false,
            resolution: None,
            authlib: AuthlibSettings::default(),
            tolerant: false,
        }
    }
}

impl LaunchConfig {
    /// Derive a launch configuration from the persisted client configuration
    pub fn from_client_config(config: &ClientConfig) -> Self {
        let mc = &config.minecraft;
        Self {
            game_dir: PathBuf::from(&mc.minecraft_folder),
            java_path: if mc.java_path.is_empty() {
                None
            } else {
                Some(PathBuf::from(&mc.java_path))
            },
            version: if mc.target_version.is_empty() {
                None
            } else {
                Some(mc.target_version.clone())
            },
            player_name: mc.player_name.clone(),
            uuid: mc.uuid.clone(),
            access_token: mc.access_token.clone(),
            join_server_address: mc.join_server_address.clone(),
            join_server_port: mc.join_server_port.clone(),
            memory: MemoryPolicy {
                min_gib: mc.min_memory_limit,
                max_gib: mc.max_memory_limit,
                required_gib: mc.need_memory_limit,
            },
            demo: false,
            resolution: ClientConfig::parse_resolution(&mc.custom_resolution),
            authlib: AuthlibSettings {
                enabled: true,
                name: mc.authlib_name.clone(),
                expected_sha256: mc.authlib_sha256.clone(),
                prefetched: mc.authlib_prefetched.clone(),
                root_url: None,
                index_url: None,
            },
            tolerant: mc.tolerant_mode,
        }
    }
}

/// Phase of the current (or last) launch attempt
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LaunchPhase {
    /// No attempt in progress
    #[default]
    Idle,
    /// Resolving the manifest and the Java binary
    Validating,
    /// Verifying and repairing libraries
    Downloading,
    /// Extracting natives
    Installing,
    /// Expanding arguments and building the command
    Assembling,
    /// The game process is running
    Spawned,
    /// The game process exited with this code
    Exited(Option<i32>),
}

/// The launch pipeline facade
#[derive(Clone)]
pub struct GameLauncher {
    engine: Arc<NetworkEngine>,
    bus: EventBus,
    store: Option<Arc<ConfigStore>>,
    phase: Arc<Mutex<LaunchPhase>>,
}

impl GameLauncher {
    /// Create a launcher publishing process events into `bus`
    pub fn new(engine: Arc<NetworkEngine>, bus: EventBus) -> Self {
        let phase = Arc::new(Mutex::new(LaunchPhase::Idle));
        let phase_for_exit = phase.clone();
        bus.subscribe(EventKind::ProcessExited, move |event| {
            if let EventPayload::ProcessExited { code } = event.payload {
                *phase_for_exit.lock().unwrap_or_else(|e| e.into_inner()) =
                    LaunchPhase::Exited(code);
            }
        });
        Self {
            engine,
            bus,
            store: None,
            phase,
        }
    }

    /// Persist authlib digests through this store
    pub fn with_config_store(mut self, store: Arc<ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Phase of the current launch attempt
    pub fn phase(&self) -> LaunchPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: LaunchPhase) {
        tracing::debug!(?phase, "launch phase");
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    /// Build the full launch command without spawning
    ///
    /// # Errors
    /// Every validation, integrity and assembly error of the pipeline; see
    /// the module docs for which are demoted in tolerant mode.
    pub async fn build_launch_command(&self, cfg: &LaunchConfig) -> Result<LaunchCommand> {
        self.set_phase(LaunchPhase::Validating);

        let game_dir = absolute_path(&cfg.game_dir)?;
        let versions_dir = game_dir.join("versions");
        let version = match &cfg.version {
            Some(version) if !version.is_empty() => version.clone(),
            _ => detect_installed_version(&versions_dir)?,
        };
        tracing::info!(version = %version, "building launch command");

        let version_dir = versions_dir.join(&version);
        let manifest = VersionManifest::load(&version_dir.join(format!("{version}.json")))?;
        let asset_index_id = manifest.asset_index_id()?.to_string();
        let java = resolve_java(cfg.java_path.as_deref())?;
        let ctx = RuleContext::for_current_system(
            cfg.demo,
            cfg.resolution.is_some(),
            cfg.tolerant,
        );

        self.set_phase(LaunchPhase::Downloading);
        let prepared = assets::prepare_libraries(&self.engine, &manifest, &game_dir, &ctx).await?;

        self.set_phase(LaunchPhase::Installing);
        let temp_override = self
            .store
            .as_ref()
            .map(|store| store.get_client_config().other.temp_folder)
            .filter(|folder| !folder.is_empty());
        let mut builder = tempfile::Builder::new();
        builder.prefix("NekoLc_natives_");
        let natives_dir = match temp_override {
            Some(folder) => builder.tempdir_in(folder)?,
            None => builder.tempdir()?,
        };
        for archive in &prepared.native_archives {
            let archive = archive.clone();
            let dest = natives_dir.path().to_path_buf();
            let extraction =
                tokio::task::spawn_blocking(move || assets::extract_natives(&archive, &dest))
                    .await
                    .map_err(|e| Error::InvalidArgument(format!("extraction task failed: {e}")))?;
            if let Err(e) = extraction {
                if !cfg.tolerant {
                    return Err(e);
                }
                tracing::error!(error = %e, "native extraction failed, continuing");
            }
        }

        self.set_phase(LaunchPhase::Assembling);
        let jar_base = if manifest.jar.is_empty() {
            version.clone()
        } else {
            manifest.jar.clone()
        };
        let client_jar = version_dir.join(format!("{jar_base}.jar"));
        let classpath = command::build_classpath(&prepared.classpath, &client_jar);

        let mut jvm_args = command::expand_arguments(&manifest.arguments.jvm, &ctx)?;
        let mut game_args = command::expand_arguments(&manifest.arguments.game, &ctx)?;

        let natives_path = natives_dir.path().to_string_lossy().into_owned();
        let libraries_path = game_dir.join("libraries").to_string_lossy().into_owned();
        let jvm_table: Vec<(String, String)> = vec![
            ("${natives_directory}".into(), natives_path),
            ("${library_directory}".into(), libraries_path),
            ("${launcher_name}".into(), LAUNCHER_NAME.into()),
            ("${launcher_version}".into(), LAUNCHER_VERSION.into()),
            ("${classpath}".into(), classpath),
        ];
        command::apply_placeholders(&mut jvm_args, &jvm_table);

        let mut game_table: Vec<(String, String)> = vec![
            ("${auth_player_name}".into(), cfg.player_name.clone()),
            ("${version_name}".into(), LAUNCHER_NAME.into()),
            ("${game_directory}".into(), game_dir.to_string_lossy().into_owned()),
            (
                "${assets_root}".into(),
                game_dir.join("assets").to_string_lossy().into_owned(),
            ),
            ("${assets_index_name}".into(), asset_index_id),
            ("${auth_uuid}".into(), cfg.uuid.clone()),
            ("${auth_access_token}".into(), cfg.access_token.clone()),
            ("${user_type}".into(), "mojang".into()),
            ("${version_type}".into(), LAUNCHER_NAME.into()),
        ];
        if let Some((width, height)) = cfg.resolution {
            game_table.push(("${resolution_width}".into(), width.to_string()));
            game_table.push(("${resolution_height}".into(), height.to_string()));
        }
        command::apply_placeholders(&mut game_args, &game_table);

        let (xms, xmx) = command::memory_flags(
            cfg.memory.min_gib,
            cfg.memory.max_gib,
            cfg.memory.required_gib,
            command::total_system_memory(),
        )?;

        command::append_join_server(
            &mut game_args,
            &cfg.join_server_address,
            &cfg.join_server_port,
        );

        let authlib_args = authlib::ensure_authlib_args(
            &self.engine,
            self.store.as_deref(),
            &game_dir,
            &cfg.authlib,
            cfg.tolerant,
        )
        .await?;

        let mut args: Vec<String> = command::JVM_OPTIMIZE_FLAGS
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(xms);
        args.push(xmx);
        args.extend(jvm_args);
        args.extend(authlib_args);
        args.push(manifest.main_class().to_string());
        args.extend(game_args);

        Ok(LaunchCommand {
            program: java,
            args,
            working_dir: game_dir,
            access_token: cfg.access_token.clone(),
            natives_dir: Some(natives_dir),
        })
    }

    /// Build the command and spawn the game
    ///
    /// # Errors
    /// Pipeline errors from [`GameLauncher::build_launch_command`] plus
    /// [`Error::ProcessSpawnFailed`].
    pub async fn launch(&self, cfg: &LaunchConfig) -> Result<GameProcess> {
        let command = self.build_launch_command(cfg).await?;
        self.set_phase(LaunchPhase::Spawned);
        let runner = ProcessRunner::new(self.bus.clone());
        runner.spawn(command)
    }
}

fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn detect_installed_version(versions_dir: &Path) -> Result<String> {
    let entries = std::fs::read_dir(versions_dir).map_err(|e| Error::ManifestInvalid {
        path: versions_dir.to_path_buf(),
        reason: e.to_string(),
    })?;
    for entry in entries.flatten() {
        if entry.path().is_dir() {
            return Ok(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Err(Error::InvalidArgument(format!(
        "no installed version found under {}",
        versions_dir.display()
    )))
}

fn resolve_java(configured: Option<&Path>) -> Result<PathBuf> {
    match configured {
        Some(path) => Ok(path.to_path_buf()),
        None => which::which("java")
            .map_err(|e| Error::InvalidArgument(format!("java executable not found: {e}"))),
    }
}
