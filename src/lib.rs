//! # neko-launcher
//!
//! Core library for a desktop game launcher: it maintains the launcher
//! configuration, talks to the launcher's backend (maintenance notices,
//! news, update manifests), downloads and verifies game assets, builds and
//! spawns the game command line, and reactively plays background music
//! driven by the game's textual output.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - no CLI or GUI; the desktop shell consumes this crate
//! - **Event-driven** - process output, log lines and music state flow
//!   through one typed event bus
//! - **Explicit wiring** - a [`runtime::Runtime`] owns the shared services;
//!   there are no process-wide globals, and tests build their own runtime
//! - **Fails loudly, recovers locally** - downloads retry, corrupt files
//!   re-fetch, handler panics are counted, and everything else surfaces as
//!   a typed [`error::Error`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use neko_launcher::launch::LaunchConfig;
//! use neko_launcher::runtime::{Runtime, RuntimeOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = Runtime::new(RuntimeOptions {
//!         config_path: Some("config.ini".into()),
//!         ..Default::default()
//!     })?;
//!
//!     // Probe the API hosts, then launch with the persisted settings.
//!     runtime.initialize().await;
//!     let cfg = LaunchConfig::from_client_config(&runtime.config().get_client_config());
//!     let game = runtime.game_launcher().launch(&cfg).await?;
//!     let code = game.wait().await?;
//!     println!("game exited with {code:?}");
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Server API payloads and fetch operations
pub mod api;
/// Background-music engine driven by game output
pub mod bgm;
/// Launcher configuration and the config store
pub mod config;
/// Error types
pub mod error;
/// Typed event bus with timers and a cooperative run loop
pub mod events;
/// Game launch pipeline (manifest, rules, assets, command, process)
pub mod launch;
/// Log file tailer
pub mod log_tailer;
/// Network engine: requests, retries, segmented downloads, host probing
pub mod net;
/// Prioritised worker pool
pub mod pool;
/// Process-wide resource registry
pub mod runtime;
/// Core ids, priorities and event payloads
pub mod types;
/// Shared utility functions
pub mod util;

// Re-export commonly used types
pub use bgm::{BgmConfig, BgmEngine, BgmTrigger};
pub use config::{ClientConfig, ConfigStore};
pub use error::{Error, Result};
pub use events::{Event, EventBus, EventStats};
pub use launch::{GameLauncher, LaunchConfig, LaunchPhase};
pub use log_tailer::LogTailer;
pub use net::{
    HostConfig, MultiDownloadConfig, NetworkEngine, RequestConfig, RequestResult, RetryPolicy,
    SegmentApproach,
};
pub use pool::{TaskHandle, TaskStats, WorkerPool};
pub use runtime::{Runtime, RuntimeOptions};
pub use types::{BgmState, DispatchMode, EventId, EventKind, EventPayload, HandlerId, Priority,
    TaskId, WorkerId};

/// Product name used in user agents and command placeholders
pub const LAUNCHER_NAME: &str = "NekoLauncher";

/// Core library version
pub const LAUNCHER_VERSION: &str = env!("CARGO_PKG_VERSION");
