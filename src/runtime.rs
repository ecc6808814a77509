//! Process-wide resource registry
//!
//! Instead of global singletons, an explicit [`Runtime`] owns the worker
//! pool, the event bus (with its loop task), the config store and the
//! network engine, and hands out shared handles. Components receive
//! narrowly scoped clones; tests build their own runtime.

use crate::config::{ClientConfig, ConfigStore, ProxySetting};
use crate::error::Result;
use crate::events::EventBus;
use crate::launch::GameLauncher;
use crate::log_tailer::LogTailer;
use crate::net::hosts::{self, DEFAULT_HOSTS, HostConfig};
use crate::net::NetworkEngine;
use crate::pool::WorkerPool;
use std::path::PathBuf;
use std::sync::Arc;

/// Construction options for a [`Runtime`]
#[derive(Debug, Default)]
pub struct RuntimeOptions {
    /// Worker count; `None` uses the configured `[net] thread` value, or
    /// the machine's parallelism when that is zero
    pub worker_count: Option<usize>,
    /// INI file backing the config store; `None` keeps the store in memory
    pub config_path: Option<PathBuf>,
    /// Host candidates probed by [`Runtime::initialize`]; empty uses the
    /// built-in list
    pub hosts: Vec<String>,
}

/// Shared-service registry for the launcher core
pub struct Runtime {
    pool: WorkerPool,
    events: EventBus,
    config: Arc<ConfigStore>,
    network: Arc<NetworkEngine>,
    probe_hosts: Vec<String>,
    loop_handle: tokio::task::JoinHandle<()>,
}

impl Runtime {
    /// Build the registry and start the event loop
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// I/O errors from reading the configuration file.
    pub fn new(options: RuntimeOptions) -> Result<Arc<Self>> {
        let config = Arc::new(match &options.config_path {
            Some(path) => ConfigStore::load(path)?,
            None => ConfigStore::in_memory(ClientConfig::default()),
        });
        let client_config = config.get_client_config();

        let worker_count = options
            .worker_count
            .or_else(|| usize::try_from(client_config.net.thread).ok().filter(|&n| n > 0))
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            });
        let pool = WorkerPool::new(worker_count);

        let events = EventBus::new();
        let loop_handle = events.spawn_loop();

        let protocol = if client_config.dev.allow_insecure_http() {
            "http"
        } else {
            "https"
        };
        let proxy = match client_config.net.proxy_setting() {
            ProxySetting::Url(url) => hosts::validate_proxy(&url),
            // System proxies come from the environment; the client picks
            // them up without an explicit setting.
            ProxySetting::System | ProxySetting::Off => None,
        };
        let network = Arc::new(NetworkEngine::with_host_config(HostConfig {
            proxy,
            protocol: protocol.into(),
            ..HostConfig::default()
        }));

        // An explicit dev server bypasses the probe entirely.
        let dev_server = client_config.dev.server.trim();
        let probe_hosts = if client_config.dev.enable
            && !dev_server.is_empty()
            && dev_server != "auto"
        {
            let host = dev_server
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string();
            network.set_healthy_hosts(vec![host]);
            Vec::new()
        } else if options.hosts.is_empty() {
            DEFAULT_HOSTS.iter().map(|h| h.to_string()).collect()
        } else {
            options.hosts
        };

        Ok(Arc::new(Self {
            pool,
            events,
            config,
            network,
            probe_hosts,
            loop_handle,
        }))
    }

    /// Probe the host list and publish the healthy subset
    ///
    /// A no-op when an explicit dev server was configured.
    pub async fn initialize(&self) {
        if self.probe_hosts.is_empty() {
            return;
        }
        let healthy = hosts::probe_hosts(&self.network, &self.probe_hosts).await;
        tracing::info!(healthy = healthy.len(), "host probe finished");
    }

    /// The shared worker pool
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// The shared event bus
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The shared config store
    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    /// The shared network engine
    pub fn network(&self) -> &Arc<NetworkEngine> {
        &self.network
    }

    /// A launch pipeline wired to this runtime's services
    pub fn game_launcher(&self) -> GameLauncher {
        GameLauncher::new(self.network.clone(), self.events.clone())
            .with_config_store(self.config.clone())
    }

    /// A log tailer publishing into this runtime's bus
    pub fn log_tailer(&self) -> LogTailer {
        LogTailer::new(self.events.clone())
    }

    /// Stop the loop and the pool, waiting for in-flight work
    pub async fn shutdown(&self) {
        tracing::info!("runtime shutting down");
        self.events.stop();
        self.pool.stop(true).await;
        self.loop_handle.abort();
    }
}
