//! Game process spawning and output streaming
//!
//! The runner spawns the assembled command with an explicit working
//! directory, reads stdout and stderr line by line, and publishes each line
//! as a [`EventPayload::ProcessOutputLine`] through the bus. Process
//! termination publishes [`EventPayload::ProcessExited`]. A detached start
//! spawns the process without tracking it and emits no events.

use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::types::{EventPayload, OutputSource};
use crate::util::quote_join;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;

/// The assembled launch command
///
/// Holds the per-launch natives directory alive: dropping the command (or
/// the [`GameProcess`] it was spawned into) removes the extracted natives.
#[derive(Debug)]
pub struct LaunchCommand {
    /// Java executable
    pub program: PathBuf,
    /// Arguments, in final order
    pub args: Vec<String>,
    /// Working directory for the game process
    pub working_dir: PathBuf,
    /// Access token for redaction in logs and display output
    pub access_token: String,
    /// Scratch directory holding extracted natives for this launch
    pub natives_dir: Option<tempfile::TempDir>,
}

impl LaunchCommand {
    /// All tokens, program first
    pub fn tokens(&self) -> Vec<String> {
        let mut tokens = Vec::with_capacity(self.args.len() + 1);
        tokens.push(self.program.to_string_lossy().into_owned());
        tokens.extend(self.args.iter().cloned());
        tokens
    }

    /// The command as one quoted string with the access token redacted
    pub fn display_string(&self) -> String {
        let mut tokens = self.tokens();
        if !self.access_token.is_empty() {
            for token in &mut tokens {
                if token.contains(&self.access_token) {
                    *token = token.replace(&self.access_token, "***********");
                }
            }
        }
        quote_join(&tokens)
    }
}

/// A running game process
#[derive(Debug)]
pub struct GameProcess {
    /// OS process id, when the platform reports one
    pub pid: Option<u32>,
    exited: oneshot::Receiver<Option<i32>>,
}

impl GameProcess {
    /// Wait for the process to exit and return its code
    ///
    /// # Errors
    /// [`Error::ProcessSpawnFailed`] if the watcher task was lost before an
    /// exit status arrived.
    pub async fn wait(self) -> Result<Option<i32>> {
        self.exited.await.map_err(|_| Error::ProcessSpawnFailed {
            reason: "process watcher ended without an exit status".into(),
        })
    }
}

/// Spawns game processes and streams their output into the event bus
#[derive(Clone)]
pub struct ProcessRunner {
    bus: EventBus,
}

impl ProcessRunner {
    /// Create a runner publishing into `bus`
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Spawn the command and stream its output
    ///
    /// Each stdout/stderr line publishes a `ProcessOutputLine` event; exit
    /// publishes `ProcessExited`. The command's natives directory stays
    /// alive until the process exits.
    ///
    /// # Errors
    /// [`Error::ProcessSpawnFailed`] when the OS refuses the spawn.
    pub fn spawn(&self, mut command: LaunchCommand) -> Result<GameProcess> {
        tracing::info!(
            command = %command.display_string(),
            working_dir = %command.working_dir.display(),
            "spawning game process"
        );

        let mut child = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::ProcessSpawnFailed {
                reason: e.to_string(),
            })?;

        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            self.spawn_line_reader(stdout, OutputSource::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            self.spawn_line_reader(stderr, OutputSource::Stderr);
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        let bus = self.bus.clone();
        let natives_dir = command.natives_dir.take();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::error!(error = %e, "waiting for game process failed");
                    None
                }
            };
            tracing::info!(?code, "game process exited");
            bus.publish(EventPayload::ProcessExited { code });
            let _ = exit_tx.send(code);
            // Natives are only removed once the process is gone.
            drop(natives_dir);
        });

        Ok(GameProcess {
            pid,
            exited: exit_rx,
        })
    }

    /// Spawn without tracking: no events, no exit reporting
    ///
    /// # Errors
    /// [`Error::ProcessSpawnFailed`] when the OS refuses the spawn.
    pub fn spawn_detached(command: &LaunchCommand) -> Result<()> {
        tokio::process::Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::ProcessSpawnFailed {
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn spawn_line_reader<R>(&self, reader: R, source: OutputSource)
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                bus.publish(EventPayload::ProcessOutputLine {
                    line,
                    source,
                });
            }
        });
    }
}
