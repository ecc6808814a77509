//! Log file tailer
//!
//! Watches the game's log file (typically `logs/latest.log` under the game
//! directory) and publishes one [`EventPayload::LogFileLine`] per
//! newline-terminated line. The tailer polls at a configurable interval; it
//! is safe to start before the file exists, partial trailing lines are held
//! until their newline arrives, a trailing `\r` is stripped, and rotation is
//! detected as the file shrinking below the last read position (the tailer
//! then rereads from offset zero).

use crate::events::EventBus;
use crate::types::EventPayload;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

/// Default poll cadence
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll-based tailer publishing log lines into the event bus
pub struct LogTailer {
    bus: EventBus,
    state: Mutex<TailerState>,
}

struct TailerState {
    interval: Duration,
    watched: Option<(PathBuf, CancellationToken)>,
}

impl LogTailer {
    /// Create a tailer publishing into `bus`
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            state: Mutex::new(TailerState {
                interval: DEFAULT_POLL_INTERVAL,
                watched: None,
            }),
        }
    }

    /// Change the poll interval; applies to the next [`LogTailer::start`]
    pub fn set_poll_interval(&self, interval: Duration) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .interval = interval;
    }

    /// Start watching `path`
    ///
    /// With `from_end` the existing content is skipped and only new lines
    /// are published. An already-running watch is stopped first.
    pub fn start(&self, path: impl Into<PathBuf>, from_end: bool) {
        let path = path.into();
        let token = CancellationToken::new();
        let interval = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((old, old_token)) = state.watched.take() {
                tracing::debug!(path = %old.display(), "replacing active log watch");
                old_token.cancel();
            }
            state.watched = Some((path.clone(), token.clone()));
            state.interval
        };

        tracing::info!(path = %path.display(), from_end, "log tailer started");
        let bus = self.bus.clone();
        tokio::spawn(tail_loop(bus, path, from_end, interval, token));
    }

    /// Stop watching; idempotent
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((path, token)) = state.watched.take() {
            token.cancel();
            tracing::info!(path = %path.display(), "log tailer stopped");
        }
    }

    /// Whether a watch is active
    pub fn is_watching(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .watched
            .is_some()
    }

    /// Path of the watched file, if any
    pub fn watched_path(&self) -> Option<PathBuf> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .watched
            .as_ref()
            .map(|(path, _)| path.clone())
    }
}

async fn tail_loop(
    bus: EventBus,
    path: PathBuf,
    from_end: bool,
    interval: Duration,
    token: CancellationToken,
) {
    let mut position: u64 = 0;
    let mut positioned = false;
    let mut partial: Vec<u8> = Vec::new();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        // Short-circuit until the file exists.
        let Ok(mut file) = tokio::fs::File::open(&path).await else {
            continue;
        };
        let Ok(metadata) = file.metadata().await else {
            continue;
        };
        let len = metadata.len();

        if !positioned {
            position = if from_end { len } else { 0 };
            positioned = true;
        }

        if len < position {
            tracing::debug!(path = %path.display(), "log file shrank, assuming rotation");
            position = 0;
            partial.clear();
        }
        if len == position {
            continue;
        }

        if file
            .seek(std::io::SeekFrom::Start(position))
            .await
            .is_err()
        {
            continue;
        }
        let mut chunk = Vec::with_capacity((len - position) as usize);
        let Ok(read) = file.take(len - position).read_to_end(&mut chunk).await else {
            continue;
        };
        position += read as u64;

        partial.extend_from_slice(&chunk);
        emit_complete_lines(&bus, &path, &mut partial);
    }
}

/// Publish every newline-terminated line in `buffer`, keeping the remainder
fn emit_complete_lines(bus: &EventBus, path: &Path, buffer: &mut Vec<u8>) {
    while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
        let mut line_bytes: Vec<u8> = buffer.drain(..=newline).collect();
        line_bytes.pop();
        if line_bytes.last() == Some(&b'\r') {
            line_bytes.pop();
        }
        let line = String::from_utf8_lossy(&line_bytes).into_owned();
        bus.publish(EventPayload::LogFileLine {
            line,
            source: path.to_path_buf(),
        });
    }
}
