//! Core types for neko-launcher

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Priority level shared by the worker pool, the event bus and BGM triggers
///
/// Ordering is `Low < Normal < High < Critical`; higher priorities are
/// dispatched first.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work, dispatched last
    Low = 0,
    /// Default priority
    #[default]
    Normal = 1,
    /// Ahead of normal work
    High = 2,
    /// Dispatched before everything else
    Critical = 3,
}

/// Unique identifier for a task submitted to the worker pool
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

/// Unique identifier for a pool worker
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u64);

/// Unique identifier for a published event or scheduled task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

/// Unique identifier for an event subscription
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(pub u64);

macro_rules! id_impls {
    ($name:ident) => {
        impl $name {
            /// Create a new id from a raw value
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the inner u64 value
            pub fn get(&self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

id_impls!(TaskId);
id_impls!(WorkerId);
id_impls!(EventId);
id_impls!(HandlerId);

/// How an event is delivered to its subscribers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Run every eligible handler at the publish call site before returning
    Sync,
    /// Enqueue for the event loop; the publisher returns immediately
    #[default]
    Async,
}

/// Which stream of the game process a line came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSource {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// Playback state of the BGM player
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BgmState {
    /// No music is playing
    #[default]
    Stopped,
    /// Opening and decoding a new track
    Loading,
    /// Music is currently playing
    Playing,
    /// Playback is paused
    Paused,
    /// A fade-out towards silence is in progress
    Stopping,
    /// Playback failed (missing file, undecodable media, no device)
    Error,
}

/// Type tag identifying an event kind
///
/// Handlers subscribe by kind; every [`EventPayload`] maps to exactly one tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A line the game process wrote to stdout or stderr
    ProcessOutputLine,
    /// The game process terminated
    ProcessExited,
    /// A line appended to the watched log file
    LogFileLine,
    /// The BGM player changed state
    BgmStateChanged,
    /// A BGM trigger matched a line
    BgmTriggerMatched,
}

/// Event payload dispatched through the bus
///
/// The core's event kinds form a closed set; the matching [`EventKind`] is
/// available via [`EventPayload::kind`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A line the game process wrote on stdout or stderr
    ProcessOutputLine {
        /// The line, without its terminator
        line: String,
        /// Which stream produced it
        source: OutputSource,
    },

    /// The game process terminated
    ProcessExited {
        /// Exit code, if the process exited normally
        code: Option<i32>,
    },

    /// A line appended to the watched log file
    LogFileLine {
        /// The line, without its terminator (trailing `\r` stripped)
        line: String,
        /// Path of the file the line came from
        source: PathBuf,
    },

    /// The BGM player changed state
    BgmStateChanged {
        /// The new state
        state: BgmState,
        /// The track the state refers to, if any
        track: Option<PathBuf>,
    },

    /// A BGM trigger matched a line of output
    BgmTriggerMatched {
        /// Trigger name
        name: String,
        /// The trigger's pattern text
        pattern: String,
        /// Music path the trigger plays (empty for stop triggers)
        music_path: String,
        /// The line that matched
        line: String,
    },
}

impl EventPayload {
    /// The type tag for this payload
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::ProcessOutputLine { .. } => EventKind::ProcessOutputLine,
            EventPayload::ProcessExited { .. } => EventKind::ProcessExited,
            EventPayload::LogFileLine { .. } => EventKind::LogFileLine,
            EventPayload::BgmStateChanged { .. } => EventKind::BgmStateChanged,
            EventPayload::BgmTriggerMatched { .. } => EventKind::BgmTriggerMatched,
        }
    }

    /// The textual line carried by this payload, if it carries one
    pub fn line(&self) -> Option<&str> {
        match self {
            EventPayload::ProcessOutputLine { line, .. }
            | EventPayload::LogFileLine { line, .. } => Some(line),
            _ => None,
        }
    }
}
