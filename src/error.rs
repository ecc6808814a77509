//! Error types for neko-launcher
//!
//! One unified error type covers the whole core: task scheduling, the event
//! loop, the network engine, the asset pipeline, launch-command assembly,
//! process spawning and audio playback. Each variant carries enough context
//! to diagnose the failure without a debugger attached.

use crate::types::WorkerId;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for neko-launcher operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for neko-launcher
///
/// This is the primary error type used throughout the library. Each variant
/// includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// The worker pool has been stopped and rejects new submissions
    #[error("worker pool is stopped, submission rejected")]
    PoolStopped,

    /// The shared task queue is at its configured depth cap
    #[error("task queue is full ({depth} tasks queued)")]
    QueueFull {
        /// Queue depth at the moment of rejection
        depth: usize,
    },

    /// A targeted submission named a worker that is not in the roster
    #[error("worker {id} not found")]
    WorkerNotFound {
        /// The worker id that was requested
        id: WorkerId,
    },

    /// A submitted task panicked or its result was dropped before delivery
    #[error("task did not produce a result (panicked or discarded)")]
    TaskFailed,

    /// The event loop dropped an event because its queue was at capacity
    #[error("event queue overflow, event dropped")]
    QueueOverflow,

    /// Transport-level network failure (DNS, connect, TLS, reset)
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable description of the transport failure
        message: String,
    },

    /// The server answered with a status outside the accepted set
    #[error("HTTP status {status} from {url}")]
    HttpStatus {
        /// The HTTP status code returned by the server
        status: u16,
        /// The URL that produced the status
        url: String,
    },

    /// A request exceeded its deadline
    #[error("request timed out: {url}")]
    Timeout {
        /// The URL of the request that timed out
        url: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A downloaded or on-disk file failed its digest check after all repair
    /// attempts
    #[error("integrity check failed for {path}: expected {expected}, got {actual}")]
    Integrity {
        /// Path of the file that failed verification
        path: PathBuf,
        /// The digest the manifest or index declared
        expected: String,
        /// The digest actually computed from the file
        actual: String,
    },

    /// The version manifest is missing, unreadable, or not valid JSON
    #[error("invalid version manifest {path}: {reason}")]
    ManifestInvalid {
        /// Path of the manifest file
        path: PathBuf,
        /// Why reading or parsing failed
        reason: String,
    },

    /// A key the launch pipeline requires is absent from the manifest
    #[error("required manifest key missing: {key}")]
    ManifestKeyMissing {
        /// Dotted path of the missing key (e.g. `assetIndex.id`)
        key: String,
    },

    /// A rule or trigger pattern failed to compile
    #[error("invalid regex {pattern:?}: {reason}")]
    RegexInvalid {
        /// The offending pattern text
        pattern: String,
        /// The compiler's diagnostic
        reason: String,
    },

    /// The machine does not have enough physical memory to launch
    #[error("insufficient memory: {total_gib} GiB installed, {required_gib} GiB required")]
    InsufficientMemory {
        /// GiB the launch configuration requires
        required_gib: u64,
        /// GiB actually installed
        total_gib: u64,
    },

    /// A caller-supplied value is out of range or malformed
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The game process could not be spawned
    #[error("failed to spawn game process: {reason}")]
    ProcessSpawnFailed {
        /// OS-level reason the spawn failed
        reason: String,
    },

    /// Audio playback failure (missing file, undecodable media, no device)
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g. `minecraft.maxMemoryLimit`)
        key: Option<String>,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error surfaced by the transport layer
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl Error {
    /// Shorthand for a [`Error::Config`] without a key
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            key: None,
        }
    }

    /// Shorthand for a [`Error::Config`] naming the offending key
    pub fn config_key(message: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_context() {
        let err = Error::QueueFull { depth: 512 };
        assert!(err.to_string().contains("512"));

        let err = Error::Integrity {
            path: PathBuf::from("/tmp/lib.jar"),
            expected: "abc".into(),
            actual: "def".into(),
        };
        let text = err.to_string();
        assert!(text.contains("lib.jar"));
        assert!(text.contains("abc"));
        assert!(text.contains("def"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_config_helpers() {
        let err = Error::config_key("not a number", "minecraft.maxMemoryLimit");
        match err {
            Error::Config { key, .. } => {
                assert_eq!(key.as_deref(), Some("minecraft.maxMemoryLimit"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
