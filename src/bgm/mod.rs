//! Background-music engine driven by game output
//!
//! Lines from the game process and the log tailer are matched against a
//! prioritised list of regex triggers; the first match (highest priority,
//! then insertion order) wins. A matching trigger either stops the music
//! (empty music path) or plays its track: same-track requests while already
//! playing are ignored, and switching tracks cross-fades by scheduling the
//! new play `fade_out + 50 ms` after the fade-out starts, through the event
//! loop's delayed-task facility.
//!
//! All player mutations happen on the audio thread via posted commands; the
//! trigger list is guarded by a mutex and regexes compile only in
//! [`BgmEngine::initialize`] and [`BgmEngine::add_trigger`].

pub mod player;

pub use player::{AudioOutput, AudioPlayer, NullOutput, OutputFactory, PlayerCommand, RodioOutput};

use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::types::{BgmState, EventKind, EventPayload, Priority};
use player::StateCallback;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Extra delay between a fade-out and the cross-faded play
const CROSS_FADE_GAP: Duration = Duration::from_millis(50);

/// Fade-out used when the game process exits
const EXIT_FADE: Duration = Duration::from_secs(1);

/// A pattern-to-music mapping
///
/// An empty `music_path` encodes a stop trigger.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BgmTrigger {
    /// Trigger name, used for removal and diagnostics
    pub name: String,
    /// Regex matched against each output line
    pub pattern: String,
    /// Music file, absolute or relative to the configured base path
    pub music_path: String,
    /// Loop the track
    #[serde(rename = "loop")]
    pub looped: bool,
    /// Fade-in duration in milliseconds
    pub fade_in_ms: u32,
    /// Fade-out duration in milliseconds when switching away
    pub fade_out_ms: u32,
    /// Track volume in `[0, 1]`
    pub volume: f32,
    /// Higher priorities win when several triggers match one line
    pub priority: i32,
}

impl Default for BgmTrigger {
    fn default() -> Self {
        Self {
            name: String::new(),
            pattern: String::new(),
            music_path: String::new(),
            looped: true,
            fade_in_ms: 500,
            fade_out_ms: 500,
            volume: 0.7,
            priority: 0,
        }
    }
}

/// Full engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BgmConfig {
    /// Master switch
    pub enabled: bool,
    /// Base directory for relative music paths
    pub base_path: PathBuf,
    /// Master volume multiplier in `[0, 1]`
    pub master_volume: f32,
    /// Fade used when a trigger leaves its fades at zero
    pub default_fade_ms: u32,
    /// Trigger list
    pub triggers: Vec<BgmTrigger>,
}

impl Default for BgmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_path: PathBuf::new(),
            master_volume: 1.0,
            default_fade_ms: 500,
            triggers: Vec::new(),
        }
    }
}

struct CompiledTrigger {
    trigger: BgmTrigger,
    regex: Regex,
    seq: u64,
}

struct BgmInner {
    bus: EventBus,
    player: AudioPlayer,
    triggers: Mutex<Vec<CompiledTrigger>>,
    enabled: AtomicBool,
    master_volume: Mutex<f32>,
    base_path: Mutex<PathBuf>,
    default_fade_ms: AtomicU32,
    /// Track currently requested, and the trigger volume it plays at
    current: Mutex<Option<(PathBuf, f32)>>,
    next_seq: AtomicU64,
}

impl BgmInner {
    fn effective_fade(&self, ms: u32) -> Duration {
        let ms = if ms == 0 {
            self.default_fade_ms.load(Ordering::Relaxed)
        } else {
            ms
        };
        Duration::from_millis(u64::from(ms))
    }

    fn resolve_path(&self, music_path: &str) -> PathBuf {
        let path = PathBuf::from(music_path);
        if path.is_absolute() {
            path
        } else {
            self.base_path
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .join(path)
        }
    }
}

/// Rule-driven music controller
///
/// Cloning is cheap; all clones share the same engine.
#[derive(Clone)]
pub struct BgmEngine {
    inner: Arc<BgmInner>,
}

impl BgmEngine {
    /// Create an engine publishing state changes into `bus`
    ///
    /// `factory` constructs the audio output on the audio thread; use
    /// [`RodioOutput::factory`] in production and [`NullOutput::factory`]
    /// in tests or headless environments.
    pub fn new(bus: EventBus, factory: OutputFactory) -> Self {
        let bus_for_state = bus.clone();
        let on_state: StateCallback = Arc::new(move |state, track| {
            bus_for_state.publish(EventPayload::BgmStateChanged { state, track });
        });
        let player = AudioPlayer::spawn(factory, on_state);
        Self {
            inner: Arc::new(BgmInner {
                bus,
                player,
                triggers: Mutex::new(Vec::new()),
                enabled: AtomicBool::new(true),
                master_volume: Mutex::new(1.0),
                base_path: Mutex::new(PathBuf::new()),
                default_fade_ms: AtomicU32::new(500),
                current: Mutex::new(None),
                next_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Apply a full configuration, compiling every trigger pattern
    ///
    /// # Errors
    /// [`Error::RegexInvalid`] for the first pattern that fails to compile;
    /// earlier triggers are kept.
    pub fn initialize(&self, config: BgmConfig) -> Result<()> {
        self.inner.enabled.store(config.enabled, Ordering::Relaxed);
        *self
            .inner
            .master_volume
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = config.master_volume.clamp(0.0, 1.0);
        *self
            .inner
            .base_path
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = config.base_path;
        self.inner
            .default_fade_ms
            .store(config.default_fade_ms, Ordering::Relaxed);

        self.clear_triggers();
        for trigger in config.triggers {
            self.add_trigger(trigger)?;
        }
        tracing::info!(
            triggers = self.inner.triggers.lock().unwrap_or_else(|e| e.into_inner()).len(),
            "bgm engine initialised"
        );
        Ok(())
    }

    /// Subscribe to process and log events on the bus
    ///
    /// Output lines feed the trigger scan; process exit fades the music out
    /// over one second.
    pub fn subscribe_to_events(&self) {
        let engine = self.clone();
        self.inner
            .bus
            .subscribe(EventKind::ProcessOutputLine, move |event| {
                if let Some(line) = event.payload.line() {
                    engine.process_line(line);
                }
            });

        let engine = self.clone();
        self.inner
            .bus
            .subscribe(EventKind::LogFileLine, move |event| {
                if let Some(line) = event.payload.line() {
                    engine.process_line(line);
                }
            });

        let engine = self.clone();
        self.inner
            .bus
            .subscribe(EventKind::ProcessExited, move |_| {
                tracing::debug!("game exited, fading music out");
                engine.stop(EXIT_FADE);
            });
    }

    /// Add a trigger, keeping the list sorted by priority
    ///
    /// # Errors
    /// [`Error::RegexInvalid`] when the pattern does not compile.
    pub fn add_trigger(&self, trigger: BgmTrigger) -> Result<()> {
        let regex = Regex::new(&trigger.pattern).map_err(|e| Error::RegexInvalid {
            pattern: trigger.pattern.clone(),
            reason: e.to_string(),
        })?;
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        let mut triggers = self
            .inner
            .triggers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        triggers.push(CompiledTrigger {
            trigger,
            regex,
            seq,
        });
        // Stable order: priority descending, insertion order for ties.
        triggers.sort_by(|a, b| {
            b.trigger
                .priority
                .cmp(&a.trigger.priority)
                .then(a.seq.cmp(&b.seq))
        });
        Ok(())
    }

    /// Remove a trigger by name; returns whether it existed
    pub fn remove_trigger(&self, name: &str) -> bool {
        let mut triggers = self
            .inner
            .triggers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let before = triggers.len();
        triggers.retain(|t| t.trigger.name != name);
        triggers.len() < before
    }

    /// Remove every trigger
    pub fn clear_triggers(&self) {
        self.inner
            .triggers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Enable or disable line processing
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Change the master volume, rescaling the current track
    pub fn set_volume(&self, master: f32) {
        let master = master.clamp(0.0, 1.0);
        *self
            .inner
            .master_volume
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = master;
        let track_volume = self
            .inner
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|(_, volume)| *volume);
        if let Some(volume) = track_volume {
            self.inner
                .player
                .post(PlayerCommand::SetVolume(volume * master));
        }
    }

    /// Pause playback
    pub fn pause(&self) {
        self.inner.player.post(PlayerCommand::Pause);
    }

    /// Resume paused playback
    pub fn resume(&self) {
        self.inner.player.post(PlayerCommand::Resume);
    }

    /// Fade out and stop
    pub fn stop(&self, fade_out: Duration) {
        self.inner
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.inner.player.post(PlayerCommand::Stop { fade_out });
    }

    /// Current playback state
    pub fn state(&self) -> BgmState {
        self.inner.player.snapshot().state
    }

    /// Scan one line of output against the trigger list
    ///
    /// The highest-priority matching trigger wins; ties go to the earliest
    /// inserted. Publishes [`EventPayload::BgmTriggerMatched`] for the
    /// winning trigger and drives the player accordingly.
    pub fn process_line(&self, line: &str) {
        if !self.inner.enabled.load(Ordering::Relaxed) {
            return;
        }

        let matched: Option<BgmTrigger> = {
            let triggers = self
                .inner
                .triggers
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            triggers
                .iter()
                .find(|t| t.regex.is_match(line))
                .map(|t| t.trigger.clone())
        };
        let Some(trigger) = matched else { return };

        tracing::debug!(trigger = %trigger.name, line, "bgm trigger matched");
        self.inner.bus.publish(EventPayload::BgmTriggerMatched {
            name: trigger.name.clone(),
            pattern: trigger.pattern.clone(),
            music_path: trigger.music_path.clone(),
            line: line.to_string(),
        });

        if trigger.music_path.is_empty() {
            self.stop(self.inner.effective_fade(trigger.fade_out_ms));
            return;
        }

        let path = self.inner.resolve_path(&trigger.music_path);
        let snapshot = self.inner.player.snapshot();
        let mut current = self
            .inner
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        // Same track already playing: nothing to do.
        if snapshot.state == BgmState::Playing
            && current.as_ref().is_some_and(|(p, _)| *p == path)
        {
            return;
        }

        let master = *self
            .inner
            .master_volume
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let play = PlayerCommand::Play {
            path: path.clone(),
            looped: trigger.looped,
            fade_in: self.inner.effective_fade(trigger.fade_in_ms),
            volume: (trigger.volume * master).clamp(0.0, 1.0),
        };

        if snapshot.state == BgmState::Playing {
            // Cross-fade: fade the old track out now, start the new one
            // shortly after the fade completes.
            let fade_out = self.inner.effective_fade(trigger.fade_out_ms);
            self.inner.player.post(PlayerCommand::Stop { fade_out });
            let poster = self.inner.player.poster();
            self.inner.bus.schedule_task(
                fade_out + CROSS_FADE_GAP,
                Priority::Normal,
                move || {
                    let _ = poster.send(play.clone());
                },
            );
        } else {
            self.inner.player.post(play);
        }
        *current = Some((path, trigger.volume));
    }
}
