//! Audio playback thread
//!
//! All player mutations happen on one dedicated OS thread that owns the
//! audio output; external callers post [`PlayerCommand`]s through a channel
//! instead of touching the player. Fades run on a 16 ms tick with an
//! ease-in-out-quadratic volume curve, driven by the command channel's
//! receive timeout rather than a spinning timer.

use crate::error::{Error, Result};
use crate::types::BgmState;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Fade tick cadence (~60 Hz)
const FADE_TICK: Duration = Duration::from_millis(16);

/// Idle receive timeout when no fade is running
const IDLE_TICK: Duration = Duration::from_millis(250);

/// Backend seam for the audio device
///
/// The production implementation wraps rodio; tests use [`NullOutput`].
/// Implementations live entirely on the player thread (the device handle is
/// not `Send`), which is why construction goes through an [`OutputFactory`].
pub trait AudioOutput {
    /// Open `path` and start playing it (looped when requested)
    fn open(&mut self, path: &Path, looped: bool) -> Result<()>;
    /// Stop and release the current source
    fn stop(&mut self);
    /// Pause playback
    fn pause(&mut self);
    /// Resume paused playback
    fn resume(&mut self);
    /// Set the playback volume in `[0, 1]`
    fn set_volume(&mut self, volume: f32);
}

/// Constructor for the output, run on the player thread
///
/// The audio device handle is not `Send`, so it must be created on the
/// thread that will own it.
pub type OutputFactory = Box<dyn FnOnce() -> Result<Box<dyn AudioOutput>> + Send>;

/// Callback invoked on the player thread whenever the state changes
pub type StateCallback = Arc<dyn Fn(BgmState, Option<PathBuf>) + Send + Sync>;

/// Rodio-backed output
pub struct RodioOutput {
    _stream: rodio::OutputStream,
    handle: rodio::OutputStreamHandle,
    sink: Option<rodio::Sink>,
}

impl RodioOutput {
    /// Open the default audio device
    ///
    /// # Errors
    /// [`Error::Audio`] when no output device is available.
    pub fn create() -> Result<Box<dyn AudioOutput>> {
        let (stream, handle) = rodio::OutputStream::try_default()
            .map_err(|e| Error::Audio(format!("no audio output device: {e}")))?;
        Ok(Box::new(Self {
            _stream: stream,
            handle,
            sink: None,
        }))
    }

    /// An [`OutputFactory`] for the default device
    pub fn factory() -> OutputFactory {
        Box::new(Self::create)
    }
}

impl AudioOutput for RodioOutput {
    fn open(&mut self, path: &Path, looped: bool) -> Result<()> {
        use rodio::Source;

        if let Some(old) = self.sink.take() {
            old.stop();
        }
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Audio(format!("cannot open {}: {e}", path.display())))?;
        let decoder = rodio::Decoder::new(std::io::BufReader::new(file))
            .map_err(|e| Error::Audio(format!("cannot decode {}: {e}", path.display())))?;
        let sink = rodio::Sink::try_new(&self.handle)
            .map_err(|e| Error::Audio(format!("cannot create sink: {e}")))?;
        if looped {
            sink.append(decoder.repeat_infinite());
        } else {
            sink.append(decoder);
        }
        sink.play();
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn resume(&mut self) {
        if let Some(sink) = &self.sink {
            sink.play();
        }
    }

    fn set_volume(&mut self, volume: f32) {
        if let Some(sink) = &self.sink {
            sink.set_volume(volume.clamp(0.0, 1.0));
        }
    }
}

/// Silent output for tests and headless machines
#[derive(Default)]
pub struct NullOutput;

impl NullOutput {
    /// An [`OutputFactory`] producing a silent output
    pub fn factory() -> OutputFactory {
        Box::new(|| Ok(Box::new(NullOutput) as Box<dyn AudioOutput>))
    }
}

impl AudioOutput for NullOutput {
    fn open(&mut self, _path: &Path, _looped: bool) -> Result<()> {
        Ok(())
    }
    fn stop(&mut self) {}
    fn pause(&mut self) {}
    fn resume(&mut self) {}
    fn set_volume(&mut self, _volume: f32) {}
}

/// Command posted to the player thread
#[derive(Clone, Debug)]
pub enum PlayerCommand {
    /// Open a track and fade it in to `volume`
    Play {
        /// Media file
        path: PathBuf,
        /// Loop the track
        looped: bool,
        /// Fade-in duration
        fade_in: Duration,
        /// Target volume in `[0, 1]`
        volume: f32,
    },
    /// Fade out and stop
    Stop {
        /// Fade-out duration; zero stops immediately
        fade_out: Duration,
    },
    /// Pause playback
    Pause,
    /// Resume paused playback
    Resume,
    /// Change the effective volume
    SetVolume(f32),
    /// Stop and terminate the player thread
    Shutdown,
}

/// Observable player state
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayerSnapshot {
    /// Current playback state
    pub state: BgmState,
    /// Current track, if any
    pub track: Option<PathBuf>,
    /// Current effective volume
    pub volume: f32,
}

/// Handle to the audio thread
pub struct AudioPlayer {
    tx: mpsc::Sender<PlayerCommand>,
    shared: Arc<Mutex<PlayerSnapshot>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl AudioPlayer {
    /// Spawn the player thread
    ///
    /// `on_state` fires on every state transition, on the player thread.
    pub fn spawn(factory: OutputFactory, on_state: StateCallback) -> Self {
        let (tx, rx) = mpsc::channel();
        let shared = Arc::new(Mutex::new(PlayerSnapshot::default()));
        let shared_thread = shared.clone();
        let thread = std::thread::Builder::new()
            .name("bgm-audio".into())
            .spawn(move || player_thread(factory, rx, shared_thread, on_state))
            .ok();
        Self {
            tx,
            shared,
            thread,
        }
    }

    /// Post a command to the audio thread
    ///
    /// Never blocks; a dead thread drops the command.
    pub fn post(&self, command: PlayerCommand) {
        if self.tx.send(command).is_err() {
            tracing::warn!("audio thread gone, command dropped");
        }
    }

    /// A cloneable poster for delayed commands scheduled on the event loop
    pub fn poster(&self) -> mpsc::Sender<PlayerCommand> {
        self.tx.clone()
    }

    /// Snapshot of the observable state
    pub fn snapshot(&self) -> PlayerSnapshot {
        self.shared.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        let _ = self.tx.send(PlayerCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Quadratic ease-in-out in `[0, 1]`
fn ease_in_out_quad(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

enum FadeThen {
    Nothing,
    Stop,
}

struct Fade {
    start_volume: f32,
    end_volume: f32,
    started: Instant,
    duration: Duration,
    then: FadeThen,
}

impl Fade {
    fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.started.elapsed().as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
    }

    fn volume(&self) -> f32 {
        self.start_volume + (self.end_volume - self.start_volume) * ease_in_out_quad(self.progress())
    }
}

struct PlayerLoop {
    output: Box<dyn AudioOutput>,
    shared: Arc<Mutex<PlayerSnapshot>>,
    on_state: StateCallback,
    fade: Option<Fade>,
    current_volume: f32,
}

impl PlayerLoop {
    fn set_state(&self, state: BgmState, track: Option<PathBuf>) {
        {
            let mut snapshot = self.shared.lock().unwrap_or_else(|e| e.into_inner());
            if snapshot.state == state && snapshot.track == track {
                return;
            }
            snapshot.state = state;
            snapshot.track = track.clone();
            snapshot.volume = self.current_volume;
        }
        (self.on_state)(state, track);
    }

    fn apply_volume(&mut self, volume: f32) {
        self.current_volume = volume.clamp(0.0, 1.0);
        self.output.set_volume(self.current_volume);
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .volume = self.current_volume;
    }

    fn handle(&mut self, command: PlayerCommand) -> bool {
        match command {
            PlayerCommand::Play {
                path,
                looped,
                fade_in,
                volume,
            } => {
                self.set_state(BgmState::Loading, Some(path.clone()));
                match self.output.open(&path, looped) {
                    Ok(()) => {
                        if fade_in.is_zero() {
                            self.apply_volume(volume);
                            self.fade = None;
                        } else {
                            self.apply_volume(0.0);
                            self.fade = Some(Fade {
                                start_volume: 0.0,
                                end_volume: volume.clamp(0.0, 1.0),
                                started: Instant::now(),
                                duration: fade_in,
                                then: FadeThen::Nothing,
                            });
                        }
                        self.set_state(BgmState::Playing, Some(path));
                    }
                    Err(e) => {
                        tracing::error!(path = %path.display(), error = %e, "cannot play track");
                        self.set_state(BgmState::Error, Some(path));
                    }
                }
            }
            PlayerCommand::Stop { fade_out } => {
                let playing = {
                    let snapshot = self.shared.lock().unwrap_or_else(|e| e.into_inner());
                    snapshot.state == BgmState::Playing
                };
                if playing && !fade_out.is_zero() {
                    let track = self.shared.lock().unwrap_or_else(|e| e.into_inner()).track.clone();
                    self.set_state(BgmState::Stopping, track);
                    self.fade = Some(Fade {
                        start_volume: self.current_volume,
                        end_volume: 0.0,
                        started: Instant::now(),
                        duration: fade_out,
                        then: FadeThen::Stop,
                    });
                } else {
                    self.output.stop();
                    self.fade = None;
                    self.set_state(BgmState::Stopped, None);
                }
            }
            PlayerCommand::Pause => {
                self.output.pause();
                let track = self.shared.lock().unwrap_or_else(|e| e.into_inner()).track.clone();
                self.set_state(BgmState::Paused, track);
            }
            PlayerCommand::Resume => {
                self.output.resume();
                let track = self.shared.lock().unwrap_or_else(|e| e.into_inner()).track.clone();
                self.set_state(BgmState::Playing, track);
            }
            PlayerCommand::SetVolume(volume) => {
                if self.fade.is_none() {
                    self.apply_volume(volume);
                } else if let Some(fade) = &mut self.fade {
                    fade.end_volume = volume.clamp(0.0, 1.0);
                }
            }
            PlayerCommand::Shutdown => {
                self.output.stop();
                self.set_state(BgmState::Stopped, None);
                return false;
            }
        }
        true
    }

    fn tick(&mut self) {
        let Some(fade) = &self.fade else { return };
        let volume = fade.volume();
        let done = fade.progress() >= 1.0;
        let stop_after = matches!(fade.then, FadeThen::Stop);
        self.apply_volume(volume);
        if done {
            self.fade = None;
            if stop_after {
                self.output.stop();
                self.set_state(BgmState::Stopped, None);
            }
        }
    }
}

fn player_thread(
    factory: OutputFactory,
    rx: mpsc::Receiver<PlayerCommand>,
    shared: Arc<Mutex<PlayerSnapshot>>,
    on_state: StateCallback,
) {
    let output = match factory() {
        Ok(output) => output,
        Err(e) => {
            tracing::error!(error = %e, "audio output unavailable");
            {
                let mut snapshot = shared.lock().unwrap_or_else(|e| e.into_inner());
                snapshot.state = BgmState::Error;
            }
            on_state(BgmState::Error, None);
            // Drain until shutdown so posters never block or error.
            while let Ok(command) = rx.recv() {
                if matches!(command, PlayerCommand::Shutdown) {
                    break;
                }
            }
            return;
        }
    };

    let mut player = PlayerLoop {
        output,
        shared,
        on_state,
        fade: None,
        current_volume: 0.0,
    };

    loop {
        let timeout = if player.fade.is_some() {
            FADE_TICK
        } else {
            IDLE_TICK
        };
        match rx.recv_timeout(timeout) {
            Ok(command) => {
                if !player.handle(command) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => player.tick(),
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!("audio thread stopped");
}
