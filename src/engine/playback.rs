use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::PlaybackDefaults;
use crate::codec::{CodecError, WavSource, run_blocking};
use crate::device::{AudioDevice, RenderStream, StreamFormat};
use crate::error::AudioError;
use crate::library::AudioLibrary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    Opening,
    Playing,
    Stopping,
}

/// How a playback session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Stopped,
    Failed(String),
}

struct ActivePlayback {
    id: u64,
    path: PathBuf,
    format: StreamFormat,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    outcome: watch::Receiver<Option<PlaybackOutcome>>,
}

enum PlaybackState {
    Idle,
    Opening,
    Playing(ActivePlayback),
    Stopping,
}

impl PlaybackState {
    fn status(&self) -> PlaybackStatus {
        match self {
            PlaybackState::Idle => PlaybackStatus::Idle,
            PlaybackState::Opening => PlaybackStatus::Opening,
            PlaybackState::Playing(_) => PlaybackStatus::Playing,
            PlaybackState::Stopping => PlaybackStatus::Stopping,
        }
    }
}

struct Shared {
    device: Arc<dyn AudioDevice>,
    library: AudioLibrary,
    block_frames: usize,
    state: Mutex<PlaybackState>,
    next_id: AtomicU64,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Back to Idle, unless another session has taken over since.
    fn finish(&self, id: u64) {
        let mut state = self.state();
        if matches!(&*state, PlaybackState::Playing(active) if active.id == id) {
            *state = PlaybackState::Idle;
        }
    }
}

/// Returns the state to Idle on drop if it is still `from`.
struct ResetGuard<'a> {
    shared: &'a Shared,
    from: PlaybackStatus,
    armed: bool,
}

impl<'a> ResetGuard<'a> {
    fn new(shared: &'a Shared, from: PlaybackStatus) -> Self {
        Self {
            shared,
            from,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ResetGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.shared.state();
        if state.status() == self.from {
            *state = PlaybackState::Idle;
        }
    }
}

struct Started {
    id: u64,
    path: PathBuf,
    outcome: watch::Receiver<Option<PlaybackOutcome>>,
}

/// Plays WAV files on an output device, one at a time.
///
/// `start_playback` returns once the device is running; a background task
/// relays the rest of the file and returns the engine to Idle when the file
/// ends or playback is stopped.
#[derive(Clone)]
pub struct PlaybackEngine {
    shared: Arc<Shared>,
}

impl PlaybackEngine {
    pub fn new(device: Arc<dyn AudioDevice>, library: AudioLibrary, defaults: PlaybackDefaults) -> Self {
        Self {
            shared: Arc::new(Shared {
                device,
                library,
                block_frames: defaults.block_frames.max(1),
                state: Mutex::new(PlaybackState::Idle),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.shared.state().status()
    }

    /// Path of the file currently playing.
    pub fn current_file(&self) -> Option<PathBuf> {
        match &*self.shared.state() {
            PlaybackState::Playing(active) => Some(active.path.clone()),
            _ => None,
        }
    }

    /// Format the current file is being played with.
    pub fn current_format(&self) -> Option<StreamFormat> {
        match &*self.shared.state() {
            PlaybackState::Playing(active) => Some(active.format),
            _ => None,
        }
    }

    pub fn library(&self) -> &AudioLibrary {
        &self.shared.library
    }

    /// Names of playable files in the recordings directory.
    pub fn list_audio_files(&self, extension: Option<&str>) -> Result<Vec<String>, AudioError> {
        let library = &self.shared.library;
        library
            .list(extension.unwrap_or(&library.extension))
            .map_err(AudioError::playback)
    }

    pub async fn start_playback(&self, name: &str) -> Result<PathBuf, AudioError> {
        Ok(self.begin(name).await?.path)
    }

    async fn begin(&self, name: &str) -> Result<Started, AudioError> {
        let shared = &self.shared;
        let path = shared.library.resolve(name);

        {
            let mut state = shared.state();
            if !matches!(*state, PlaybackState::Idle) {
                return Err(AudioError::AlreadyPlaying);
            }
            *state = PlaybackState::Opening;
        }
        let opening = ResetGuard::new(shared, PlaybackStatus::Opening);

        let is_file = tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file());
        if !is_file {
            return Err(AudioError::FileNotFound(path));
        }

        let source = {
            let path = path.clone();
            run_blocking(move || WavSource::open(&path))
                .await
                .map_err(AudioError::playback)?
        };
        let format = source.format();
        format
            .validate()
            .map_err(|e| AudioError::playback(CodecError::Unsupported(e)))?;

        let mut render = shared.device.open_output(format).map_err(AudioError::playback)?;
        render.start().map_err(AudioError::playback)?;

        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (outcome_tx, outcome_rx) = watch::channel(None);

        {
            let mut state = shared.state();
            let task = tokio::spawn(relay(
                Arc::clone(shared),
                id,
                path.clone(),
                source,
                render,
                stop_rx,
                outcome_tx,
            ));
            *state = PlaybackState::Playing(ActivePlayback {
                id,
                path: path.clone(),
                format,
                stop_tx,
                task,
                outcome: outcome_rx.clone(),
            });
        }
        opening.disarm();

        info!(
            "Playing {:?} ({} Hz, {} ch, device {})",
            path,
            format.sample_rate,
            format.channels,
            shared.device.name()
        );
        Ok(Started {
            id,
            path,
            outcome: outcome_rx,
        })
    }

    /// Halt the current session and wait until its handles are released.
    pub async fn stop_playback(&self) -> Result<PathBuf, AudioError> {
        self.stop_session(None).await.ok_or(AudioError::NotPlaying)
    }

    /// Stop session `id`, or whichever is playing. `None` if nothing matched.
    async fn stop_session(&self, id: Option<u64>) -> Option<PathBuf> {
        let shared = &self.shared;
        let active = {
            let mut state = shared.state();
            match std::mem::replace(&mut *state, PlaybackState::Stopping) {
                PlaybackState::Playing(active) if id.is_none_or(|id| id == active.id) => active,
                PlaybackState::Playing(active) => {
                    *state = PlaybackState::Playing(active);
                    return None;
                }
                other => {
                    *state = other;
                    return None;
                }
            }
        };
        let stopping = ResetGuard::new(shared, PlaybackStatus::Stopping);

        let _ = active.stop_tx.send(true);
        if let Err(e) = active.task.await {
            error!("Playback task for {:?} ended abnormally: {}", active.path, e);
        }

        drop(stopping);
        info!("Stopped playback of {:?}", active.path);
        Some(active.path)
    }

    /// Play `name` and resolve once it is over: after `duration` (stopping
    /// it) or at the natural end of the file, whichever comes first.
    pub async fn play_for_duration(
        &self,
        name: &str,
        duration: Option<Duration>,
    ) -> Result<PathBuf, AudioError> {
        let Started {
            id,
            path,
            mut outcome,
        } = self.begin(name).await?;

        let finished = async {
            match outcome.wait_for(|o| o.is_some()).await {
                Ok(value) => value.clone().unwrap_or(PlaybackOutcome::Completed),
                Err(_) => PlaybackOutcome::Failed("playback task ended unexpectedly".to_string()),
            }
        };

        let outcome = match duration {
            Some(duration) => {
                tokio::select! {
                    outcome = finished => outcome,
                    _ = tokio::time::sleep(duration) => {
                        self.stop_session(Some(id)).await;
                        PlaybackOutcome::Stopped
                    }
                }
            }
            None => finished.await,
        };

        match outcome {
            PlaybackOutcome::Failed(message) => Err(AudioError::playback(message)),
            PlaybackOutcome::Completed | PlaybackOutcome::Stopped => Ok(path),
        }
    }
}

/// Background half of a session: file to device until the end or a stop.
async fn relay(
    shared: Arc<Shared>,
    id: u64,
    path: PathBuf,
    source: WavSource,
    mut render: Box<dyn RenderStream>,
    mut stop_rx: watch::Receiver<bool>,
    outcome_tx: watch::Sender<Option<PlaybackOutcome>>,
) {
    let outcome = stream_file(source, render.as_mut(), &mut stop_rx, shared.block_frames).await;

    if let Err(e) = render.stop() {
        warn!("Failed to stop output device: {}", e);
    }
    drop(render);

    shared.finish(id);
    match &outcome {
        PlaybackOutcome::Completed => info!("Finished playing {:?}", path),
        PlaybackOutcome::Stopped => {}
        PlaybackOutcome::Failed(e) => error!("Playback of {:?} failed: {}", path, e),
    }
    outcome_tx.send_replace(Some(outcome));
}

/// Reads run on the blocking pool and are never abandoned midway, so the
/// reader is closed by the time this returns.
async fn stream_file(
    mut source: WavSource,
    render: &mut dyn RenderStream,
    stop_rx: &mut watch::Receiver<bool>,
    block_frames: usize,
) -> PlaybackOutcome {
    loop {
        if *stop_rx.borrow() {
            return PlaybackOutcome::Stopped;
        }

        let read = run_blocking(move || {
            let block = source.read_block(block_frames)?;
            Ok((source, block))
        })
        .await;
        let block = match read {
            Ok((returned, Some(block))) => {
                source = returned;
                block
            }
            Ok((_, None)) => break,
            Err(e) => return PlaybackOutcome::Failed(e.to_string()),
        };

        tokio::select! {
            biased;
            _ = stop_rx.wait_for(|stop| *stop) => return PlaybackOutcome::Stopped,
            written = render.write_block(&block) => {
                if let Err(e) = written {
                    return PlaybackOutcome::Failed(e.to_string());
                }
            }
        }
    }

    tokio::select! {
        biased;
        _ = stop_rx.wait_for(|stop| *stop) => PlaybackOutcome::Stopped,
        drained = render.drain() => match drained {
            Ok(()) => PlaybackOutcome::Completed,
            Err(e) => PlaybackOutcome::Failed(e.to_string()),
        },
    }
}
