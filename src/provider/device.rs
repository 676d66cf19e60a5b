use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::AudioProvider;
use crate::backend::{BackendError, SpeechBackend, TranscriptionBackend};
use crate::cancel::CancellationSignal;
use crate::device::AudioDevice;
use crate::engine::{PlaybackDefaults, PlaybackEngine, RecordingDefaults, RecordingEngine};
use crate::error::AudioError;
use crate::library::AudioLibrary;
use crate::types::{
    AudioInput, AudioResult, PlaybackOptions, RecordingOptions, RecordingResult, TextToSpeechOptions,
    TranscriptionOptions, TranscriptionResult,
};

/// A device for record/playback plus optional speech backends.
pub struct DeviceProvider {
    name: String,
    recorder: RecordingEngine,
    player: PlaybackEngine,
    transcriber: Option<Arc<dyn TranscriptionBackend>>,
    synthesizer: Option<Arc<dyn SpeechBackend>>,
}

impl DeviceProvider {
    pub fn new(
        name: impl Into<String>,
        device: Arc<dyn AudioDevice>,
        library: AudioLibrary,
        recording: RecordingDefaults,
        playback: PlaybackDefaults,
    ) -> Self {
        Self {
            name: name.into(),
            recorder: RecordingEngine::new(Arc::clone(&device), library.clone(), recording),
            player: PlaybackEngine::new(device, library, playback),
            transcriber: None,
            synthesizer: None,
        }
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn TranscriptionBackend>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn SpeechBackend>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn recorder(&self) -> &RecordingEngine {
        &self.recorder
    }

    pub fn player(&self) -> &PlaybackEngine {
        &self.player
    }

    async fn load_input(&self, input: AudioInput) -> Result<Vec<u8>, AudioError> {
        match input {
            AudioInput::Path(name) => {
                let path = self.player.library().resolve(&name);
                if !path.is_file() {
                    return Err(AudioError::FileNotFound(path));
                }
                tokio::fs::read(&path).await.map_err(AudioError::transcription)
            }
            AudioInput::Bytes(bytes) if bytes.is_empty() => {
                Err(AudioError::InvalidInput("no audio data to transcribe".to_string()))
            }
            AudioInput::Bytes(bytes) => Ok(bytes),
        }
    }
}

/// Bound a backend call by the caller's timeout, if any.
async fn within<T>(
    timeout_ms: Option<u64>,
    call: impl Future<Output = Result<T, BackendError>>,
) -> Result<T, BackendError> {
    match timeout_ms.map(Duration::from_millis) {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| BackendError::Timeout(limit))?,
        None => call.await,
    }
}

#[async_trait]
impl AudioProvider for DeviceProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn record(
        &self,
        signal: CancellationSignal,
        options: &RecordingOptions,
    ) -> Result<RecordingResult, AudioError> {
        self.recorder.record(signal, options).await
    }

    async fn transcribe(
        &self,
        input: AudioInput,
        options: &TranscriptionOptions,
    ) -> Result<TranscriptionResult, AudioError> {
        let transcriber = self
            .transcriber
            .as_ref()
            .ok_or(AudioError::Unsupported("transcription"))?;
        let audio = self.load_input(input).await?;

        debug!(
            "Transcribing {} bytes with {} ({})",
            audio.len(),
            transcriber.name(),
            self.name
        );
        within(options.timeout_ms, transcriber.transcribe(audio, options))
            .await
            .map_err(AudioError::transcription)
    }

    async fn speak(&self, text: &str, options: &TextToSpeechOptions) -> Result<AudioResult, AudioError> {
        if text.trim().is_empty() {
            return Err(AudioError::InvalidInput(
                "text to speak must not be empty".to_string(),
            ));
        }
        let synthesizer = self
            .synthesizer
            .as_ref()
            .ok_or(AudioError::Unsupported("speech synthesis"))?;

        debug!("Synthesizing {} chars with {}", text.len(), synthesizer.name());
        within(options.timeout_ms, synthesizer.synthesize(text, options))
            .await
            .map_err(AudioError::speech)
    }

    async fn playback(&self, filename: &str, options: &PlaybackOptions) -> Result<PathBuf, AudioError> {
        self.player.play_for_duration(filename, options.timeout()).await
    }

    async fn stop_playback(&self) -> Result<PathBuf, AudioError> {
        self.player.stop_playback().await
    }

    fn list_audio_files(&self, extension: Option<&str>) -> Result<Vec<String>, AudioError> {
        self.player.list_audio_files(extension)
    }
}
