//! The capability set every audio backend bundle offers.

mod device;

pub use device::DeviceProvider;

use async_trait::async_trait;
use std::path::PathBuf;

use crate::cancel::CancellationSignal;
use crate::error::AudioError;
use crate::types::{
    AudioInput, AudioResult, PlaybackOptions, RecordingOptions, RecordingResult, TextToSpeechOptions,
    TranscriptionOptions, TranscriptionResult,
};

#[async_trait]
pub trait AudioProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Capture until `signal` fires.
    async fn record(
        &self,
        signal: CancellationSignal,
        options: &RecordingOptions,
    ) -> Result<RecordingResult, AudioError>;

    async fn transcribe(
        &self,
        input: AudioInput,
        options: &TranscriptionOptions,
    ) -> Result<TranscriptionResult, AudioError>;

    async fn speak(&self, text: &str, options: &TextToSpeechOptions) -> Result<AudioResult, AudioError>;

    /// Play a file to the end, or for `options.timeout_ms` if given.
    async fn playback(&self, filename: &str, options: &PlaybackOptions) -> Result<PathBuf, AudioError>;

    async fn stop_playback(&self) -> Result<PathBuf, AudioError> {
        Err(AudioError::Unsupported("stopping playback"))
    }

    fn list_audio_files(&self, _extension: Option<&str>) -> Result<Vec<String>, AudioError> {
        Err(AudioError::Unsupported("listing audio files"))
    }
}
