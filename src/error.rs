use std::path::PathBuf;
use thiserror::Error;

/// Boxed cause carried by the failure variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Every failure a public audio operation can report.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("A recording is already in progress")]
    ConcurrentOperation,
    #[error("Playback is already in progress")]
    AlreadyPlaying,
    #[error("No playback in progress")]
    NotPlaying,
    #[error("Audio file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("No active audio provider")]
    NoActiveProvider,
    #[error("Unknown audio provider: {0}")]
    UnknownProvider(String),
    #[error("Recording failed: {0}")]
    RecordingFailed(#[source] BoxError),
    #[error("Playback failed: {0}")]
    PlaybackFailed(#[source] BoxError),
    #[error("Transcription failed: {0}")]
    TranscriptionFailed(#[source] BoxError),
    #[error("Speech synthesis failed: {0}")]
    SpeechFailed(#[source] BoxError),
    #[error("The active provider does not support {0}")]
    Unsupported(&'static str),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AudioError {
    pub fn recording(cause: impl Into<BoxError>) -> Self {
        AudioError::RecordingFailed(cause.into())
    }

    pub fn playback(cause: impl Into<BoxError>) -> Self {
        AudioError::PlaybackFailed(cause.into())
    }

    pub fn transcription(cause: impl Into<BoxError>) -> Self {
        AudioError::TranscriptionFailed(cause.into())
    }

    pub fn speech(cause: impl Into<BoxError>) -> Self {
        AudioError::SpeechFailed(cause.into())
    }
}
