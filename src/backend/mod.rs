//! Speech-to-text and text-to-speech collaborators.
//!
//! Backends only convert between audio bytes and text; devices and files are
//! the providers' business.

mod mock;
mod openai;
#[cfg(feature = "whisper")]
mod whisper;

pub use mock::{MockSynthesizer, MockTranscriber};
pub use openai::{DEFAULT_BASE_URL, OpenAiClient, OpenAiSettings};
#[cfg(feature = "whisper")]
pub use whisper::WhisperTranscriber;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::codec::CodecError;
use crate::types::{AudioResult, TextToSpeechOptions, TranscriptionOptions, TranscriptionResult};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Failed to decode response: {0}")]
    Decode(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("No API key configured (set {0})")]
    MissingApiKey(String),
    #[error("Audio error: {0}")]
    Codec(#[from] CodecError),
    #[error("Model error: {0}")]
    Model(String),
}

/// Turns encoded audio into text.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// `audio` is a complete container file, e.g. WAV bytes.
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        options: &TranscriptionOptions,
    ) -> Result<TranscriptionResult, BackendError>;
}

/// Turns text into encoded audio.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(
        &self,
        text: &str,
        options: &TextToSpeechOptions,
    ) -> Result<AudioResult, BackendError>;
}
