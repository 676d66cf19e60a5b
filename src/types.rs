//! Option records and results exchanged with audio providers.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::device::StreamFormat;
use crate::error::AudioError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecordingOptions {
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    /// Container extension, only `wav` is produced.
    pub format: Option<String>,
    /// Caller-side limit; engines never stop on their own.
    pub timeout_ms: Option<u64>,
    /// Write here instead of a generated capture path.
    pub file_path: Option<PathBuf>,
}

impl RecordingOptions {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaybackOptions {
    /// Informational; the file header decides the device format.
    pub sample_rate: Option<u32>,
    /// Informational; the file header decides the device format.
    pub channels: Option<u16>,
    /// Stop playback after this long.
    pub timeout_ms: Option<u64>,
}

impl PlaybackOptions {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TranscriptionOptions {
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub language: Option<String>,
    /// e.g. `word` or `segment`
    pub timestamp_granularity: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextToSpeechOptions {
    pub model: Option<String>,
    pub voice: Option<String>,
    pub speed: Option<f32>,
    /// Output container, e.g. `mp3`, `opus`, `wav`.
    pub format: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// The finished artifact of one capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub format: StreamFormat,
    /// Frames written to the file.
    pub frames: u64,
}

impl RecordingResult {
    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.format.sample_rate as f64
    }
}

/// Audio to be transcribed.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioInput {
    /// A file name or path, resolved like playback file names.
    Path(String),
    /// Raw container bytes.
    Bytes(Vec<u8>),
}

impl From<&str> for AudioInput {
    fn from(name: &str) -> Self {
        AudioInput::Path(name.to_string())
    }
}

impl From<Vec<u8>> for AudioInput {
    fn from(bytes: Vec<u8>) -> Self {
        AudioInput::Bytes(bytes)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscribedSegment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TranscriptionResult {
    pub text: String,
    pub language: Option<String>,
    pub duration_secs: Option<f64>,
    pub segments: Vec<TranscribedSegment>,
}

/// Synthesized speech as returned by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioResult {
    pub data: Vec<u8>,
    /// Container of `data`, e.g. `mp3`.
    pub format: String,
}

impl AudioResult {
    /// Write the audio into `dir`, returning the full path.
    ///
    /// Without a file name one is generated from the current time; the
    /// format extension is appended when the name lacks it.
    pub async fn save_to(&self, dir: &Path, filename: Option<&str>) -> Result<PathBuf, AudioError> {
        if self.data.is_empty() {
            return Err(AudioError::InvalidInput(
                "no audio data available to save".to_string(),
            ));
        }

        tokio::fs::create_dir_all(dir).await.map_err(AudioError::speech)?;

        let extension = format!(".{}", self.format);
        let mut filename = match filename {
            Some(name) => name.to_string(),
            None => format!("tts-{}{}", file_timestamp(), extension),
        };
        if !filename.ends_with(&extension) {
            filename.push_str(&extension);
        }

        let path = dir.join(filename);
        tokio::fs::write(&path, &self.data)
            .await
            .map_err(AudioError::speech)?;

        info!("Saved {} bytes of speech to {:?}", self.data.len(), path);
        Ok(path)
    }
}

/// Current UTC time as an ISO-8601 string safe for file names.
pub(crate) fn file_timestamp() -> String {
    Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .replace([':', '.'], "-")
}
