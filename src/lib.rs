//! Provider-based audio: record, play back, transcribe and synthesize speech
//! through whichever provider is currently active.

pub mod backend;
pub mod cancel;
pub mod codec;
pub mod command;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod library;
pub mod provider;
pub mod registry;
pub mod service;
pub mod types;

pub use cancel::{CancellationSignal, CancellationSource};
pub use config::{AudioConfig, ConfigError};
pub use error::AudioError;
pub use library::AudioLibrary;
pub use provider::AudioProvider;
pub use service::AudioService;
pub use types::{
    AudioInput, AudioResult, PlaybackOptions, RecordingOptions, RecordingResult, TextToSpeechOptions,
    TranscriptionOptions, TranscriptionResult,
};
