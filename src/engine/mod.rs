//! Session lifecycles: one capture and one playback at a time per engine.

mod playback;
mod recording;

pub use playback::{PlaybackEngine, PlaybackOutcome, PlaybackStatus};
pub use recording::RecordingEngine;

use serde::{Deserialize, Serialize};

/// Capture parameters used when the caller leaves them out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecordingDefaults {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: String,
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 1,
            format: "wav".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaybackDefaults {
    /// Frames relayed from file to device per block.
    pub block_frames: usize,
}

impl Default for PlaybackDefaults {
    fn default() -> Self {
        Self { block_frames: 1024 }
    }
}
