//! Byte-level access to audio input and output devices.
//!
//! All streams carry interleaved signed 16-bit PCM.

mod memory;

#[cfg(feature = "cpal")]
mod native;

pub use memory::MemoryDevice;

#[cfg(feature = "cpal")]
pub use native::CpalDevice;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Supported sample rate range in Hz
pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No default {0} device available")]
    NoDevice(&'static str),
    #[error("Unsupported stream format: {0}")]
    UnsupportedFormat(String),
    #[error("Device stream error: {0}")]
    Stream(String),
    #[error("Device stream closed")]
    Closed,
}

/// Shape of a PCM stream: 16-bit samples, interleaved channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamFormat {
    pub const BITS_PER_SAMPLE: u16 = 16;

    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(format!("unsupported sample rate: {} Hz", self.sample_rate));
        }
        if self.channels == 0 || self.channels > 8 {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        Ok(())
    }

    /// Number of whole frames in an interleaved block of `samples`.
    pub fn frames_in(&self, samples: usize) -> u64 {
        (samples / self.channels.max(1) as usize) as u64
    }

    /// Wall-clock length of `frames` frames.
    pub fn duration_of(&self, frames: u64) -> Duration {
        Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64)
    }
}

/// A physical (or synthetic) audio device.
pub trait AudioDevice: Send + Sync {
    fn name(&self) -> &str;

    fn open_input(&self, format: StreamFormat) -> Result<Box<dyn CaptureStream>, DeviceError>;

    fn open_output(&self, format: StreamFormat) -> Result<Box<dyn RenderStream>, DeviceError>;
}

/// Microphone side. Dropping the stream releases the device handle.
#[async_trait]
pub trait CaptureStream: Send {
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Next captured block in arrival order, `None` once the device is gone.
    ///
    /// Must be cancel-safe: a dropped call loses no samples.
    async fn read_block(&mut self) -> Option<Result<Vec<i16>, DeviceError>>;

    fn stop(&mut self) -> Result<(), DeviceError>;
}

/// Speaker side. Dropping the stream releases the device handle.
#[async_trait]
pub trait RenderStream: Send {
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Queue a block, waiting while the device is saturated.
    async fn write_block(&mut self, samples: &[i16]) -> Result<(), DeviceError>;

    /// Wait until everything queued has been rendered.
    async fn drain(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError>;
}
