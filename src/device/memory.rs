//! Synthetic device: captures a steady 440 Hz tone and renders into the void,
//! both paced in real time. Counts every handle so callers can check that
//! nothing leaks.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::{AudioDevice, CaptureStream, DeviceError, RenderStream, StreamFormat};

pub const DEFAULT_BLOCK_FRAMES: usize = 1024;
const CAPTURE_QUEUE_BLOCKS: usize = 16;
const TONE_HZ: f32 = 440.0;
const TONE_AMPLITUDE: f32 = 3000.0;

struct Inner {
    block_frames: usize,
    fail_input: AtomicBool,
    fail_output: AtomicBool,
    render_write_limit: AtomicUsize,
    inputs_opened: AtomicUsize,
    outputs_opened: AtomicUsize,
    live_streams: AtomicUsize,
    frames_captured: AtomicU64,
    frames_rendered: AtomicU64,
    last_output_format: Mutex<Option<StreamFormat>>,
}

#[derive(Clone)]
pub struct MemoryDevice {
    inner: Arc<Inner>,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self::with_block_frames(DEFAULT_BLOCK_FRAMES)
    }

    pub fn with_block_frames(block_frames: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                block_frames: block_frames.max(1),
                fail_input: AtomicBool::new(false),
                fail_output: AtomicBool::new(false),
                render_write_limit: AtomicUsize::new(usize::MAX),
                inputs_opened: AtomicUsize::new(0),
                outputs_opened: AtomicUsize::new(0),
                live_streams: AtomicUsize::new(0),
                frames_captured: AtomicU64::new(0),
                frames_rendered: AtomicU64::new(0),
                last_output_format: Mutex::new(None),
            }),
        }
    }

    /// Make every following `open_input` fail.
    pub fn set_fail_input(&self, fail: bool) {
        self.inner.fail_input.store(fail, Ordering::SeqCst);
    }

    /// Make every following `open_output` fail.
    pub fn set_fail_output(&self, fail: bool) {
        self.inner.fail_output.store(fail, Ordering::SeqCst);
    }

    /// Let each render stream accept `blocks` writes, then fail the rest as
    /// a lost device would.
    pub fn fail_writes_after(&self, blocks: usize) {
        self.inner.render_write_limit.store(blocks, Ordering::SeqCst);
    }

    pub fn inputs_opened(&self) -> usize {
        self.inner.inputs_opened.load(Ordering::SeqCst)
    }

    pub fn outputs_opened(&self) -> usize {
        self.inner.outputs_opened.load(Ordering::SeqCst)
    }

    /// Streams opened and not yet dropped.
    pub fn live_streams(&self) -> usize {
        self.inner.live_streams.load(Ordering::SeqCst)
    }

    /// Frames handed to readers of capture streams.
    pub fn frames_captured(&self) -> u64 {
        self.inner.frames_captured.load(Ordering::SeqCst)
    }

    /// Frames accepted by render streams.
    pub fn frames_rendered(&self) -> u64 {
        self.inner.frames_rendered.load(Ordering::SeqCst)
    }

    pub fn last_output_format(&self) -> Option<StreamFormat> {
        *self
            .inner
            .last_output_format
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDevice for MemoryDevice {
    fn name(&self) -> &str {
        "memory"
    }

    fn open_input(&self, format: StreamFormat) -> Result<Box<dyn CaptureStream>, DeviceError> {
        if self.inner.fail_input.load(Ordering::SeqCst) {
            return Err(DeviceError::NoDevice("input"));
        }
        format.validate().map_err(DeviceError::UnsupportedFormat)?;

        self.inner.inputs_opened.fetch_add(1, Ordering::SeqCst);
        self.inner.live_streams.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(CAPTURE_QUEUE_BLOCKS);
        Ok(Box::new(MemoryCapture {
            format,
            inner: Arc::clone(&self.inner),
            pending_tx: Some(tx),
            rx,
            producer: None,
        }))
    }

    fn open_output(&self, format: StreamFormat) -> Result<Box<dyn RenderStream>, DeviceError> {
        if self.inner.fail_output.load(Ordering::SeqCst) {
            return Err(DeviceError::NoDevice("output"));
        }
        format.validate().map_err(DeviceError::UnsupportedFormat)?;

        self.inner.outputs_opened.fetch_add(1, Ordering::SeqCst);
        self.inner.live_streams.fetch_add(1, Ordering::SeqCst);
        *self
            .inner
            .last_output_format
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(format);

        Ok(Box::new(MemoryRender {
            format,
            inner: Arc::clone(&self.inner),
            started: false,
            writes: 0,
        }))
    }
}

struct MemoryCapture {
    format: StreamFormat,
    inner: Arc<Inner>,
    /// Moved into the producer task on start.
    pending_tx: Option<mpsc::Sender<Vec<i16>>>,
    rx: mpsc::Receiver<Vec<i16>>,
    producer: Option<JoinHandle<()>>,
}

#[async_trait]
impl CaptureStream for MemoryCapture {
    fn start(&mut self) -> Result<(), DeviceError> {
        let tx = self
            .pending_tx
            .take()
            .ok_or_else(|| DeviceError::Stream("capture already started".to_string()))?;

        let format = self.format;
        let block_frames = self.inner.block_frames;
        self.producer = Some(tokio::spawn(produce_tone(tx, format, block_frames)));
        debug!("Memory capture started ({} Hz, {} ch)", format.sample_rate, format.channels);
        Ok(())
    }

    async fn read_block(&mut self) -> Option<Result<Vec<i16>, DeviceError>> {
        if self.pending_tx.is_some() {
            return Some(Err(DeviceError::Stream("capture not started".to_string())));
        }

        let block = self.rx.recv().await?;
        self.inner
            .frames_captured
            .fetch_add(self.format.frames_in(block.len()), Ordering::SeqCst);
        Some(Ok(block))
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
        Ok(())
    }
}

impl Drop for MemoryCapture {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
        self.inner.live_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn produce_tone(tx: mpsc::Sender<Vec<i16>>, format: StreamFormat, block_frames: usize) {
    let mut ticker = tokio::time::interval(format.duration_of(block_frames as u64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut position = 0u64;
    loop {
        ticker.tick().await;
        let block = tone_block(format, block_frames, position);
        position += block_frames as u64;
        if tx.send(block).await.is_err() {
            break;
        }
    }
}

/// Interleaved sine block starting at frame `position`.
fn tone_block(format: StreamFormat, frames: usize, position: u64) -> Vec<i16> {
    let sr = format.sample_rate as f32;
    let mut out = Vec::with_capacity(frames * format.channels as usize);
    for n in 0..frames as u64 {
        let t = (position + n) as f32 / sr;
        let s = (2.0 * std::f32::consts::PI * TONE_HZ * t).sin();
        let v = (s * TONE_AMPLITUDE) as i16;
        for _ in 0..format.channels {
            out.push(v);
        }
    }
    out
}

struct MemoryRender {
    format: StreamFormat,
    inner: Arc<Inner>,
    started: bool,
    writes: usize,
}

#[async_trait]
impl RenderStream for MemoryRender {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.started = true;
        Ok(())
    }

    async fn write_block(&mut self, samples: &[i16]) -> Result<(), DeviceError> {
        if !self.started {
            return Err(DeviceError::Stream("render not started".to_string()));
        }
        if self.writes >= self.inner.render_write_limit.load(Ordering::SeqCst) {
            return Err(DeviceError::Stream("render device lost".to_string()));
        }
        self.writes += 1;

        let frames = self.format.frames_in(samples.len());
        tokio::time::sleep(self.format.duration_of(frames)).await;
        self.inner.frames_rendered.fetch_add(frames, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.started = false;
        Ok(())
    }
}

impl Drop for MemoryRender {
    fn drop(&mut self) {
        self.inner.live_streams.fetch_sub(1, Ordering::SeqCst);
    }
}
