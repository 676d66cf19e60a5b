//! Default host devices through cpal.
//!
//! A `cpal::Stream` is not `Send` on every platform, so each stream lives on a
//! small owner thread that builds it, then plays, pauses or drops it on
//! command. Samples cross into async code through channels.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use tokio::sync::{Notify, mpsc};
use tracing::{error, info, warn};

use super::{AudioDevice, CaptureStream, DeviceError, RenderStream, StreamFormat};

enum Command {
    Play(std_mpsc::SyncSender<Result<(), DeviceError>>),
    Pause(std_mpsc::SyncSender<Result<(), DeviceError>>),
    Close,
}

/// Owner thread of one cpal stream.
struct StreamWorker {
    commands: std_mpsc::Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl StreamWorker {
    fn spawn<F>(name: &str, build: F) -> Result<Self, DeviceError>
    where
        F: FnOnce() -> Result<cpal::Stream, DeviceError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        let (commands, command_rx) = std_mpsc::channel::<Command>();

        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while let Ok(command) = command_rx.recv() {
                    match command {
                        Command::Play(reply) => {
                            let result = stream.play().map_err(|e| DeviceError::Stream(e.to_string()));
                            let _ = reply.send(result);
                        }
                        Command::Pause(reply) => {
                            let result = stream.pause().map_err(|e| DeviceError::Stream(e.to_string()));
                            let _ = reply.send(result);
                        }
                        Command::Close => break,
                    }
                }
                drop(stream);
            })
            .map_err(|e| DeviceError::Stream(format!("Failed to spawn stream thread: {}", e)))?;

        let mut worker = Self {
            commands,
            thread: Some(thread),
        };
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(worker),
            Ok(Err(e)) => {
                worker.join();
                Err(e)
            }
            Err(_) => {
                worker.join();
                Err(DeviceError::Closed)
            }
        }
    }

    fn request(&self, command: fn(std_mpsc::SyncSender<Result<(), DeviceError>>) -> Command) -> Result<(), DeviceError> {
        let (reply_tx, reply_rx) = std_mpsc::sync_channel(1);
        self.commands
            .send(command(reply_tx))
            .map_err(|_| DeviceError::Closed)?;
        reply_rx.recv().map_err(|_| DeviceError::Closed)?
    }

    fn play(&self) -> Result<(), DeviceError> {
        self.request(Command::Play)
    }

    fn pause(&self) -> Result<(), DeviceError> {
        self.request(Command::Pause)
    }

    fn join(&mut self) {
        let _ = self.commands.send(Command::Close);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Audio stream thread panicked");
            }
        }
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        self.join();
    }
}

fn stream_config(format: StreamFormat) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

/// The host's default input and output devices.
#[derive(Debug, Clone, Default)]
pub struct CpalDevice;

impl CpalDevice {
    pub fn new() -> Self {
        Self
    }
}

impl AudioDevice for CpalDevice {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open_input(&self, format: StreamFormat) -> Result<Box<dyn CaptureStream>, DeviceError> {
        format.validate().map_err(DeviceError::UnsupportedFormat)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = StreamWorker::spawn("audio-capture", move || build_input(format, tx))?;
        info!(
            "Opened default input device ({} Hz, {} ch)",
            format.sample_rate, format.channels
        );
        Ok(Box::new(CpalCapture { worker, rx }))
    }

    fn open_output(&self, format: StreamFormat) -> Result<Box<dyn RenderStream>, DeviceError> {
        format.validate().map_err(DeviceError::UnsupportedFormat)?;
        let shared = Arc::new(OutputShared {
            queue: Mutex::new(VecDeque::new()),
            failure: Mutex::new(None),
            notify: Notify::new(),
        });

        let worker = StreamWorker::spawn("audio-render", {
            let shared = Arc::clone(&shared);
            move || build_output(format, shared)
        })?;
        info!(
            "Opened default output device ({} Hz, {} ch)",
            format.sample_rate, format.channels
        );

        // Half a second of audio may be queued ahead of the device.
        let high_water = (format.sample_rate as usize * format.channels as usize) / 2;
        Ok(Box::new(CpalRender {
            worker,
            shared,
            high_water,
        }))
    }
}

type CaptureTx = mpsc::UnboundedSender<Result<Vec<i16>, DeviceError>>;

fn build_input(format: StreamFormat, tx: CaptureTx) -> Result<cpal::Stream, DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(DeviceError::NoDevice("input"))?;
    let sample_format = device
        .default_input_config()
        .map_err(|e| DeviceError::Stream(format!("input config: {}", e)))?
        .sample_format();
    let config = stream_config(format);

    let err_tx = tx.clone();
    let err_fn = move |err: cpal::StreamError| {
        warn!("Input stream error: {}", err);
        let _ = err_tx.send(Err(DeviceError::Stream(err.to_string())));
    };

    let stream = match sample_format {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(Ok(data.to_vec()));
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                let block = data.iter().map(|&s| (s as i32 - 32768) as i16).collect();
                let _ = tx.send(Ok(block));
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let block = data
                    .iter()
                    .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                    .collect();
                let _ = tx.send(Ok(block));
            },
            err_fn,
            None,
        ),
        other => {
            return Err(DeviceError::UnsupportedFormat(format!(
                "input sample format {:?}",
                other
            )));
        }
    };

    stream.map_err(|e| DeviceError::Stream(format!("build input stream: {}", e)))
}

struct CpalCapture {
    worker: StreamWorker,
    rx: mpsc::UnboundedReceiver<Result<Vec<i16>, DeviceError>>,
}

#[async_trait]
impl CaptureStream for CpalCapture {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.worker.play()
    }

    async fn read_block(&mut self) -> Option<Result<Vec<i16>, DeviceError>> {
        self.rx.recv().await
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.worker.pause()
    }
}

struct OutputShared {
    queue: Mutex<VecDeque<i16>>,
    failure: Mutex<Option<String>>,
    notify: Notify,
}

impl OutputShared {
    /// Fill `out` from the queue, padding with silence.
    fn fill<T: Copy>(&self, out: &mut [T], silence: T, convert: impl Fn(i16) -> T) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        for slot in out.iter_mut() {
            *slot = queue.pop_front().map(&convert).unwrap_or(silence);
        }
        drop(queue);
        self.notify.notify_one();
    }

    fn fail(&self, message: String) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
        self.notify.notify_one();
    }

    fn failure(&self) -> Option<DeviceError> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .map(DeviceError::Stream)
    }
}

fn build_output(format: StreamFormat, shared: Arc<OutputShared>) -> Result<cpal::Stream, DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(DeviceError::NoDevice("output"))?;
    let sample_format = device
        .default_output_config()
        .map_err(|e| DeviceError::Stream(format!("output config: {}", e)))?
        .sample_format();
    let config = stream_config(format);

    let err_shared = Arc::clone(&shared);
    let err_fn = move |err: cpal::StreamError| {
        warn!("Output stream error: {}", err);
        err_shared.fail(err.to_string());
    };

    let stream = match sample_format {
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| shared.fill(data, 0, |s| s),
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_output_stream(
            &config,
            move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                shared.fill(data, 32768, |s| (s as i32 + 32768) as u16)
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                shared.fill(data, 0.0, |s| s as f32 / i16::MAX as f32)
            },
            err_fn,
            None,
        ),
        other => {
            return Err(DeviceError::UnsupportedFormat(format!(
                "output sample format {:?}",
                other
            )));
        }
    };

    stream.map_err(|e| DeviceError::Stream(format!("build output stream: {}", e)))
}

struct CpalRender {
    worker: StreamWorker,
    shared: Arc<OutputShared>,
    high_water: usize,
}

#[async_trait]
impl RenderStream for CpalRender {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.worker.play()
    }

    async fn write_block(&mut self, samples: &[i16]) -> Result<(), DeviceError> {
        loop {
            if let Some(e) = self.shared.failure() {
                return Err(e);
            }
            {
                let mut queue = self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
                if queue.len() < self.high_water {
                    queue.extend(samples.iter().copied());
                    return Ok(());
                }
            }
            self.shared.notify.notified().await;
        }
    }

    async fn drain(&mut self) -> Result<(), DeviceError> {
        loop {
            if let Some(e) = self.shared.failure() {
                return Err(e);
            }
            let empty = self
                .shared
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_empty();
            if empty {
                return Ok(());
            }
            self.shared.notify.notified().await;
        }
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.worker.pause()
    }
}
