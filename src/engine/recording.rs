use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};

use super::RecordingDefaults;
use crate::cancel::CancellationSignal;
use crate::codec::{WavSink, run_blocking};
use crate::device::{AudioDevice, CaptureStream, DeviceError, StreamFormat};
use crate::error::AudioError;
use crate::library::AudioLibrary;
use crate::types::{RecordingOptions, RecordingResult};

/// Holds the in-progress flag for one session and clears it on every exit.
struct SessionGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SessionGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, AudioError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AudioError::ConcurrentOperation)?;
        Ok(Self { flag })
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Streams microphone blocks into a WAV file until cancelled.
pub struct RecordingEngine {
    device: Arc<dyn AudioDevice>,
    library: AudioLibrary,
    defaults: RecordingDefaults,
    in_progress: AtomicBool,
}

impl RecordingEngine {
    pub fn new(device: Arc<dyn AudioDevice>, library: AudioLibrary, defaults: RecordingDefaults) -> Self {
        Self {
            device,
            library,
            defaults,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Record until `signal` fires.
    ///
    /// The device is stopped before the file is finalized, and both are
    /// released before this returns, whatever the outcome.
    pub async fn record(
        &self,
        signal: CancellationSignal,
        options: &RecordingOptions,
    ) -> Result<RecordingResult, AudioError> {
        let _session = SessionGuard::acquire(&self.in_progress)?;

        let format = StreamFormat::new(
            options.sample_rate.unwrap_or(self.defaults.sample_rate),
            options.channels.unwrap_or(self.defaults.channels),
        );
        format.validate().map_err(AudioError::InvalidInput)?;

        let container = options
            .format
            .as_deref()
            .unwrap_or(&self.defaults.format)
            .to_ascii_lowercase();
        if container != "wav" {
            return Err(AudioError::InvalidInput(format!(
                "unsupported recording format: {}",
                container
            )));
        }

        let path = match &options.file_path {
            Some(path) => path.clone(),
            None => self.library.unique_capture_path(&container),
        };

        let mut capture = self.device.open_input(format).map_err(AudioError::recording)?;
        let sink = {
            let path = path.clone();
            run_blocking(move || {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                WavSink::create(&path, format)
            })
            .await
            .map_err(AudioError::recording)?
        };
        capture.start().map_err(AudioError::recording)?;

        info!(
            "Recording to {:?} ({} Hz, {} ch, device {})",
            path,
            format.sample_rate,
            format.channels,
            self.device.name()
        );

        let (sink, relayed) = relay(&signal, capture.as_mut(), sink).await;

        // Device first, so nothing can arrive after the file is closed.
        let stopped = capture.stop();
        drop(capture);
        let finalized = match sink {
            Some(sink) => Some(run_blocking(move || sink.finalize()).await),
            None => None,
        };

        if let Err(e) = &relayed {
            error!("Recording to {:?} failed: {}", path, e);
        }
        relayed?;
        stopped.map_err(AudioError::recording)?;
        let frames = finalized
            .transpose()
            .map_err(AudioError::recording)?
            .unwrap_or_default();

        let result = RecordingResult {
            file_path: path,
            format,
            frames,
        };
        info!(
            "Recording finished: {:?} ({:.2}s)",
            result.file_path,
            result.duration_secs()
        );
        Ok(result)
    }
}

/// Copy blocks in arrival order until cancelled.
///
/// Writes run on the blocking pool. The sink comes back for finalizing
/// unless a failed write consumed it.
async fn relay(
    signal: &CancellationSignal,
    capture: &mut dyn CaptureStream,
    mut sink: WavSink,
) -> (Option<WavSink>, Result<(), AudioError>) {
    loop {
        let samples = tokio::select! {
            biased;
            _ = signal.cancelled() => return (Some(sink), Ok(())),
            block = capture.read_block() => match block {
                Some(Ok(samples)) => samples,
                Some(Err(e)) => return (Some(sink), Err(AudioError::recording(e))),
                None => return (Some(sink), Err(AudioError::recording(DeviceError::Closed))),
            },
        };

        let written = run_blocking(move || sink.write_block(&samples).map(|()| sink)).await;
        match written {
            Ok(returned) => sink = returned,
            Err(e) => return (None, Err(AudioError::recording(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationSource;
    use crate::codec::WavSource;
    use crate::device::{MemoryDevice, RenderStream};
    use async_trait::async_trait;
    use std::time::Duration;

    fn engine(device: &MemoryDevice, dir: &std::path::Path) -> RecordingEngine {
        RecordingEngine::new(
            Arc::new(device.clone()),
            AudioLibrary::in_dir(dir),
            RecordingDefaults {
                sample_rate: 16_000,
                ..RecordingDefaults::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_recording_keeps_samples() {
        let dir = tempfile::tempdir().unwrap();
        let device = MemoryDevice::with_block_frames(160);
        let engine = engine(&device, dir.path());

        let result = engine
            .record(
                CancellationSignal::timeout(Duration::from_millis(100)),
                &RecordingOptions::default(),
            )
            .await
            .unwrap();

        assert!(result.file_path.starts_with(dir.path()));
        assert!(result.frames > 0);
        assert!(std::fs::metadata(&result.file_path).unwrap().len() > 44);

        let source = WavSource::open(&result.file_path).unwrap();
        assert_eq!(source.frames(), result.frames);
        assert_eq!(device.live_streams(), 0);
        assert!(!engine.is_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_record_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let device = MemoryDevice::with_block_frames(160);
        let engine = Arc::new(engine(&device, dir.path()));

        let source = CancellationSource::new();
        let first = tokio::spawn({
            let engine = Arc::clone(&engine);
            let signal = source.signal();
            async move { engine.record(signal, &RecordingOptions::default()).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(engine.is_recording());

        let second = engine
            .record(source.signal(), &RecordingOptions::default())
            .await;
        assert!(matches!(second, Err(AudioError::ConcurrentOperation)));

        source.cancel();
        let result = first.await.unwrap().unwrap();
        assert!(result.frames > 0);
        assert_eq!(device.inputs_opened(), 1);
    }

    #[tokio::test]
    async fn test_supplied_path_and_options() {
        let dir = tempfile::tempdir().unwrap();
        let device = MemoryDevice::with_block_frames(64);
        let engine = engine(&device, dir.path());
        let target = dir.path().join("nested").join("take.wav");

        let source = CancellationSource::new();
        source.cancel();
        let result = engine
            .record(
                source.signal(),
                &RecordingOptions {
                    sample_rate: Some(22_050),
                    channels: Some(2),
                    file_path: Some(target.clone()),
                    ..RecordingOptions::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(result.file_path, target);
        assert_eq!(result.format, StreamFormat::new(22_050, 2));
        assert_eq!(WavSource::open(&target).unwrap().format(), result.format);
    }

    #[tokio::test]
    async fn test_rejects_bad_options() {
        let dir = tempfile::tempdir().unwrap();
        let device = MemoryDevice::new();
        let engine = engine(&device, dir.path());

        let mp3 = RecordingOptions {
            format: Some("mp3".to_string()),
            ..RecordingOptions::default()
        };
        let err = engine
            .record(CancellationSource::new().signal(), &mp3)
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::InvalidInput(_)));

        let silent = RecordingOptions {
            channels: Some(0),
            ..RecordingOptions::default()
        };
        let err = engine
            .record(CancellationSource::new().signal(), &silent)
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::InvalidInput(_)));
        assert_eq!(device.inputs_opened(), 0);
    }

    #[tokio::test]
    async fn test_device_failure_releases_session() {
        let dir = tempfile::tempdir().unwrap();
        let device = MemoryDevice::new();
        device.set_fail_input(true);
        let engine = engine(&device, dir.path());

        let err = engine
            .record(CancellationSource::new().signal(), &RecordingOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::RecordingFailed(_)));
        assert!(!engine.is_recording());

        device.set_fail_input(false);
        let source = CancellationSource::new();
        source.cancel();
        assert!(engine.record(source.signal(), &RecordingOptions::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_unwritable_target_releases_device() {
        let dir = tempfile::tempdir().unwrap();
        let device = MemoryDevice::with_block_frames(160);
        let engine = engine(&device, dir.path());

        let options = RecordingOptions {
            file_path: Some(dir.path().to_path_buf()),
            ..RecordingOptions::default()
        };
        let err = engine
            .record(CancellationSource::new().signal(), &options)
            .await
            .unwrap_err();

        assert!(matches!(err, AudioError::RecordingFailed(_)));
        assert_eq!(device.inputs_opened(), 1);
        assert_eq!(device.live_streams(), 0);
        assert_eq!(device.frames_captured(), 0);
        assert!(!engine.is_recording());
    }

    /// Yields one block, then reports the device gone.
    struct VanishingDevice;

    struct VanishingCapture {
        sent: bool,
    }

    impl AudioDevice for VanishingDevice {
        fn name(&self) -> &str {
            "vanishing"
        }

        fn open_input(&self, _format: StreamFormat) -> Result<Box<dyn CaptureStream>, DeviceError> {
            Ok(Box::new(VanishingCapture { sent: false }))
        }

        fn open_output(&self, _format: StreamFormat) -> Result<Box<dyn RenderStream>, DeviceError> {
            Err(DeviceError::NoDevice("output"))
        }
    }

    #[async_trait]
    impl CaptureStream for VanishingCapture {
        fn start(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }

        async fn read_block(&mut self) -> Option<Result<Vec<i16>, DeviceError>> {
            if self.sent {
                return None;
            }
            self.sent = true;
            Some(Ok(vec![1; 32]))
        }

        fn stop(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_device_closing_mid_stream_fails() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RecordingEngine::new(
            Arc::new(VanishingDevice),
            AudioLibrary::in_dir(dir.path()),
            RecordingDefaults::default(),
        );

        let source = CancellationSource::new();
        let err = engine
            .record(source.signal(), &RecordingOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::RecordingFailed(_)));
        assert!(!engine.is_recording());
    }
}
