//! The one entry point the rest of the program talks to.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::{MockSynthesizer, MockTranscriber, OpenAiClient};
use crate::cancel::CancellationSignal;
use crate::config::{AudioConfig, ConfigError, DeviceKind, ProviderConfig};
use crate::device::{AudioDevice, MemoryDevice};
use crate::error::AudioError;
use crate::library::AudioLibrary;
use crate::provider::{AudioProvider, DeviceProvider};
use crate::registry::ProviderRegistry;
use crate::types::{
    AudioInput, AudioResult, PlaybackOptions, RecordingOptions, RecordingResult, TextToSpeechOptions,
    TranscriptionOptions, TranscriptionResult,
};

/// Forwards every operation to the active provider.
pub struct AudioService {
    registry: ProviderRegistry<dyn AudioProvider>,
    library: AudioLibrary,
}

fn open_device(kind: DeviceKind) -> Result<Arc<dyn AudioDevice>, AudioError> {
    match kind {
        DeviceKind::Memory => Ok(Arc::new(MemoryDevice::new())),
        #[cfg(feature = "cpal")]
        DeviceKind::Cpal => Ok(Arc::new(crate::device::CpalDevice::new())),
        #[cfg(not(feature = "cpal"))]
        DeviceKind::Cpal => Err(AudioError::Unsupported(
            "cpal devices in this build (enable the `cpal` feature)",
        )),
    }
}

impl AudioService {
    pub fn new(library: AudioLibrary) -> Self {
        Self {
            registry: ProviderRegistry::new(),
            library,
        }
    }

    /// Register every configured provider and select the default one.
    pub fn from_config(config: &AudioConfig) -> Result<Self, ConfigError> {
        let library = config.library();
        let service = Self::new(library.clone());

        for (name, provider_config) in &config.providers {
            let build = |device: Arc<dyn AudioDevice>| {
                DeviceProvider::new(
                    name.clone(),
                    device,
                    library.clone(),
                    config.recording.clone(),
                    config.playback.clone(),
                )
            };

            let provider = match provider_config {
                ProviderConfig::Mock => build(Arc::new(MemoryDevice::new()))
                    .with_transcriber(Arc::new(MockTranscriber))
                    .with_synthesizer(Arc::new(MockSynthesizer::default())),
                ProviderConfig::Local(local) => {
                    let provider = build(open_device(local.device)?);
                    match &local.whisper_model {
                        #[cfg(feature = "whisper")]
                        Some(model) => provider.with_transcriber(Arc::new(
                            crate::backend::WhisperTranscriber::load(model)?,
                        )),
                        #[cfg(not(feature = "whisper"))]
                        Some(model) => {
                            warn!(
                                "Ignoring whisper model {:?} for '{}': built without the `whisper` feature",
                                model, name
                            );
                            provider
                        }
                        None => provider,
                    }
                }
                ProviderConfig::OpenAi(openai) => {
                    let client = Arc::new(OpenAiClient::new(
                        openai.settings(|key| std::env::var(key).ok()),
                    )?);
                    if client.settings().api_key.is_none() {
                        warn!(
                            "Provider '{}' has no API key; set {} to use it",
                            name, openai.api_key_env
                        );
                    }
                    build(open_device(openai.device)?)
                        .with_transcriber(client.clone())
                        .with_synthesizer(client)
                }
            };
            service.registry.register(name.clone(), Arc::new(provider));
        }

        if let Some(name) = &config.default_provider {
            service.registry.set_active(name)?;
        }
        info!(
            "Audio service ready with providers {:?} (active: {:?})",
            service.registry.names(),
            service.registry.active_name()
        );
        Ok(service)
    }

    /// Register under the provider's own name.
    pub fn register(&self, provider: Arc<dyn AudioProvider>) {
        let name = provider.name().to_string();
        self.registry.register(name, provider);
    }

    pub fn register_as(&self, name: impl Into<String>, provider: Arc<dyn AudioProvider>) {
        self.registry.register(name, provider);
    }

    pub fn list_providers(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn active_provider(&self) -> Option<String> {
        self.registry.active_name()
    }

    pub fn set_active_provider(&self, name: &str) -> Result<(), AudioError> {
        self.registry.set_active(name)
    }

    pub fn provider(&self, name: &str) -> Option<Arc<dyn AudioProvider>> {
        self.registry.get(name)
    }

    pub fn library(&self) -> &AudioLibrary {
        &self.library
    }

    pub async fn record(
        &self,
        signal: CancellationSignal,
        options: &RecordingOptions,
    ) -> Result<RecordingResult, AudioError> {
        self.registry.require_active()?.record(signal, options).await
    }

    pub async fn transcribe(
        &self,
        input: impl Into<AudioInput>,
        options: &TranscriptionOptions,
    ) -> Result<TranscriptionResult, AudioError> {
        self.registry
            .require_active()?
            .transcribe(input.into(), options)
            .await
    }

    pub async fn speak(&self, text: &str, options: &TextToSpeechOptions) -> Result<AudioResult, AudioError> {
        self.registry.require_active()?.speak(text, options).await
    }

    /// Speak `text` and save it under the output directory.
    pub async fn speak_to_file(
        &self,
        text: &str,
        options: &TextToSpeechOptions,
        filename: Option<&str>,
    ) -> Result<PathBuf, AudioError> {
        let audio = self.speak(text, options).await?;
        audio.save_to(&self.library.output_dir, filename).await
    }

    pub async fn playback(&self, filename: &str, options: &PlaybackOptions) -> Result<PathBuf, AudioError> {
        self.registry
            .require_active()?
            .playback(filename, options)
            .await
    }

    pub async fn stop_playback(&self) -> Result<PathBuf, AudioError> {
        self.registry.require_active()?.stop_playback().await
    }

    pub fn list_audio_files(&self, extension: Option<&str>) -> Result<Vec<String>, AudioError> {
        self.registry.require_active()?.list_audio_files(extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationSource;
    use crate::engine::{PlaybackDefaults, RecordingDefaults};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn mock_config(dir: &std::path::Path) -> AudioConfig {
        let mut providers = BTreeMap::new();
        providers.insert("cloud".to_string(), ProviderConfig::Mock);
        providers.insert("local".to_string(), ProviderConfig::Mock);
        AudioConfig {
            default_provider: Some("local".to_string()),
            recordings_dir: dir.to_path_buf(),
            output_dir: dir.join("out"),
            capture_dir: Some(dir.to_path_buf()),
            recording: RecordingDefaults {
                sample_rate: 16_000,
                ..RecordingDefaults::default()
            },
            playback: PlaybackDefaults { block_frames: 160 },
            providers,
            ..AudioConfig::default()
        }
    }

    #[tokio::test]
    async fn test_operations_need_an_active_provider() {
        let dir = tempfile::tempdir().unwrap();
        let service = AudioService::new(AudioLibrary::in_dir(dir.path()));

        let source = CancellationSource::new();
        assert!(matches!(
            service.record(source.signal(), &RecordingOptions::default()).await,
            Err(AudioError::NoActiveProvider)
        ));
        assert!(matches!(
            service.transcribe("demo", &TranscriptionOptions::default()).await,
            Err(AudioError::NoActiveProvider)
        ));
        assert!(matches!(
            service.speak("hi", &TextToSpeechOptions::default()).await,
            Err(AudioError::NoActiveProvider)
        ));
        assert!(matches!(
            service.playback("demo", &PlaybackOptions::default()).await,
            Err(AudioError::NoActiveProvider)
        ));
    }

    #[tokio::test]
    async fn test_from_config_selects_default() {
        let dir = tempfile::tempdir().unwrap();
        let service = AudioService::from_config(&mock_config(dir.path())).unwrap();

        assert_eq!(service.list_providers(), vec!["cloud", "local"]);
        assert_eq!(service.active_provider().as_deref(), Some("local"));

        assert!(matches!(
            service.set_active_provider("missing"),
            Err(AudioError::UnknownProvider(_))
        ));
        assert_eq!(service.active_provider().as_deref(), Some("local"));

        let mut config = mock_config(dir.path());
        config.default_provider = Some("nowhere".to_string());
        assert!(matches!(
            AudioService::from_config(&config),
            Err(ConfigError::Audio(AudioError::UnknownProvider(_)))
        ));
    }

    #[tokio::test]
    async fn test_speak_to_file_uses_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let service = AudioService::from_config(&mock_config(dir.path())).unwrap();

        let path = service
            .speak_to_file("hello", &TextToSpeechOptions::default(), Some("greeting"))
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("out").join("greeting.wav"));
        assert!(path.is_file());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_provider_lets_recording_finish() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(AudioService::from_config(&mock_config(dir.path())).unwrap());

        let source = CancellationSource::new();
        let recording = tokio::spawn({
            let service = Arc::clone(&service);
            let signal = source.signal();
            async move { service.record(signal, &RecordingOptions::default()).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        service.set_active_provider("cloud").unwrap();
        // The new provider has its own engine, so it is free to record.
        let quick = CancellationSource::new();
        quick.cancel();
        let other = service
            .record(quick.signal(), &RecordingOptions::default())
            .await
            .unwrap();

        source.cancel();
        let first = recording.await.unwrap().unwrap();
        assert!(first.frames > 0);
        assert_ne!(first.file_path, other.file_path);
        assert!(first.file_path.is_file());
    }
}
