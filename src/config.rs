//! Configuration: a JSON file plus a few environment overrides.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::backend::{BackendError, DEFAULT_BASE_URL, OpenAiSettings};
use crate::engine::{PlaybackDefaults, RecordingDefaults};
use crate::error::AudioError;
use crate::library::{AudioLibrary, DEFAULT_EXTENSION};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Failed to set up provider backend: {0}")]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Which device a provider records from and plays to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Memory,
    Cpal,
}

impl Default for DeviceKind {
    fn default() -> Self {
        if cfg!(feature = "cpal") {
            DeviceKind::Cpal
        } else {
            DeviceKind::Memory
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocalConfig {
    pub device: DeviceKind,
    /// ggml model file for local transcription
    pub whisper_model: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Environment variable holding the key when `apiKey` is absent.
    pub api_key_env: String,
    pub transcription_model: String,
    pub speech_model: String,
    pub voice: String,
    pub speed: f32,
    pub format: String,
    pub timeout_ms: u64,
    pub device: DeviceKind,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        let defaults = OpenAiSettings::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            api_key_env: defaults.api_key_env,
            transcription_model: defaults.transcription_model,
            speech_model: defaults.speech_model,
            voice: defaults.voice,
            speed: defaults.speed,
            format: defaults.format,
            timeout_ms: defaults.timeout.as_millis() as u64,
            device: DeviceKind::default(),
        }
    }
}

impl OpenAiConfig {
    /// Client settings, taking the key from `lookup(apiKeyEnv)` if needed.
    pub fn settings(&self, lookup: impl Fn(&str) -> Option<String>) -> OpenAiSettings {
        OpenAiSettings {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone().or_else(|| lookup(&self.api_key_env)),
            api_key_env: self.api_key_env.clone(),
            transcription_model: self.transcription_model.clone(),
            speech_model: self.speech_model.clone(),
            voice: self.voice.clone(),
            speed: self.speed,
            format: self.format.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Synthetic device with offline backends.
    Mock,
    Local(LocalConfig),
    OpenAi(OpenAiConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioConfig {
    pub default_provider: Option<String>,
    pub recordings_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Defaults to the OS temp directory.
    pub capture_dir: Option<PathBuf>,
    pub extension: String,
    pub recording: RecordingDefaults,
    pub playback: PlaybackDefaults,
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            recordings_dir: PathBuf::from("./recordings"),
            output_dir: PathBuf::from("./audio-output"),
            capture_dir: None,
            extension: DEFAULT_EXTENSION.to_string(),
            recording: RecordingDefaults::default(),
            playback: PlaybackDefaults::default(),
            providers: BTreeMap::new(),
        }
    }
}

impl AudioConfig {
    /// Built-in setup: always a `mock` provider, `local` when built with
    /// cpal, `openai` when an API key is around. The most capable one is
    /// selected.
    pub fn builtin(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        config
            .providers
            .insert("mock".to_string(), ProviderConfig::Mock);
        config.default_provider = Some("mock".to_string());

        if cfg!(feature = "cpal") {
            config.providers.insert(
                "local".to_string(),
                ProviderConfig::Local(LocalConfig {
                    device: DeviceKind::Cpal,
                    whisper_model: None,
                }),
            );
            config.default_provider = Some("local".to_string());
        }

        let openai = OpenAiConfig::default();
        if lookup(&openai.api_key_env).is_some() {
            config
                .providers
                .insert("openai".to_string(), ProviderConfig::OpenAi(openai));
            config.default_provider = Some("openai".to_string());
        }
        config
    }

    /// Read `path`, or fall back to [`AudioConfig::builtin`].
    pub fn load(path: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                info!("Loaded audio config from {:?}", path);
                serde_json::from_str(&text)?
            }
            None => {
                debug!("No config file given, using built-in providers");
                Self::builtin(&lookup)
            }
        };
        config.apply_overrides(&lookup);
        Ok(config)
    }

    /// Same as [`AudioConfig::load`], reading the process environment.
    pub fn from_env(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load(path, |key| std::env::var(key).ok())
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup("AUDIO_DEFAULT_PROVIDER") {
            self.default_provider = Some(name);
        }
        if let Some(dir) = lookup("AUDIO_RECORDINGS_DIR") {
            self.recordings_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("AUDIO_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("AUDIO_CAPTURE_DIR") {
            self.capture_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn library(&self) -> AudioLibrary {
        AudioLibrary {
            recordings_dir: self.recordings_dir.clone(),
            capture_dir: self
                .capture_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            output_dir: self.output_dir.clone(),
            extension: self.extension.trim_start_matches('.').to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "defaultProvider": "cloud",
            "recordingsDir": "/data/in",
            "recording": {"sampleRate": 16000},
            "playback": {"blockFrames": 512},
            "providers": {
                "offline": {"type": "mock"},
                "desk": {"type": "local", "device": "memory"},
                "cloud": {"type": "openai", "voice": "nova", "apiKeyEnv": "MY_KEY"}
            }
        }"#;
        let config: AudioConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.default_provider.as_deref(), Some("cloud"));
        assert_eq!(config.recordings_dir, PathBuf::from("/data/in"));
        assert_eq!(config.output_dir, PathBuf::from("./audio-output"));
        assert_eq!(config.recording.sample_rate, 16_000);
        assert_eq!(config.recording.channels, 1);
        assert_eq!(config.playback.block_frames, 512);
        assert_eq!(config.providers["offline"], ProviderConfig::Mock);

        match &config.providers["cloud"] {
            ProviderConfig::OpenAi(openai) => {
                assert_eq!(openai.voice, "nova");
                assert_eq!(openai.speech_model, "tts-1");
                let settings = openai.settings(env(&[("MY_KEY", "sk-1")]));
                assert_eq!(settings.api_key.as_deref(), Some("sk-1"));
            }
            other => panic!("expected openai provider, got {:?}", other),
        }
        match &config.providers["desk"] {
            ProviderConfig::Local(local) => assert_eq!(local.device, DeviceKind::Memory),
            other => panic!("expected local provider, got {:?}", other),
        }
    }

    #[test]
    fn test_environment_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.json");
        std::fs::write(&path, r#"{"providers": {"mock": {"type": "mock"}}}"#).unwrap();

        let config = AudioConfig::load(
            Some(&path),
            env(&[
                ("AUDIO_DEFAULT_PROVIDER", "mock"),
                ("AUDIO_RECORDINGS_DIR", "/srv/rec"),
                ("AUDIO_CAPTURE_DIR", "/srv/tmp"),
            ]),
        )
        .unwrap();

        assert_eq!(config.default_provider.as_deref(), Some("mock"));
        let library = config.library();
        assert_eq!(library.recordings_dir, PathBuf::from("/srv/rec"));
        assert_eq!(library.capture_dir, PathBuf::from("/srv/tmp"));
        assert_eq!(library.extension, "wav");
    }

    #[test]
    fn test_builtin_providers() {
        let offline = AudioConfig::load(None, env(&[])).unwrap();
        assert!(offline.providers.contains_key("mock"));
        assert!(!offline.providers.contains_key("openai"));

        let online = AudioConfig::builtin(env(&[("OPENAI_API_KEY", "sk-test")]));
        assert!(online.providers.contains_key("openai"));
        assert_eq!(online.default_provider.as_deref(), Some("openai"));
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = AudioConfig::load(Some(&dir.path().join("nope.json")), env(&[]));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"providers": {"x": {"type": "carrier-pigeon"}}}"#).unwrap();
        assert!(matches!(
            AudioConfig::load(Some(&bad), env(&[])),
            Err(ConfigError::Parse(_))
        ));
    }
}
