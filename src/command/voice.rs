use clap::error::ErrorKind;
use tracing::{debug, info};

use super::args::{ArgsError, VoiceAction, VoiceArgs};
use crate::cancel::CancellationSource;
use crate::error::AudioError;
use crate::service::AudioService;
use crate::types::{PlaybackOptions, RecordingOptions, TextToSpeechOptions, TranscriptionOptions};

pub const USAGE: &str = "Unknown action. Use: record, transcribe, speak, playback, provider";

pub fn help() -> Vec<&'static str> {
    vec![
        "/voice [action] <text/filename> [options] - Voice operations",
        "  Actions:",
        "    record            - Record audio from the input device",
        "    transcribe <file> - Transcribe an audio file",
        "    speak <text>      - Convert text to speech",
        "    playback <file>   - Play an audio file",
        "    provider [name]   - Show/set the active provider",
        "",
        "  Options:",
        "    --model <name>     - Model to use",
        "    --voice <id>       - Voice ID",
        "    --speed <n>        - Speech speed",
        "    --format <fmt>     - Audio format",
        "    --language <code>  - Language code",
        "    --timeout <ms>     - Stop recording after this long",
        "    --duration <ms>    - Stop playback after this long",
        "",
        "  Examples:",
        "    /voice record --timeout 5000",
        "    /voice transcribe recording.wav",
        "    /voice speak \"Hello world\"",
        "    /voice playback greeting.wav",
        "    /voice provider openai",
    ]
}

/// Where command output goes.
pub trait Output {
    fn info(&mut self, line: String);
    fn error(&mut self, line: String);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Info(String),
    Error(String),
}

impl Output for Vec<Reply> {
    fn info(&mut self, line: String) {
        self.push(Reply::Info(line));
    }

    fn error(&mut self, line: String) {
        self.push(Reply::Error(line));
    }
}

/// Parse the text after `/voice`.
///
/// `--help` output goes to `out` as info lines and any other argument error
/// as error lines; both yield `None`.
pub fn parse(remainder: &str, out: &mut dyn Output) -> Option<VoiceArgs> {
    match VoiceArgs::parse_line(remainder) {
        Ok(args) => Some(args),
        Err(ArgsError::Usage(err)) if err.kind() == ErrorKind::DisplayHelp => {
            for line in err.to_string().lines() {
                out.info(line.to_string());
            }
            None
        }
        Err(err) => {
            debug!("Rejected /voice arguments: {}", err);
            let text = err.to_string();
            for line in text.lines().filter(|line| !line.trim().is_empty()) {
                out.error(line.to_string());
            }
            None
        }
    }
}

/// Run one `/voice` command against `service`.
///
/// `interrupt` ends a recording or a playback; the caller usually wires it
/// to Ctrl+C. Usage problems are reported through `out`, audio failures are returned.
pub async fn execute(
    service: &AudioService,
    args: VoiceArgs,
    interrupt: &CancellationSource,
    out: &mut dyn Output,
) -> Result<(), AudioError> {
    match args.action.unwrap_or(VoiceAction::Help) {
        VoiceAction::Help => {
            for line in help() {
                out.info(line.to_string());
            }
        }
        VoiceAction::Record { format, timeout } => {
            let options = RecordingOptions {
                format,
                timeout_ms: timeout,
                ..RecordingOptions::default()
            };
            if let Some(limit) = options.timeout() {
                interrupt.cancel_after(limit);
            }

            out.info("Recording... Press Ctrl+C to stop".to_string());
            let result = service.record(interrupt.signal(), &options).await?;
            out.info(format!(
                "Recording saved: {} ({:.1}s)",
                result.file_path.display(),
                result.duration_secs()
            ));
        }
        VoiceAction::Transcribe { file, model, language } => {
            let Some(file) = file else {
                out.error("Usage: /voice transcribe <filename> [flags]".to_string());
                return Ok(());
            };
            let options = TranscriptionOptions {
                model,
                language,
                ..TranscriptionOptions::default()
            };

            let result = service.transcribe(file.as_str(), &options).await?;
            out.info(format!("Transcription: {}", result.text));
            if let Some(language) = result.language {
                out.info(format!("Language: {}", language));
            }
        }
        VoiceAction::Speak { text, model, voice, speed, format } => {
            let text = text.join(" ");
            if text.trim().is_empty() {
                out.error("Usage: /voice speak <text> [flags]".to_string());
                return Ok(());
            }
            let options = TextToSpeechOptions {
                model,
                voice,
                speed,
                format,
                ..TextToSpeechOptions::default()
            };

            let path = service.speak_to_file(&text, &options, None).await?;
            out.info(format!("Speech saved: {}", path.display()));
        }
        VoiceAction::Playback { file, duration } => {
            let Some(file) = file else {
                out.error("Usage: /voice playback <filename> [flags]".to_string());
                return Ok(());
            };
            let options = PlaybackOptions {
                timeout_ms: duration,
                ..PlaybackOptions::default()
            };

            let signal = interrupt.signal();
            tokio::select! {
                played = service.playback(&file, &options) => {
                    out.info(format!("Played: {}", played?.display()));
                }
                _ = signal.cancelled() => {
                    let stopped = service.stop_playback().await?;
                    out.info(format!("Playback stopped: {}", stopped.display()));
                }
            }
        }
        VoiceAction::Provider { name } => {
            let available = service.list_providers();
            match name {
                None => {
                    let active = service.active_provider();
                    out.info(format!("Active provider: {}", active.as_deref().unwrap_or("none")));
                    out.info(format!("Available providers: {}", available.join(", ")));
                }
                Some(name) if available.contains(&name) => {
                    service.set_active_provider(&name)?;
                    out.info(format!("Provider set to: {}", name));
                }
                Some(name) => {
                    out.error(format!(
                        "Provider '{}' not available. Available: {}",
                        name,
                        available.join(", ")
                    ));
                }
            }
        }
        VoiceAction::Unknown(words) => {
            info!("Unknown /voice action '{}'", words.first().map(String::as_str).unwrap_or(""));
            out.info(USAGE.to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AudioConfig, ProviderConfig};
    use crate::engine::{PlaybackDefaults, RecordingDefaults};
    use std::collections::BTreeMap;

    fn service(dir: &std::path::Path) -> AudioService {
        let mut providers = BTreeMap::new();
        providers.insert("mock".to_string(), ProviderConfig::Mock);
        providers.insert("spare".to_string(), ProviderConfig::Mock);
        let config = AudioConfig {
            default_provider: Some("mock".to_string()),
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
        };
        AudioService::from_config(&config).unwrap()
    }

    async fn run(service: &AudioService, line: &str) -> Result<Vec<Reply>, AudioError> {
        let mut out = Vec::new();
        let args = VoiceArgs::parse_line(line).unwrap();
        execute(service, args, &CancellationSource::new(), &mut out).await?;
        Ok(out)
    }

    fn infos(replies: &[Reply]) -> Vec<&str> {
        replies
            .iter()
            .filter_map(|reply| match reply {
                Reply::Info(line) => Some(line.as_str()),
                Reply::Error(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_parse_reports_bad_arguments() {
        let mut out = Vec::new();
        let args = parse("  transcribe memo.wav --language en", &mut out).unwrap();
        assert_eq!(
            args.action,
            Some(VoiceAction::Transcribe {
                file: Some("memo.wav".to_string()),
                model: None,
                language: Some("en".to_string()),
            })
        );
        assert!(out.is_empty());

        assert!(parse("speak hi --speed fast", &mut out).is_none());
        assert!(matches!(&out[0], Reply::Error(line) if line.contains("--speed")));
        assert!(out.iter().all(|reply| matches!(reply, Reply::Error(_))));

        let mut out = Vec::new();
        assert!(parse("speak --help", &mut out).is_none());
        assert!(!out.is_empty());
        assert!(out.iter().all(|reply| matches!(reply, Reply::Info(_))));
        assert!(infos(&out).iter().any(|line| line.contains("--voice")));
    }

    #[tokio::test]
    async fn test_provider_show_and_set() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let replies = run(&service, "provider").await.unwrap();
        assert_eq!(
            infos(&replies),
            vec!["Active provider: mock", "Available providers: mock, spare"]
        );

        let replies = run(&service, "provider spare").await.unwrap();
        assert_eq!(replies, vec![Reply::Info("Provider set to: spare".to_string())]);
        assert_eq!(service.active_provider().as_deref(), Some("spare"));

        let replies = run(&service, "provider cloud").await.unwrap();
        assert_eq!(
            replies,
            vec![Reply::Error(
                "Provider 'cloud' not available. Available: mock, spare".to_string()
            )]
        );
        assert_eq!(service.active_provider().as_deref(), Some("spare"));
    }

    #[tokio::test]
    async fn test_usage_and_unknown_action() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let replies = run(&service, "transcribe").await.unwrap();
        assert!(matches!(&replies[..], [Reply::Error(line)] if line.starts_with("Usage:")));

        let replies = run(&service, "dance").await.unwrap();
        assert_eq!(replies, vec![Reply::Info(USAGE.to_string())]);

        let replies = run(&service, "help").await.unwrap();
        assert_eq!(replies.len(), help().len());

        let replies = run(&service, "").await.unwrap();
        assert_eq!(replies.len(), help().len());
    }

    #[tokio::test]
    async fn test_speak_saves_to_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let replies = run(&service, "speak \"Hello world\" --speed 2").await.unwrap();
        let saved = infos(&replies)[0].strip_prefix("Speech saved: ").unwrap().to_string();
        assert!(saved.starts_with(&dir.path().join("out").display().to_string()));
        assert!(saved.ends_with(".wav"));
        assert!(std::path::Path::new(&saved).is_file());
    }

    #[tokio::test]
    async fn test_speak_joins_quoted_words() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let replies = run(&service, "speak \"Hello\" \"world\"").await.unwrap();
        assert!(infos(&replies)[0].starts_with("Speech saved: "));

        let replies = run(&service, "speak \"use --model carefully\"").await.unwrap();
        assert!(infos(&replies)[0].starts_with("Speech saved: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_with_timeout_then_transcribe() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let replies = run(&service, "record --timeout 300").await.unwrap();
        let lines = infos(&replies);
        assert_eq!(lines[0], "Recording... Press Ctrl+C to stop");
        assert!(lines[1].starts_with("Recording saved: "));

        let files = service.list_audio_files(None).unwrap();
        assert_eq!(files.len(), 1);

        let replies = run(&service, &format!("transcribe {}", files[0])).await.unwrap();
        assert!(infos(&replies)[0].starts_with("Transcription: "));

        let err = run(&service, "transcribe nothing-here").await.unwrap_err();
        assert!(matches!(err, AudioError::FileNotFound(_)));
    }
}
