//! Offline stand-ins that never touch the network.

use async_trait::async_trait;
use tracing::debug;

use super::{BackendError, SpeechBackend, TranscriptionBackend};
use crate::codec::{decode_wav, encode_wav};
use crate::device::StreamFormat;
use crate::types::{
    AudioResult, TextToSpeechOptions, TranscribedSegment, TranscriptionOptions, TranscriptionResult,
};

/// Describes the audio it is given instead of recognizing speech.
#[derive(Debug, Clone, Default)]
pub struct MockTranscriber;

#[async_trait]
impl TranscriptionBackend for MockTranscriber {
    fn name(&self) -> &str {
        "mock"
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        options: &TranscriptionOptions,
    ) -> Result<TranscriptionResult, BackendError> {
        let language = options.language.clone().or_else(|| Some("en".to_string()));

        let Ok((format, samples)) = decode_wav(&audio) else {
            return Ok(TranscriptionResult {
                text: format!("[mock transcription of {} bytes]", audio.len()),
                language,
                ..TranscriptionResult::default()
            });
        };

        let duration = format.duration_of(format.frames_in(samples.len())).as_secs_f64();
        let text = format!(
            "[mock transcription of {:.2}s at {} Hz, {} ch]",
            duration, format.sample_rate, format.channels
        );
        debug!("Mock transcription: {}", text);

        Ok(TranscriptionResult {
            segments: vec![TranscribedSegment {
                start: 0.0,
                end: duration,
                text: text.clone(),
            }],
            text,
            language,
            duration_secs: Some(duration),
        })
    }
}

const MIN_SPEED: f32 = 0.25;
const MAX_SPEED: f32 = 4.0;

/// Speaks every text as a 440 Hz tone, longer for longer text.
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    pub sample_rate: u32,
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self { sample_rate: 22_050 }
    }
}

#[async_trait]
impl SpeechBackend for MockSynthesizer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn synthesize(
        &self,
        text: &str,
        options: &TextToSpeechOptions,
    ) -> Result<AudioResult, BackendError> {
        let sr = self.sample_rate.max(8_000);
        let speed = options
            .speed
            .filter(|s| *s > 0.0)
            .map_or(1.0, |s| s.clamp(MIN_SPEED, MAX_SPEED));
        let dur_s = (text.len() as f32 / 10.0).clamp(0.2, 1.0) / speed;
        let frames = (sr as f32 * dur_s) as usize;

        let freq = 440.0_f32;
        let samples: Vec<i16> = (0..frames)
            .map(|n| {
                let t = n as f32 / sr as f32;
                ((2.0 * std::f32::consts::PI * freq * t).sin() * 3000.0) as i16
            })
            .collect();

        // Only WAV is produced whatever format was asked for.
        let data = encode_wav(StreamFormat::new(sr, 1), &samples)?;
        Ok(AudioResult {
            data,
            format: "wav".to_string(),
        })
    }
}
