use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{BackendError, TranscriptionBackend};
use crate::codec::{decode_wav, resample_linear, to_mono_f32};
use crate::types::{TranscribedSegment, TranscriptionOptions, TranscriptionResult};

pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Local transcription with a whisper.cpp model file.
pub struct WhisperTranscriber {
    ctx: Arc<WhisperContext>,
    model_path: PathBuf,
    /// Number of threads to use
    n_threads: i32,
}

impl WhisperTranscriber {
    pub fn load(model_path: &Path) -> Result<Self, BackendError> {
        info!("Loading Whisper model from {:?}...", model_path);

        let path = model_path
            .to_str()
            .ok_or_else(|| BackendError::Model(format!("non UTF-8 model path: {:?}", model_path)))?;
        let ctx = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| BackendError::Model(format!("Failed to load model: {}", e)))?;

        let n_threads = std::thread::available_parallelism()
            .map(|p| (p.get() as i32).max(1))
            .unwrap_or(4);

        info!("Whisper model loaded successfully (using {} threads)", n_threads);
        Ok(Self {
            ctx: Arc::new(ctx),
            model_path: model_path.to_path_buf(),
            n_threads,
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

fn run_inference(
    ctx: &WhisperContext,
    samples: &[f32],
    language: Option<&str>,
    prompt: Option<&str>,
    n_threads: i32,
) -> Result<TranscriptionResult, BackendError> {
    let fail = |what: &str, e: whisper_rs::WhisperError| BackendError::Model(format!("{}: {}", what, e));

    // Greedy sampling, beam search is 2-3x slower
    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_n_threads(n_threads);
    params.set_token_timestamps(false);
    params.set_no_speech_thold(0.6);
    params.set_temperature(0.0);
    params.set_temperature_inc(0.2);
    params.set_no_context(true);
    params.set_suppress_non_speech_tokens(true);
    params.set_language(Some(language.unwrap_or("auto")));
    if let Some(prompt) = prompt {
        params.set_initial_prompt(prompt);
    }
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);
    params.set_print_special(false);

    let mut state = ctx
        .create_state()
        .map_err(|e| fail("Failed to create state", e))?;
    state
        .full(params, samples)
        .map_err(|e| fail("Inference failed", e))?;

    let num_segments = state
        .full_n_segments()
        .map_err(|e| fail("Failed to get segments", e))?;

    let mut segments = Vec::new();
    let mut text = String::new();
    for i in 0..num_segments {
        let segment_text = state
            .full_get_segment_text(i)
            .map_err(|e| fail("Failed to get text", e))?;
        let segment_text = segment_text.trim().to_string();
        if segment_text.is_empty() {
            continue;
        }

        // Timestamps are in centiseconds
        let start = state
            .full_get_segment_t0(i)
            .map_err(|e| fail("Failed to get start time", e))? as f64
            / 100.0;
        let end = state
            .full_get_segment_t1(i)
            .map_err(|e| fail("Failed to get end time", e))? as f64
            / 100.0;

        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(&segment_text);
        segments.push(TranscribedSegment {
            start,
            end,
            text: segment_text,
        });
    }

    let language = state
        .full_lang_id_from_state()
        .ok()
        .and_then(|id| whisper_rs::get_lang_str(id).map(|s| s.to_string()));

    Ok(TranscriptionResult {
        text,
        language,
        duration_secs: Some(samples.len() as f64 / WHISPER_SAMPLE_RATE as f64),
        segments,
    })
}

#[async_trait]
impl TranscriptionBackend for WhisperTranscriber {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        options: &TranscriptionOptions,
    ) -> Result<TranscriptionResult, BackendError> {
        let (format, samples) = decode_wav(&audio)?;
        let mono = to_mono_f32(format, &samples);
        let samples = resample_linear(&mono, format.sample_rate, WHISPER_SAMPLE_RATE);

        let ctx = Arc::clone(&self.ctx);
        let language = options.language.clone().filter(|l| !l.is_empty());
        let prompt = options.prompt.clone();
        let n_threads = self.n_threads;

        let started = std::time::Instant::now();
        let result = tokio::task::spawn_blocking(move || {
            run_inference(&ctx, &samples, language.as_deref(), prompt.as_deref(), n_threads)
        })
        .await
        .map_err(|e| BackendError::Model(format!("Inference task failed: {}", e)))??;

        info!(
            "Transcribed {:.1}s of audio in {:.1}s ({} segments)",
            result.duration_secs.unwrap_or_default(),
            started.elapsed().as_secs_f32(),
            result.segments.len()
        );
        Ok(result)
    }
}
