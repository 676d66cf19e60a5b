//! Container codec: PCM in and out of WAV files.

mod pcm;
mod wav;

pub use pcm::{resample_linear, to_mono_f32};
pub use wav::{WavSink, WavSource, decode_wav, encode_wav};

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Unsupported audio container: {0}")]
    Unsupported(String),
}

/// Run file-backed codec work on the blocking pool.
///
/// Codecs own a file handle, so callers move them into `work` and get them
/// back in the result.
pub async fn run_blocking<T, F>(work: F) -> Result<T, CodecError>
where
    F: FnOnce() -> Result<T, CodecError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CodecError::Io(io::Error::other(format!("codec task failed: {}", e))))?
}
