use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read};
use std::path::Path;
use tracing::debug;

use super::CodecError;
use crate::device::StreamFormat;

fn pcm_spec(format: StreamFormat) -> WavSpec {
    WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: StreamFormat::BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    }
}

/// Streaming 16-bit PCM writer. Each block is flushed, header included, as
/// soon as it is written so the file on disk is always playable.
pub struct WavSink {
    writer: WavWriter<BufWriter<File>>,
    format: StreamFormat,
}

impl WavSink {
    pub fn create(path: &Path, format: StreamFormat) -> Result<Self, CodecError> {
        let writer = WavWriter::create(path, pcm_spec(format))?;
        debug!("Opened WAV sink {:?}", path);
        Ok(Self { writer, format })
    }

    pub fn write_block(&mut self, samples: &[i16]) -> Result<(), CodecError> {
        for &sample in samples {
            self.writer.write_sample(sample)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Frames written so far.
    pub fn frames(&self) -> u64 {
        self.writer.len() as u64 / self.format.channels.max(1) as u64
    }

    /// Rewrite the header and close the file, returning the frame count.
    pub fn finalize(self) -> Result<u64, CodecError> {
        let frames = self.frames();
        self.writer.finalize()?;
        Ok(frames)
    }
}

/// Block reader that hands out interleaved 16-bit PCM whatever the file's
/// integer width, or from 32-bit float.
pub struct WavSource<R: Read = BufReader<File>> {
    reader: WavReader<R>,
    spec: WavSpec,
}

impl WavSource {
    pub fn open(path: &Path) -> Result<Self, CodecError> {
        Self::from_reader(WavReader::open(path)?)
    }
}

impl<R: Read> WavSource<R> {
    pub fn from_reader(reader: WavReader<R>) -> Result<Self, CodecError> {
        let spec = reader.spec();
        match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 1..=32) | (SampleFormat::Float, 32) => {}
            (sample_format, bits) => {
                return Err(CodecError::Unsupported(format!(
                    "{}-bit {:?} samples",
                    bits, sample_format
                )));
            }
        }
        if spec.channels == 0 {
            return Err(CodecError::Unsupported("zero channels".to_string()));
        }
        Ok(Self { reader, spec })
    }

    /// Format the device must be opened with.
    pub fn format(&self) -> StreamFormat {
        StreamFormat::new(self.spec.sample_rate, self.spec.channels)
    }

    /// Total length of the file in frames.
    pub fn frames(&self) -> u64 {
        self.reader.duration() as u64
    }

    /// Up to `frames` frames, `None` at end of stream.
    pub fn read_block(&mut self, frames: usize) -> Result<Option<Vec<i16>>, CodecError> {
        let wanted = frames * self.spec.channels as usize;
        let mut block = Vec::with_capacity(wanted);

        match self.spec.sample_format {
            SampleFormat::Int => {
                let bits = self.spec.bits_per_sample;
                for sample in self.reader.samples::<i32>().take(wanted) {
                    block.push(int_to_i16(sample?, bits));
                }
            }
            SampleFormat::Float => {
                for sample in self.reader.samples::<f32>().take(wanted) {
                    block.push(float_to_i16(sample?));
                }
            }
        }

        if block.is_empty() {
            Ok(None)
        } else {
            Ok(Some(block))
        }
    }

    pub fn read_all(&mut self) -> Result<Vec<i16>, CodecError> {
        let mut samples = Vec::new();
        while let Some(block) = self.read_block(4096)? {
            samples.extend_from_slice(&block);
        }
        Ok(samples)
    }
}

fn int_to_i16(sample: i32, bits: u16) -> i16 {
    if bits <= 16 {
        (sample << (16 - bits)) as i16
    } else {
        (sample >> (bits - 16)) as i16
    }
}

fn float_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Parse an in-memory WAV file into its format and 16-bit samples.
pub fn decode_wav(bytes: &[u8]) -> Result<(StreamFormat, Vec<i16>), CodecError> {
    let mut source = WavSource::from_reader(WavReader::new(Cursor::new(bytes))?)?;
    let samples = source.read_all()?;
    Ok((source.format(), samples))
}

/// Encode 16-bit samples as an in-memory WAV file.
pub fn encode_wav(format: StreamFormat, samples: &[i16]) -> Result<Vec<u8>, CodecError> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, pcm_spec(format))?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
