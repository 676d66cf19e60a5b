//! Sample-level helpers for feeding speech models.

use crate::device::StreamFormat;

/// Average interleaved channels into mono floats in `[-1, 1]`.
pub fn to_mono_f32(format: StreamFormat, samples: &[i16]) -> Vec<f32> {
    let channels = format.channels.max(1) as usize;
    samples
        .chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / frame.len() as i32) as f32 / 32768.0
        })
        .collect()
}

/// Linear-interpolation resampler.
pub fn resample_linear(samples: &[f32], sr_in: u32, sr_out: u32) -> Vec<f32> {
    if sr_in == sr_out || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = sr_out as f64 / sr_in as f64;
    let out_len = (samples.len() as f64 * ratio) as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let pos = i as f64 / ratio;
        let i0 = pos.floor() as usize;
        let i1 = (i0 + 1).min(samples.len() - 1);
        let t = pos - i0 as f64;
        out.push(samples[i0] * (1.0 - t) as f32 + samples[i1] * t as f32);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_downmix() {
        let mono = to_mono_f32(StreamFormat::new(16_000, 2), &[100, 300, -200, -400]);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 200.0 / 32768.0).abs() < 1e-6);
        assert!((mono[1] + 300.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn test_resample_48k_to_16k() {
        let input: Vec<f32> = (0..48).map(|i| i as f32).collect();
        let output = resample_linear(&input, 48_000, 16_000);

        assert_eq!(output.len(), 16);
        assert_eq!(output[0], 0.0);
        assert!((output[1] - 3.0).abs() < 1e-4);
        assert_eq!(resample_linear(&input, 16_000, 16_000), input);
    }
}
