use crate::{PipelineError, CAPTURE_RATE_HZ, TARGET_RATE_HZ};

/// Downmixes interleaved PCM to mono.
///
/// Stereo is averaged with a saturating clamp; mono passes through.
/// Any other channel count is a configuration error.
pub fn downmix(samples: &[i16], channels: u16) -> Result<Vec<i16>, PipelineError> {
    match channels {
        1 => Ok(samples.to_vec()),
        2 => {
            let mut mono = Vec::with_capacity(samples.len() / 2);
            for pair in samples.chunks_exact(2) {
                let mixed = (pair[0] as i32 + pair[1] as i32) / 2;
                mono.push(mixed.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
            }
            Ok(mono)
        }
        n => Err(PipelineError::InvalidFrame(format!(
            "unsupported channel count {n}"
        ))),
    }
}

/// Linearly resamples mono PCM from `from_hz` to `to_hz`.
///
/// Output length is `round(len * to_hz / from_hz)`, minimum 1 for
/// non-empty input. Linear interpolation is adequate here: the capture
/// side delivers band-limited content, so no anti-aliasing stage is
/// needed in front of a speech recognizer.
pub fn resample(samples: &[i16], from_hz: u32, to_hz: u32) -> Vec<i16> {
    if samples.is_empty() || from_hz == to_hz {
        return samples.to_vec();
    }

    let len = samples.len();
    let out_len = (((len as f64) * to_hz as f64 / from_hz as f64).round() as usize).max(1);
    let step = from_hz as f64 / to_hz as f64;

    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let s = i as f64 * step;
        let i0 = (s.floor() as usize).min(len - 1);
        let i1 = (i0 + 1).min(len - 1);
        let t = s - i0 as f64;
        let value = samples[i0] as f64 * (1.0 - t) + samples[i1] as f64 * t;
        out.push(value.round() as i16);
    }
    out
}

/// The canonical normalization hop: interleaved stereo 48kHz in, mono
/// 16kHz out.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, interleaved_stereo_48k: &[i16]) -> Result<Vec<i16>, PipelineError> {
        let mono = downmix(interleaved_stereo_48k, 2)?;
        Ok(resample(&mono, CAPTURE_RATE_HZ, TARGET_RATE_HZ))
    }
}
