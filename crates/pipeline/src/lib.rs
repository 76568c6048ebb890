pub mod opus;
pub mod resampler;
pub mod segmenter;
pub mod vad;

pub use opus::OpusIngest;
pub use resampler::{downmix, resample, Normalizer};
pub use segmenter::{Segmenter, SegmenterConfig};
pub use vad::{FrameActivity, VadGate, VadMode, VoiceClassifier};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical sample rate after normalization (what the recognizer expects).
pub const TARGET_RATE_HZ: u32 = 16_000;
/// Sample rate the voice platform captures at.
pub const CAPTURE_RATE_HZ: u32 = 48_000;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("Opus decode error: {0}")]
    OpusDecode(String),
}

/// An utterance produced by the segmenter: mono 16kHz 16-bit PCM with
/// trailing silence trimmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSegment {
    pub participant_id: String,
    /// Per-participant monotone counter, starting at 0.
    pub index: u32,
    /// Wall-clock epoch seconds of the first active sample.
    pub started_ts: f64,
    /// Wall-clock epoch seconds of the last active sample.
    pub captured_ts: f64,
    pub duration_ms: u32,
    pub pcm: Vec<i16>,
    /// Contextual hint for the recognizer, attached at emission time.
    pub prompt: Option<String>,
}

impl VoiceSegment {
    /// Segment PCM as little-endian bytes, the wire representation.
    pub fn pcm_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pcm.len() * 2);
        for sample in &self.pcm {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }
}

/// Reinterprets little-endian PCM bytes as i16 samples. A trailing odd
/// byte is ignored.
pub fn samples_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Wall-clock seconds since the Unix epoch.
pub fn now_epoch() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
