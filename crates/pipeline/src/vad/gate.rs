use earshot::{VoiceActivityDetector, VoiceActivityProfile};

use super::{FrameActivity, VadMode, VoiceClassifier};
use crate::{PipelineError, TARGET_RATE_HZ};

/// Energy floor for the RMS computation, so digital silence stays finite.
const RMS_FLOOR: f32 = 1e-9;

/// Two-stage voice activity gate.
///
/// Stage one is a cheap RMS-dBFS prefilter: frames below the energy
/// threshold are declared inactive without touching the WebRTC stage.
/// Stage two consults the WebRTC VAD, which carries adaptive noise state
/// and therefore must only ever see one participant's audio.
pub struct VadGate {
    detector: VoiceActivityDetector,
    frame_samples: usize,
    db_threshold: f32,
}

impl VadGate {
    pub fn new(frame_ms: u32, db_threshold: f32, mode: VadMode) -> Result<Self, PipelineError> {
        if !matches!(frame_ms, 10 | 20 | 30) {
            return Err(PipelineError::InvalidFrame(format!(
                "VAD frame must be 10, 20 or 30 ms, got {frame_ms}"
            )));
        }

        let profile = match mode {
            VadMode::Normal => VoiceActivityProfile::QUALITY,
            VadMode::LowBitrate => VoiceActivityProfile::LBR,
            VadMode::Aggressive => VoiceActivityProfile::AGGRESSIVE,
            VadMode::VeryAggressive => VoiceActivityProfile::VERY_AGGRESSIVE,
        };

        Ok(Self {
            detector: VoiceActivityDetector::new(profile),
            frame_samples: (TARGET_RATE_HZ * frame_ms / 1000) as usize,
            db_threshold,
        })
    }

    /// RMS level of a frame in dBFS.
    fn rms_dbfs(frame: &[i16]) -> f32 {
        let mean_sq = frame
            .iter()
            .map(|&s| {
                let x = s as f32 / 32_768.0;
                x * x
            })
            .sum::<f32>()
            / frame.len() as f32;
        20.0 * mean_sq.sqrt().max(RMS_FLOOR).log10()
    }
}

impl VoiceClassifier for VadGate {
    fn classify(&mut self, frame: &[i16]) -> Result<FrameActivity, PipelineError> {
        if frame.len() != self.frame_samples {
            return Err(PipelineError::InvalidFrame(format!(
                "expected {} samples, got {}",
                self.frame_samples,
                frame.len()
            )));
        }

        if Self::rms_dbfs(frame) < self.db_threshold {
            return Ok(FrameActivity::Inactive);
        }

        match self.detector.predict_16khz(frame) {
            Ok(true) => Ok(FrameActivity::Active),
            Ok(false) => Ok(FrameActivity::Inactive),
            Err(e) => Err(PipelineError::InvalidFrame(format!(
                "WebRTC VAD rejected frame: {e:?}"
            ))),
        }
    }

    fn frame_samples(&self) -> usize {
        self.frame_samples
    }
}
