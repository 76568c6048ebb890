use tracing::debug;

use crate::vad::VoiceClassifier;
use crate::{now_epoch, PipelineError, VoiceSegment, TARGET_RATE_HZ};

/// Segmentation tunables. Durations are in milliseconds of 16kHz mono
/// audio.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    pub silence_gap_ms: u32,
    pub min_segment_ms: u32,
    pub max_segment_ms: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            silence_gap_ms: 1250,
            min_segment_ms: 200,
            max_segment_ms: 30000,
        }
    }
}

/// Per-participant utterance segmenter.
///
/// Frames normalized PCM through a [`VoiceClassifier`] and accumulates
/// active audio into segments. Short silences inside an utterance are
/// buffered and stitched back when speech resumes; a silence run of
/// `silence_gap_ms` (or the `max_segment_ms` cap) finalizes the segment.
/// Segments whose active audio never reaches `min_segment_ms` are
/// dropped at finalization time.
pub struct Segmenter {
    participant_id: String,
    classifier: Box<dyn VoiceClassifier>,
    cfg: SegmenterConfig,

    /// Samples queued by the capture side, awaiting a flush pass.
    in_queue: Vec<i16>,
    /// Tail samples of the previous pass that did not fill a VAD frame.
    carry: Vec<i16>,

    in_speech: bool,
    /// Accumulated segment audio. Ends on an active frame by
    /// construction: silence only enters via stitch-back, which is
    /// always followed by the active frame that triggered it.
    frames: Vec<i16>,
    /// Contiguous inactive frames observed while in speech, kept for
    /// stitch-back if speech resumes before the gap threshold.
    pending_silence: Vec<i16>,
    started_ts: f64,
    silence_samples: usize,
    /// Wall clock of the last pass that processed at least one frame;
    /// basis for the silence fallback when the capture source goes
    /// quiet and stops delivering audio altogether.
    last_frame_wall: f64,
    next_index: u32,
}

impl Segmenter {
    pub fn new(
        participant_id: impl Into<String>,
        classifier: Box<dyn VoiceClassifier>,
        cfg: SegmenterConfig,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            classifier,
            cfg,
            in_queue: Vec::new(),
            carry: Vec::new(),
            in_speech: false,
            frames: Vec::new(),
            pending_silence: Vec::new(),
            started_ts: 0.0,
            silence_samples: 0,
            last_frame_wall: now_epoch(),
            next_index: 0,
        }
    }

    /// Queues normalized mono 16kHz samples for the next flush pass.
    pub fn push(&mut self, samples: &[i16]) {
        self.in_queue.extend_from_slice(samples);
    }

    /// Runs one flush pass over the queued audio and returns any
    /// finalized segments.
    pub fn flush(&mut self) -> Result<Vec<VoiceSegment>, PipelineError> {
        let frame_len = self.classifier.frame_samples();
        let mut work = std::mem::take(&mut self.carry);
        work.append(&mut self.in_queue);

        let whole = work.len() / frame_len * frame_len;
        let processed_frames = whole / frame_len;
        let mut emitted = Vec::new();

        for frame in work[..whole].chunks_exact(frame_len) {
            self.step(frame, &mut emitted)?;
        }
        self.carry = work[whole..].to_vec();

        if processed_frames > 0 {
            self.last_frame_wall = now_epoch();
        }

        if self.in_speech && processed_frames == 0 {
            // Nothing arrived this pass: the platform has stopped
            // delivering frames, so measure the gap on the wall clock.
            let silent_ms = ((now_epoch() - self.last_frame_wall).max(0.0) * 1000.0) as u32;
            if silent_ms >= self.cfg.silence_gap_ms {
                if let Some(segment) = self.finalize() {
                    emitted.push(segment);
                }
            }
        }

        Ok(emitted)
    }

    /// Advances the state machine by one classified frame.
    fn step(&mut self, frame: &[i16], emitted: &mut Vec<VoiceSegment>) -> Result<(), PipelineError> {
        use crate::vad::FrameActivity::*;

        match (self.classifier.classify(frame)?, self.in_speech) {
            (Active, false) => {
                self.in_speech = true;
                self.started_ts = now_epoch();
                self.frames.extend_from_slice(frame);
            }
            (Active, true) => {
                if !self.pending_silence.is_empty() {
                    let mut stitched = std::mem::take(&mut self.pending_silence);
                    self.frames.append(&mut stitched);
                }
                self.silence_samples = 0;
                self.frames.extend_from_slice(frame);
            }
            (Inactive, true) => {
                self.pending_silence.extend_from_slice(frame);
                self.silence_samples += frame.len();
            }
            (Inactive, false) => {}
        }

        // Finalization is checked per frame so that a silence gap or a
        // length overrun in the middle of a large batch cuts the segment
        // at the right frame instead of at the end of the pass.
        if self.in_speech {
            let silent_ms = (self.silence_samples as u64 * 1000 / TARGET_RATE_HZ as u64) as u32;
            if silent_ms >= self.cfg.silence_gap_ms || self.duration_ms() >= self.cfg.max_segment_ms
            {
                if let Some(segment) = self.finalize() {
                    emitted.push(segment);
                }
            }
        }

        Ok(())
    }

    /// Closes the current segment: trailing silence stays behind in
    /// `pending_silence` and is discarded, the accumulated audio becomes
    /// the segment PCM. Returns `None` (dropping the audio) when the
    /// segment never reached the minimum length.
    fn finalize(&mut self) -> Option<VoiceSegment> {
        let duration_ms = self.duration_ms();
        let pcm = std::mem::take(&mut self.frames);
        let started_ts = self.started_ts;

        self.in_speech = false;
        self.pending_silence.clear();
        self.silence_samples = 0;
        self.started_ts = 0.0;

        if duration_ms < self.cfg.min_segment_ms {
            debug!(
                participant = %self.participant_id,
                duration_ms,
                "segment below minimum length, dropped"
            );
            return None;
        }

        let index = self.next_index;
        self.next_index += 1;

        let captured_ts = started_ts + pcm.len() as f64 / TARGET_RATE_HZ as f64;
        debug!(
            participant = %self.participant_id,
            index,
            duration_ms,
            "segment finalized"
        );

        Some(VoiceSegment {
            participant_id: self.participant_id.clone(),
            index,
            started_ts,
            captured_ts,
            duration_ms,
            pcm,
            prompt: None,
        })
    }

    /// Length of the current segment in milliseconds, stitched silence
    /// included.
    fn duration_ms(&self) -> u32 {
        (self.frames.len() as u64 * 1000 / TARGET_RATE_HZ as u64) as u32
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    /// Whether an utterance is currently open.
    pub fn in_speech(&self) -> bool {
        self.in_speech
    }
}
