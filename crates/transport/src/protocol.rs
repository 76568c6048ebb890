//! Wire contract with the ASR worker: JSON text frames over WebSocket,
//! discriminated by `type`, protocol version 1.
//!
//! Correlation is `(id, index)` implicit: the worker may interleave
//! responses across participants but must preserve per-participant FIFO
//! order.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use scribe_pipeline::VoiceSegment;

pub const PROTOCOL_VERSION: u8 = 1;

/// Shape of the PCM payload carried by an `audio.segment` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmFormat {
    pub sr: u32,
    pub channels: u16,
    pub sample_width: u8,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sr: 16_000,
            channels: 1,
            sample_width: 2,
        }
    }
}

/// Messages this side sends to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "audio.segment")]
    AudioSegment {
        v: u8,
        /// Participant id.
        id: String,
        /// Per-participant segment counter.
        index: u32,
        pcm_format: PcmFormat,
        started_ts: f64,
        capture_ts: f64,
        /// Base64 of the segment PCM (little-endian).
        data_b64: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },
}

impl ClientMessage {
    /// Wraps a finalized segment for the wire.
    pub fn audio_segment(segment: &VoiceSegment) -> Self {
        Self::AudioSegment {
            v: PROTOCOL_VERSION,
            id: segment.participant_id.clone(),
            index: segment.index,
            pcm_format: PcmFormat::default(),
            started_ts: segment.started_ts,
            capture_ts: segment.captured_ts,
            data_b64: BASE64.encode(segment.pcm_le_bytes()),
            prompt: segment.prompt.clone(),
        }
    }
}

/// A completed transcription for a previously submitted segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub v: u8,
    pub id: String,
    pub text: String,
    pub capture_ts: f64,
    pub end_ts: f64,
}

/// A per-job failure reported by the worker. Non-fatal: the connection
/// stays up and the affected segment simply never reaches the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerError {
    pub v: u8,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Messages the worker sends back. Anything that fails to parse against
/// this schema is a protocol violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    #[serde(rename = "transcription")]
    Transcription(Transcription),
    #[serde(rename = "error")]
    Error(WorkerError),
}
