use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub session: SessionSettings,
    pub vad: VadSettings,
    pub segmenter: SegmenterSettings,
    pub inference: InferenceSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionSettings {
    /// Root directory for per-session data (`<data_dir>/<session_name>/`).
    pub data_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VadSettings {
    /// RMS energy floor in dBFS below which a frame is silent without
    /// consulting the WebRTC stage.
    pub db_threshold: f32,
    /// VAD frame length in milliseconds (10, 20 or 30 at 16kHz).
    pub frame_ms: u32,
    /// WebRTC VAD mode: "normal", "low_bitrate", "aggressive",
    /// "very_aggressive".
    pub webrtc_mode: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SegmenterSettings {
    /// Contiguous silence that finalizes an utterance, in milliseconds.
    pub silence_gap_ms: u32,
    /// Segments with less active audio than this are dropped.
    pub min_segment_ms: u32,
    /// Segments are force-finalized at this length.
    pub max_segment_ms: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceSettings {
    /// WebSocket URL of the ASR worker.
    pub url: String,
    /// Base decoding prompt prepended to the rolling context.
    pub prompt: String,
    /// Maximum number of recent words kept in the rolling prompt context.
    pub context_words: usize,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("SCRIBE"),
            )
            .set_default("session.data_dir", "data")?
            .set_default("vad.db_threshold", -45.0)?
            .set_default("vad.frame_ms", 30)?
            .set_default("vad.webrtc_mode", "aggressive")?
            .set_default("segmenter.silence_gap_ms", 1250)?
            .set_default("segmenter.min_segment_ms", 200)?
            .set_default("segmenter.max_segment_ms", 30000)?
            .set_default("inference.url", "ws://127.0.0.1:8760")?
            .set_default("inference.prompt", "")?
            .set_default("inference.context_words", 40)?
            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            session: SessionSettings {
                data_dir: "data".to_string(),
            },
            vad: VadSettings {
                db_threshold: -45.0,
                frame_ms: 30,
                webrtc_mode: "aggressive".to_string(),
            },
            segmenter: SegmenterSettings {
                silence_gap_ms: 1250,
                min_segment_ms: 200,
                max_segment_ms: 30000,
            },
            inference: InferenceSettings {
                url: "ws://127.0.0.1:8760".to_string(),
                prompt: String::new(),
                context_words: 40,
            },
        }
    }
}
