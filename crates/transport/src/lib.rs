pub mod client;
pub mod protocol;

pub use client::{InferenceClient, InferenceEvent};
pub use protocol::{ClientMessage, PcmFormat, Transcription, WorkerError, WorkerMessage};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("connection closed")]
    Disconnected,
}
