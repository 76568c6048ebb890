use std::convert::TryFrom;

use audiopus::coder::Decoder;
use audiopus::packet::Packet;
use audiopus::{Channels, MutSignals, SampleRate};

use crate::PipelineError;

/// Maximum Opus frame: 120ms at 48kHz = 5760 samples/channel, stereo = 11520.
const MAX_FRAME_SIZE: usize = 5760 * 2;

/// Per-participant Opus decoder for the raw-packet ingest path.
///
/// Decodes to the capture boundary's native format, interleaved stereo
/// 16-bit PCM at 48kHz, which then flows through the normal
/// normalization hop. The decoder carries prediction state, so one
/// instance serves exactly one participant stream.
pub struct OpusIngest {
    decoder: Decoder,
    decode_buf: Vec<i16>,
}

impl OpusIngest {
    pub fn new() -> Result<Self, PipelineError> {
        let decoder = Decoder::new(SampleRate::Hz48000, Channels::Stereo)
            .map_err(|e| PipelineError::OpusDecode(format!("decoder init: {e:?}")))?;
        Ok(Self {
            decoder,
            decode_buf: vec![0i16; MAX_FRAME_SIZE],
        })
    }

    /// Decodes one Opus packet into interleaved stereo 48kHz PCM.
    pub fn decode(&mut self, opus_data: &[u8]) -> Result<Vec<i16>, PipelineError> {
        let packet = Packet::try_from(opus_data)
            .map_err(|e| PipelineError::OpusDecode(format!("packet: {e:?}")))?;
        let output = MutSignals::try_from(&mut self.decode_buf[..])
            .map_err(|e| PipelineError::OpusDecode(format!("output buffer: {e:?}")))?;

        let samples_per_channel = self
            .decoder
            .decode(Some(packet), output, false)
            .map_err(|e| PipelineError::OpusDecode(format!("decode: {e:?}")))?;

        Ok(self.decode_buf[..samples_per_channel * 2].to_vec())
    }

    /// Generates a packet-loss concealment frame. Call once per missing
    /// packet when the upstream sequence shows a gap.
    pub fn conceal_loss(&mut self) -> Result<Vec<i16>, PipelineError> {
        let output = MutSignals::try_from(&mut self.decode_buf[..])
            .map_err(|e| PipelineError::OpusDecode(format!("output buffer: {e:?}")))?;

        let samples_per_channel = self
            .decoder
            .decode(None, output, false)
            .map_err(|e| PipelineError::OpusDecode(format!("PLC: {e:?}")))?;

        Ok(self.decode_buf[..samples_per_channel * 2].to_vec())
    }
}
