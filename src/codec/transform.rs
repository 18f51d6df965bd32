//! Boundary around the stateful native codec
//!
//! Everything the stages need from the codec goes through these three
//! traits: create an encoder or decoder handle, send control requests,
//! and run one encode or decode call. Results follow the native
//! convention (non-negative count on success, negative error code on
//! failure) so the mapping into [`ErrorCode`] happens in one place, in the
//! stages. Handles are owned resources: dropping one destroys the native
//! state. Calls on one handle must not run concurrently, which `&mut self`
//! enforces.

use std::sync::Arc;

use crate::config::Application;
use crate::error::ErrorCode;

/// Encoder control requests, numbered as in `opus_defines.h`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CtlRequest {
    SetBitrate,
    SetBandwidth,
    SetComplexity,
    SetInbandFec,
    SetPacketLossPerc,
    SetDtx,
    SetForceChannels,
    SetSignal,
    SetPredictionDisabled,
}

impl CtlRequest {
    pub fn id(&self) -> i32 {
        match self {
            CtlRequest::SetBitrate => 4002,
            CtlRequest::SetBandwidth => 4008,
            CtlRequest::SetComplexity => 4010,
            CtlRequest::SetInbandFec => 4012,
            CtlRequest::SetPacketLossPerc => 4014,
            CtlRequest::SetDtx => 4016,
            CtlRequest::SetForceChannels => 4022,
            CtlRequest::SetSignal => 4024,
            CtlRequest::SetPredictionDisabled => 4042,
        }
    }
}

/// Live native encoder state
pub trait EncoderHandle: Send {
    /// Apply one control request; 0 on success, negative code on failure
    fn control(&mut self, request: CtlRequest, value: i32) -> i32;

    /// Encode one frame of `frame_size` samples per channel into `packet`.
    ///
    /// Returns the packet length in bytes, or a negative code.
    fn encode(&mut self, pcm: &[i16], frame_size: usize, packet: &mut [u8]) -> i32;
}

/// Live native decoder state
pub trait DecoderHandle: Send {
    /// Decode one packet, or conceal a lost one when `packet` is `None`.
    ///
    /// Returns decoded samples per channel, or a negative code.
    fn decode(&mut self, packet: Option<&[u8]>, frame_size: usize, pcm: &mut [i16], fec: bool)
        -> i32;
}

/// Factory for codec handles
pub trait CodecBackend: Send + Sync {
    fn create_encoder(
        &self,
        sample_rate: u32,
        channels: u8,
        application: Application,
    ) -> Result<Box<dyn EncoderHandle>, ErrorCode>;

    fn create_decoder(
        &self,
        sample_rate: u32,
        channels: u8,
    ) -> Result<Box<dyn DecoderHandle>, ErrorCode>;
}

/// Backend handle as stored by stages
pub type SharedBackend = Arc<dyn CodecBackend>;

/// Unpack little-endian 16-bit PCM bytes into samples
pub(crate) fn bytes_to_samples(bytes: &[u8], samples: &mut [i16]) {
    for (sample, pair) in samples.iter_mut().zip(bytes.chunks_exact(2)) {
        *sample = i16::from_le_bytes([pair[0], pair[1]]);
    }
}

/// Pack samples into little-endian 16-bit PCM bytes
pub(crate) fn samples_to_bytes(samples: &[i16], bytes: &mut [u8]) {
    for (pair, sample) in bytes.chunks_exact_mut(2).zip(samples) {
        pair.copy_from_slice(&sample.to_le_bytes());
    }
}
