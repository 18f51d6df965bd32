//! PCM stream format description and codec-facing validation

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{CODEC_BIT_DEPTH, SUPPORTED_SAMPLE_RATES, VALID_FRAME_DURATIONS_US};
use crate::error::ConfigurationError;

/// Immutable description of a raw PCM byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    sample_rate: u32,
    bits: u8,
    channels: u8,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, bits: u8, channels: u8) -> Self {
        Self {
            sample_rate,
            bits,
            channels,
        }
    }

    /// 16-bit mono at the given rate
    pub const fn mono(sample_rate: u32) -> Self {
        Self::new(sample_rate, CODEC_BIT_DEPTH, 1)
    }

    /// 16-bit stereo at the given rate
    pub const fn stereo(sample_rate: u32) -> Self {
        Self::new(sample_rate, CODEC_BIT_DEPTH, 2)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Bytes occupied by one sample across all channels
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits as usize / 8) * self.channels as usize
    }

    /// Byte length of a frame holding `samples` samples per channel
    pub fn frame_bytes(&self, samples: usize) -> usize {
        samples * self.bytes_per_sample()
    }

    /// Check that the codec accepts this format.
    ///
    /// Only 16-bit PCM is accepted; 8-bit input is rejected rather than
    /// converted.
    pub fn validate_for_codec(&self) -> Result<(), ConfigurationError> {
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(ConfigurationError::UnsupportedSampleRate(self.sample_rate));
        }
        if self.channels != 1 && self.channels != 2 {
            return Err(ConfigurationError::UnsupportedChannels(self.channels));
        }
        if self.bits != CODEC_BIT_DEPTH {
            return Err(ConfigurationError::UnsupportedBitDepth(self.bits));
        }
        Ok(())
    }

    /// Check that `samples` per channel is a duration the codec can process
    pub fn validate_frame_size(&self, samples: usize) -> Result<(), ConfigurationError> {
        let valid = VALID_FRAME_DURATIONS_US
            .iter()
            .any(|&us| samples as u64 * 1_000_000 == self.sample_rate as u64 * us);
        if samples == 0 || !valid {
            return Err(ConfigurationError::InvalidFrameSize {
                samples,
                sample_rate: self.sample_rate,
            });
        }
        Ok(())
    }

    /// Frame size in samples per channel for a duration in microseconds
    pub fn samples_for_duration_us(&self, duration_us: u64) -> usize {
        (self.sample_rate as u64 * duration_us / 1_000_000) as usize
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz {}bit {}ch", self.sample_rate, self.bits, self.channels)
    }
}
