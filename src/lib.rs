//! # Frame Chain
//!
//! Push-based PCM processing chains around the Opus codec.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐   spans of any length
//! │  PushSource  │ ─────────────────────────┐
//! │ MemoryCapture│                          │
//! └──────────────┘                          ▼
//!                                ┌─────────────────────┐
//!                                │    FrameEncoder     │
//!                                │  FrameReassembler   │  fixed-size PCM frames
//!                                │  + encoder handle   │
//!                                └──────────┬──────────┘
//!                                           │ one packet per frame
//!                                           ▼
//!                                ┌─────────────────────┐
//!                                │    FrameDecoder     │  empty packet = loss,
//!                                │  + decoder handle   │  concealed by the codec
//!                                └──────────┬──────────┘
//!                                           │ PCM frames
//!                                           ▼
//!                                ┌─────────────────────┐
//!                                │  AudioInput (sink)  │
//!                                └─────────────────────┘
//! ```
//!
//! Every push runs the whole chain synchronously on the caller's thread.
//! Spans are borrowed for the duration of a callback only. Stages borrow
//! their scratch buffers from an optional [`audio::BufferPool`] and give them
//! back exactly once, when disposed. Disposing a stage also disposes the
//! upstream it owns.

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod pipeline;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Sample rates the codec accepts
    pub const SUPPORTED_SAMPLE_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

    /// The only PCM bit depth the codec stages accept
    pub const CODEC_BIT_DEPTH: u8 = 16;

    /// Frame durations the codec can process, in microseconds
    pub const VALID_FRAME_DURATIONS_US: [u64; 9] =
        [2500, 5000, 10_000, 20_000, 40_000, 60_000, 80_000, 100_000, 120_000];

    /// Default sample rate for audio processing
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default frame size in samples per channel (120 ms at 48 kHz)
    pub const DEFAULT_FRAME_SIZE: usize = 5760;

    /// Encoder packet buffer size
    pub const MAX_PACKET_BYTES: usize = 4000;

    /// Idle buffers kept by a default pool
    pub const DEFAULT_POOL_CAPACITY: usize = 16;
}
