//! Push-based stage chains
//!
//! A chain is a strict line of stages: each stage subscribes a callback to
//! its upstream and republishes through its own [`Subject`]. Delivery is
//! synchronous. A push returns only after every downstream stage has
//! processed what it produced, so no stage queues, defers or reorders data.
//!
//! Spans handed to observers borrow memory owned by the emitting stage or by
//! the original caller. They are valid for the duration of the callback only
//! and must be copied to be retained.

pub mod chunking;
pub mod lifecycle;
pub mod reassembler;
pub mod subject;
pub mod tap;

use std::sync::Arc;

pub use chunking::ChunkingStage;
pub use lifecycle::StageOptions;
pub use reassembler::FrameReassembler;
pub use subject::{Subject, Subscription};
pub use tap::TapStage;

use crate::audio::format::AudioFormat;
use crate::audio::sink::{play, AudioInput};
use crate::codec::decoder::FrameDecoder;
use crate::codec::encoder::FrameEncoder;
use crate::codec::transform::SharedBackend;
use crate::config::{DecoderSettings, EncoderSettings};
use crate::error::{Error, Result};

/// One notification travelling down a chain
#[derive(Debug, Clone, Copy)]
pub enum Signal<'a> {
    /// A span of bytes, valid only for the duration of the callback
    Data(&'a [u8]),
    /// The upstream finished normally
    Completed,
    /// The upstream hit a terminal error
    Failed(&'a Error),
}

/// Subscriber callback
pub type Observer = Arc<dyn Fn(Signal<'_>) + Send + Sync>;

/// A stage or source that publishes a byte stream of a known format
pub trait AudioOutput: Send + Sync {
    /// Format of the PCM stream this output carries (or encodes)
    fn format(&self) -> AudioFormat;

    /// Register a subscriber; dropping the handle unsubscribes it
    fn subscribe(&self, observer: Observer) -> Subscription;

    /// Tear the output down. Idempotent; later pushes are ignored.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

/// Fluent construction of linear chains
pub trait AudioOutputExt {
    /// Re-slice the stream into frames of exactly `frame_len` bytes
    fn chunking(&self, frame_len: usize, options: StageOptions) -> Result<Arc<ChunkingStage>>;

    /// Observe every span without changing the stream
    fn tap<F>(&self, callback: F, options: StageOptions) -> Arc<TapStage>
    where
        F: Fn(&[u8]) + Send + Sync + 'static;

    /// Encode PCM into packets
    fn encode(
        &self,
        settings: &EncoderSettings,
        backend: SharedBackend,
        options: StageOptions,
    ) -> Result<Arc<FrameEncoder>>;

    /// Decode packets into PCM frames
    fn decode(
        &self,
        settings: &DecoderSettings,
        backend: SharedBackend,
        options: StageOptions,
    ) -> Result<Arc<FrameDecoder>>;

    /// Deliver the stream into a sink
    fn play(&self, sink: Arc<dyn AudioInput>) -> Result<Subscription>;
}

impl<T: AudioOutput + 'static> AudioOutputExt for Arc<T> {
    fn chunking(&self, frame_len: usize, options: StageOptions) -> Result<Arc<ChunkingStage>> {
        ChunkingStage::new(self.clone(), frame_len, options)
    }

    fn tap<F>(&self, callback: F, options: StageOptions) -> Arc<TapStage>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        TapStage::new(self.clone(), callback, options)
    }

    fn encode(
        &self,
        settings: &EncoderSettings,
        backend: SharedBackend,
        options: StageOptions,
    ) -> Result<Arc<FrameEncoder>> {
        FrameEncoder::new(self.clone(), settings, backend, options)
    }

    fn decode(
        &self,
        settings: &DecoderSettings,
        backend: SharedBackend,
        options: StageOptions,
    ) -> Result<Arc<FrameDecoder>> {
        FrameDecoder::new(self.clone(), settings, backend, options)
    }

    fn play(&self, sink: Arc<dyn AudioInput>) -> Result<Subscription> {
        play(self.as_ref(), sink)
    }
}
