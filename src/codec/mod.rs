//! Opus codec stages
//!
//! [`FrameEncoder`] and [`FrameDecoder`] are chain stages that own one codec
//! handle each. The handles come from a [`CodecBackend`], normally
//! [`OpusBackend`].

pub mod decoder;
pub mod encoder;
pub mod native;
pub mod transform;

#[cfg(test)]
pub(crate) mod fake;

pub use decoder::{DecoderStats, FrameDecoder};
pub use encoder::{EncoderStats, FrameEncoder};
pub use native::OpusBackend;
pub use transform::{CodecBackend, CtlRequest, DecoderHandle, EncoderHandle, SharedBackend};
