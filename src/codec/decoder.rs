//! Decoder stage
//!
//! Each incoming span is one complete packet. An empty span marks a lost
//! packet and asks the codec to conceal it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::transform::{samples_to_bytes, DecoderHandle, SharedBackend};
use crate::audio::format::AudioFormat;
use crate::audio::pool::ScratchBuffer;
use crate::config::DecoderSettings;
use crate::error::{CodecError, ConfigurationError, Error, ErrorCode, Result};
use crate::pipeline::lifecycle::{StageCell, StageLink, StageOptions};
use crate::pipeline::{AudioOutput, Observer, Signal, Subscription};

struct DecoderState {
    handle: Box<dyn DecoderHandle>,
    /// Decoded samples (reused to avoid allocations)
    pcm: Vec<i16>,
    /// Decoded frame as little-endian bytes
    output: ScratchBuffer,
}

impl DecoderState {
    /// Decode one packet and return the number of PCM bytes written to `output`
    fn process(
        &mut self,
        packet: &[u8],
        settings: &DecoderSettings,
        channels: usize,
    ) -> std::result::Result<usize, CodecError> {
        let (input, fec) = if packet.is_empty() {
            (None, settings.fec_on_loss)
        } else {
            (Some(packet), false)
        };

        let decoded = self
            .handle
            .decode(input, settings.frame_size, &mut self.pcm[..], fec);
        if decoded < 0 {
            return Err(CodecError::DecodeFailed(ErrorCode::from_code(decoded)));
        }

        let samples = (decoded as usize).min(settings.frame_size) * channels;
        let bytes = samples * 2;
        samples_to_bytes(&self.pcm[..samples], &mut self.output[..bytes]);
        Ok(bytes)
    }
}

/// Codec packets to PCM frames
pub struct FrameDecoder {
    link: StageLink,
    cell: StageCell<DecoderState>,
    settings: DecoderSettings,
    faulted: AtomicBool,
    packets_decoded: AtomicU64,
    packets_concealed: AtomicU64,
    bytes_produced: AtomicU64,
}

impl FrameDecoder {
    /// Build a decoder over a packet stream whose decoded format is
    /// `upstream.format()`
    pub fn new(
        upstream: Arc<dyn AudioOutput>,
        settings: &DecoderSettings,
        backend: SharedBackend,
        options: StageOptions,
    ) -> Result<Arc<Self>> {
        let format = upstream.format();
        format.validate_for_codec()?;
        settings.validate(&format)?;

        let handle = backend
            .create_decoder(format.sample_rate(), format.channels())
            .map_err(ConfigurationError::CodecCreate)?;

        let output =
            ScratchBuffer::acquire(format.frame_bytes(settings.frame_size), options.pool.as_ref())?;
        let pcm = vec![0i16; settings.frame_size * format.channels() as usize];

        let stage = Arc::new(Self {
            link: StageLink::new(upstream, options.owns_upstream),
            cell: StageCell::new(DecoderState {
                handle,
                pcm,
                output,
            }),
            settings: *settings,
            faulted: AtomicBool::new(false),
            packets_decoded: AtomicU64::new(0),
            packets_concealed: AtomicU64::new(0),
            bytes_produced: AtomicU64::new(0),
        });
        stage.link.attach(&stage, Self::on_signal);

        tracing::debug!(
            "Decoder created: up to {} samples/packet, FEC on loss: {} ({})",
            settings.frame_size,
            settings.fec_on_loss,
            format
        );
        Ok(stage)
    }

    fn on_signal(&self, signal: Signal<'_>) {
        match signal {
            Signal::Data(packet) => {
                if self.faulted.load(Ordering::Acquire) {
                    return;
                }
                let subject = self.link.subject();
                let channels = self.link.format().channels() as usize;
                let outcome = self.cell.with(|state| {
                    let bytes = state.process(packet, &self.settings, channels)?;
                    if packet.is_empty() {
                        self.packets_concealed.fetch_add(1, Ordering::Relaxed);
                    } else {
                        self.packets_decoded.fetch_add(1, Ordering::Relaxed);
                    }
                    self.bytes_produced.fetch_add(bytes as u64, Ordering::Relaxed);
                    tracing::trace!("Decoded {} byte packet into {} bytes", packet.len(), bytes);
                    subject.next(&state.output[..bytes]);
                    Ok::<(), CodecError>(())
                });
                if let Some(Err(err)) = outcome {
                    self.fault(err);
                }
            }
            Signal::Completed => {
                if !self.faulted.load(Ordering::Acquire) {
                    self.link.subject().complete();
                }
            }
            Signal::Failed(error) => self.link.subject().fail(error),
        }
    }

    fn fault(&self, err: CodecError) {
        if self.faulted.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::error!("Decoder failed: {}", err);
        self.link.subject().fail(&Error::Codec(err));
    }

    pub fn settings(&self) -> &DecoderSettings {
        &self.settings
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    /// Get statistics
    pub fn stats(&self) -> DecoderStats {
        let packets_decoded = self.packets_decoded.load(Ordering::Relaxed);
        let packets_concealed = self.packets_concealed.load(Ordering::Relaxed);
        let total = packets_decoded + packets_concealed;
        DecoderStats {
            packets_decoded,
            packets_concealed,
            bytes_produced: self.bytes_produced.load(Ordering::Relaxed),
            loss_rate: if total > 0 {
                packets_concealed as f32 / total as f32
            } else {
                0.0
            },
        }
    }
}

impl AudioOutput for FrameDecoder {
    fn format(&self) -> AudioFormat {
        self.link.format()
    }

    fn subscribe(&self, observer: Observer) -> Subscription {
        self.link.subscribe(observer)
    }

    fn dispose(&self) {
        if self.cell.dispose() {
            tracing::debug!(
                "Decoder disposed after {} packets",
                self.packets_decoded.load(Ordering::Relaxed)
            );
            self.link.teardown();
        }
    }

    fn is_disposed(&self) -> bool {
        self.cell.is_disposed()
    }
}

impl Drop for FrameDecoder {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Decoder statistics
#[derive(Debug, Clone, Default)]
pub struct DecoderStats {
    pub packets_decoded: u64,
    /// Lost packets filled in by concealment
    pub packets_concealed: u64,
    pub bytes_produced: u64,
    pub loss_rate: f32,
}
