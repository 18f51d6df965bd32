//! Encoder stage
//!
//! Reassembles incoming PCM into codec frames and encodes each frame as
//! soon as it is complete. Every packet is emitted from the stage's own
//! packet buffer, so downstream must copy what it keeps.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use super::transform::{bytes_to_samples, EncoderHandle, SharedBackend};
use crate::audio::format::AudioFormat;
use crate::audio::pool::ScratchBuffer;
use crate::config::EncoderSettings;
use crate::constants::MAX_PACKET_BYTES;
use crate::error::{CodecError, ConfigurationError, Error, ErrorCode, Result};
use crate::pipeline::lifecycle::{StageCell, StageLink, StageOptions};
use crate::pipeline::{AudioOutput, FrameReassembler, Observer, Signal, Subscription};

/// Everything released when the stage is disposed
struct EncoderState {
    handle: Box<dyn EncoderHandle>,
    reassembler: FrameReassembler,
    /// Current frame as samples
    pcm: Vec<i16>,
    /// Encoded packet (reused to avoid allocations)
    packet: ScratchBuffer,
}

impl EncoderState {
    fn process(
        &mut self,
        span: &[u8],
        frame_size: usize,
        mut deliver: impl FnMut(&[u8]),
    ) -> std::result::Result<(), CodecError> {
        let Self {
            handle,
            reassembler,
            pcm,
            packet,
        } = self;

        reassembler.push(span, |frame| {
            bytes_to_samples(frame, &mut pcm[..]);
            let len = handle.encode(&pcm[..], frame_size, &mut packet[..]);
            if len < 0 {
                return Err(CodecError::EncodeFailed(ErrorCode::from_code(len)));
            }
            deliver(&packet[..len as usize]);
            Ok(())
        })
    }
}

/// PCM to codec packets
pub struct FrameEncoder {
    link: StageLink,
    cell: StageCell<EncoderState>,
    settings: EncoderSettings,
    /// Set after a codec error; later input is ignored
    faulted: AtomicBool,
    frames_encoded: AtomicU64,
    bytes_produced: AtomicU64,
    /// Partial frame bytes after the last push
    pending: AtomicUsize,
}

impl FrameEncoder {
    /// Build an encoder over `upstream`.
    ///
    /// Everything is validated before any codec state exists, and the
    /// upstream subscription is made last, so a failed construction leaves
    /// nothing behind.
    pub fn new(
        upstream: Arc<dyn AudioOutput>,
        settings: &EncoderSettings,
        backend: SharedBackend,
        options: StageOptions,
    ) -> Result<Arc<Self>> {
        let format = upstream.format();
        format.validate_for_codec()?;
        settings.validate(&format)?;

        let mut handle = backend
            .create_encoder(format.sample_rate(), format.channels(), settings.application)
            .map_err(ConfigurationError::CodecCreate)?;

        for (request, value) in settings.control_plan() {
            let result = handle.control(request, value);
            if result < 0 {
                return Err(ConfigurationError::Control {
                    request,
                    code: ErrorCode::from_code(result),
                }
                .into());
            }
        }

        let pool = options.pool.as_ref();
        let reassembler = FrameReassembler::new(format.frame_bytes(settings.frame_size), pool)?;
        let packet = ScratchBuffer::acquire(MAX_PACKET_BYTES, pool)?;
        let pcm = vec![0i16; settings.frame_size * format.channels() as usize];

        let stage = Arc::new(Self {
            link: StageLink::new(upstream, options.owns_upstream),
            cell: StageCell::new(EncoderState {
                handle,
                reassembler,
                pcm,
                packet,
            }),
            settings: settings.clone(),
            faulted: AtomicBool::new(false),
            frames_encoded: AtomicU64::new(0),
            bytes_produced: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
        });
        stage.link.attach(&stage, Self::on_signal);

        tracing::debug!(
            "Encoder created: {} samples/frame, {} bps, {:?} ({})",
            settings.frame_size,
            settings.bitrate,
            settings.application,
            format
        );
        Ok(stage)
    }

    fn on_signal(&self, signal: Signal<'_>) {
        match signal {
            Signal::Data(span) => {
                if self.faulted.load(Ordering::Acquire) {
                    return;
                }
                let subject = self.link.subject();
                let frame_size = self.settings.frame_size;
                let outcome = self.cell.with(|state| {
                    let processed = state.process(span, frame_size, |packet| {
                        self.frames_encoded.fetch_add(1, Ordering::Relaxed);
                        self.bytes_produced
                            .fetch_add(packet.len() as u64, Ordering::Relaxed);
                        tracing::trace!("Encoded frame into {} bytes", packet.len());
                        subject.next(packet);
                    });
                    self.pending
                        .store(state.reassembler.pending_len(), Ordering::Relaxed);
                    processed
                });
                if let Some(Err(err)) = outcome {
                    self.fault(err);
                }
            }
            Signal::Completed => {
                if self.faulted.load(Ordering::Acquire) {
                    return;
                }
                let pending = self.pending.load(Ordering::Relaxed);
                if pending > 0 {
                    tracing::warn!(
                        "Upstream completed with {} bytes of a partial frame; dropping it",
                        pending
                    );
                }
                self.link.subject().complete();
            }
            Signal::Failed(error) => self.link.subject().fail(error),
        }
    }

    fn fault(&self, err: CodecError) {
        if self.faulted.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::error!("Encoder failed: {}", err);
        self.link.subject().fail(&Error::Codec(err));
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Samples per channel in each frame
    pub fn frame_size(&self) -> usize {
        self.settings.frame_size
    }

    /// Bytes of PCM consumed per packet
    pub fn frame_bytes(&self) -> usize {
        self.link.format().frame_bytes(self.settings.frame_size)
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    /// PCM bytes waiting for the rest of their frame
    pub fn pending_len(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Get statistics
    pub fn stats(&self) -> EncoderStats {
        let frames_encoded = self.frames_encoded.load(Ordering::Relaxed);
        let bytes_produced = self.bytes_produced.load(Ordering::Relaxed);
        EncoderStats {
            frames_encoded,
            bytes_produced,
            average_frame_size: if frames_encoded > 0 {
                bytes_produced as f32 / frames_encoded as f32
            } else {
                0.0
            },
        }
    }
}

impl AudioOutput for FrameEncoder {
    fn format(&self) -> AudioFormat {
        self.link.format()
    }

    fn subscribe(&self, observer: Observer) -> Subscription {
        self.link.subscribe(observer)
    }

    fn dispose(&self) {
        if self.cell.dispose() {
            tracing::debug!(
                "Encoder disposed after {} frames",
                self.frames_encoded.load(Ordering::Relaxed)
            );
            self.link.teardown();
        }
    }

    fn is_disposed(&self) -> bool {
        self.cell.is_disposed()
    }
}

impl Drop for FrameEncoder {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
    pub average_frame_size: f32,
}
