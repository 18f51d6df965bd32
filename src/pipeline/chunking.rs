//! Chunking stage: a [`FrameReassembler`] as a standalone chain link

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use super::lifecycle::{StageCell, StageLink, StageOptions};
use super::reassembler::FrameReassembler;
use super::{AudioOutput, Observer, Signal, Subscription};
use crate::audio::format::AudioFormat;
use crate::error::Result;

/// Re-slices an upstream byte stream into frames of a fixed byte length
pub struct ChunkingStage {
    link: StageLink,
    cell: StageCell<FrameReassembler>,
    frame_len: usize,
    /// Mirrors of the reassembler counters, readable while a push holds the cell
    frames_emitted: AtomicU64,
    pending: AtomicUsize,
}

impl ChunkingStage {
    pub fn new(
        upstream: Arc<dyn AudioOutput>,
        frame_len: usize,
        options: StageOptions,
    ) -> Result<Arc<Self>> {
        let reassembler = FrameReassembler::new(frame_len, options.pool.as_ref())?;

        let stage = Arc::new(Self {
            link: StageLink::new(upstream, options.owns_upstream),
            cell: StageCell::new(reassembler),
            frame_len,
            frames_emitted: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
        });
        stage.link.attach(&stage, Self::on_signal);

        tracing::debug!(
            "Chunking stage created: {} byte frames ({})",
            frame_len,
            stage.link.format()
        );
        Ok(stage)
    }

    fn on_signal(&self, signal: Signal<'_>) {
        match signal {
            Signal::Data(span) => {
                let subject = self.link.subject();
                self.cell.with(|reassembler| {
                    let pushed = reassembler.push(span, |frame| {
                        self.frames_emitted.fetch_add(1, Ordering::Relaxed);
                        subject.next(frame);
                        Ok::<(), Infallible>(())
                    });
                    if let Err(never) = pushed {
                        match never {}
                    }
                    self.pending
                        .store(reassembler.pending_len(), Ordering::Relaxed);
                });
            }
            Signal::Completed => {
                let pending = self.pending_len();
                if pending > 0 {
                    tracing::warn!(
                        "Upstream completed with {} of {} bytes of a partial frame; dropping it",
                        pending,
                        self.frame_len
                    );
                }
                self.link.subject().complete();
            }
            Signal::Failed(error) => self.link.subject().fail(error),
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Bytes carried over toward the next frame (0 once disposed)
    pub fn pending_len(&self) -> usize {
        if self.cell.is_disposed() {
            return 0;
        }
        self.pending.load(Ordering::Relaxed)
    }

    /// Frames emitted so far. Safe to call from a downstream callback.
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted.load(Ordering::Relaxed)
    }
}

impl AudioOutput for ChunkingStage {
    fn format(&self) -> AudioFormat {
        self.link.format()
    }

    fn subscribe(&self, observer: Observer) -> Subscription {
        self.link.subscribe(observer)
    }

    fn dispose(&self) {
        if self.cell.dispose() {
            tracing::debug!("Chunking stage disposed ({} byte frames)", self.frame_len);
            self.link.teardown();
        }
    }

    fn is_disposed(&self) -> bool {
        self.cell.is_disposed()
    }
}

impl Drop for ChunkingStage {
    fn drop(&mut self) {
        self.dispose();
    }
}
