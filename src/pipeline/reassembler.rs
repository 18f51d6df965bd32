//! Variable-length spans to fixed-length frames
//!
//! Frames are emitted in arrival order and are always exactly `frame_len`
//! bytes. A frame completed from carried-over bytes borrows the
//! reassembler's carry buffer; whole frames found inside an incoming span
//! are zero-copy slices of that span. Either way the slice is only valid
//! inside the emit callback.

use crate::audio::pool::{ScratchBuffer, SharedBufferPool};
use crate::error::{ConfigurationError, Error};

/// Accumulates pushed spans and emits fixed-size frames
pub struct FrameReassembler {
    buffer: ScratchBuffer,
    frame_len: usize,
    /// Bytes waiting in `buffer`, always < `frame_len`
    carried: usize,
    frames_emitted: u64,
    bytes_accepted: u64,
}

impl FrameReassembler {
    /// Create a reassembler emitting `frame_len`-byte frames
    pub fn new(frame_len: usize, pool: Option<&SharedBufferPool>) -> Result<Self, Error> {
        if frame_len == 0 {
            return Err(ConfigurationError::InvalidFrameLength(frame_len).into());
        }

        Ok(Self {
            buffer: ScratchBuffer::acquire(frame_len, pool)?,
            frame_len,
            carried: 0,
            frames_emitted: 0,
            bytes_accepted: 0,
        })
    }

    /// Feed one span, calling `emit` for every completed frame.
    ///
    /// Stops at the first error returned by `emit`; the partially consumed
    /// span is then discarded.
    pub fn push<E>(
        &mut self,
        span: &[u8],
        mut emit: impl FnMut(&[u8]) -> Result<(), E>,
    ) -> Result<(), E> {
        let n = self.frame_len;
        self.bytes_accepted += span.len() as u64;

        if self.carried + span.len() < n {
            self.buffer[self.carried..self.carried + span.len()].copy_from_slice(span);
            self.carried += span.len();
            return Ok(());
        }

        let fill = n - self.carried;
        self.buffer[self.carried..].copy_from_slice(&span[..fill]);
        self.carried = 0;
        self.frames_emitted += 1;
        emit(&self.buffer[..])?;

        let mut frames = span[fill..].chunks_exact(n);
        for frame in &mut frames {
            self.frames_emitted += 1;
            emit(frame)?;
        }

        let tail = frames.remainder();
        self.buffer[..tail.len()].copy_from_slice(tail);
        self.carried = tail.len();
        Ok(())
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn pending(&self) -> &[u8] {
        &self.buffer[..self.carried]
    }

    pub fn pending_len(&self) -> usize {
        self.carried
    }

    /// Throw away any carried bytes
    pub fn clear(&mut self) {
        self.carried = 0;
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    pub fn bytes_accepted(&self) -> u64 {
        self.bytes_accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pool::SharedPool;
    use proptest::prelude::*;
    use std::convert::Infallible;
    use std::sync::Arc;

    fn collect(reassembler: &mut FrameReassembler, spans: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for span in spans {
            reassembler
                .push(span, |frame| {
                    frames.push(frame.to_vec());
                    Ok::<(), Infallible>(())
                })
                .unwrap();
        }
        frames
    }

    fn split(data: &[u8], lens: &[usize]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut rest = data;
        for &len in lens {
            let len = len.min(rest.len());
            out.push(rest[..len].to_vec());
            rest = &rest[len..];
        }
        out.push(rest.to_vec());
        out
    }

    #[test]
    fn test_zero_frame_len_rejected() {
        let err = FrameReassembler::new(0, None).err().unwrap();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::InvalidFrameLength(0))
        ));
    }

    #[test]
    fn test_zero_frame_len_does_not_rent() {
        let pool = SharedPool::shared(2);
        let shared: SharedBufferPool = pool.clone();
        assert!(FrameReassembler::new(0, Some(&shared)).is_err());
        assert_eq!(pool.stats().rented, 0);
    }

    #[test]
    fn test_capture_replay_scenario() {
        // 30-byte frames from spans of 10, 10, 10, 92 and 28 bytes
        let size = 30;
        let lens = [10, 10, 10, size * 3 + 2, size - 2];
        let data: Vec<u8> = (0..lens.iter().sum::<usize>()).map(|i| i as u8).collect();

        let mut reassembler = FrameReassembler::new(size, None).unwrap();
        let mut offset = 0;
        let mut frames = Vec::new();
        for len in lens {
            let span = &data[offset..offset + len];
            offset += len;
            reassembler
                .push(span, |frame| {
                    frames.push(frame.to_vec());
                    Ok::<(), Infallible>(())
                })
                .unwrap();
        }

        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.len(), size);
            assert_eq!(&frame[..], &data[i * size..(i + 1) * size]);
        }
        assert_eq!(reassembler.pending_len(), 0);
    }

    #[test]
    fn test_empty_span_is_noop() {
        let mut reassembler = FrameReassembler::new(4, None).unwrap();
        let frames = collect(&mut reassembler, &[&[1u8, 2][..]]);
        assert!(frames.is_empty());

        let frames = collect(&mut reassembler, &[&[][..]]);
        assert!(frames.is_empty());
        assert_eq!(reassembler.pending(), &[1, 2]);
    }

    #[test]
    fn test_pass_through_frames_borrow_input() {
        let mut reassembler = FrameReassembler::new(4, None).unwrap();
        let input = [0u8, 1, 2, 3, 4, 5, 6, 7, 8];
        let mut pointers = Vec::new();

        reassembler
            .push(&input, |frame| {
                pointers.push(frame.as_ptr());
                Ok::<(), Infallible>(())
            })
            .unwrap();

        // Empty carry: the first frame completes in the buffer, the next is a slice of the input
        assert_eq!(pointers.len(), 2);
        assert_eq!(pointers[1], input[4..].as_ptr());
        assert_eq!(reassembler.pending(), &[8]);
    }

    #[test]
    fn test_clear_drops_carry_but_keeps_counters() {
        let mut reassembler = FrameReassembler::new(4, None).unwrap();
        collect(&mut reassembler, &[&[1u8, 2, 3][..]]);
        assert_eq!(reassembler.bytes_accepted(), 3);

        reassembler.clear();
        assert!(reassembler.pending().is_empty());

        let frames = collect(&mut reassembler, &[&[5u8, 6, 7, 8, 9][..]]);
        assert_eq!(frames, vec![vec![5, 6, 7, 8]]);
        assert_eq!(reassembler.pending(), &[9]);
        assert_eq!(reassembler.frames_emitted(), 1);
        assert_eq!(reassembler.bytes_accepted(), 8);
        assert_eq!(reassembler.frame_len(), 4);
    }

    #[test]
    fn test_emit_error_stops_processing() {
        let mut reassembler = FrameReassembler::new(2, None).unwrap();
        let mut seen = 0;
        let result = reassembler.push(&[0, 1, 2, 3, 4, 5], |_| {
            seen += 1;
            if seen == 2 {
                Err("stop")
            } else {
                Ok(())
            }
        });

        assert_eq!(result, Err("stop"));
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_pooled_carry_buffer_returned_on_drop() {
        let pool = SharedPool::shared(2);
        let shared: SharedBufferPool = pool.clone();
        let reassembler = FrameReassembler::new(16, Some(&shared)).unwrap();
        assert_eq!(pool.stats().outstanding, 1);
        drop(reassembler);
        assert!(pool.stats().is_balanced());
    }

    proptest! {
        #[test]
        fn prop_exact_multiple_reassembles_input(
            frame_len in 1usize..64,
            frames in 0usize..16,
            cuts in prop::collection::vec(0usize..200, 0..24),
        ) {
            let data: Vec<u8> = (0..frame_len * frames).map(|i| (i * 7 + 3) as u8).collect();
            let spans = split(&data, &cuts);
            let span_refs: Vec<&[u8]> = spans.iter().map(|s| s.as_slice()).collect();

            let mut reassembler = FrameReassembler::new(frame_len, None).unwrap();
            let emitted = collect(&mut reassembler, &span_refs);

            prop_assert_eq!(emitted.len(), frames);
            prop_assert!(emitted.iter().all(|f| f.len() == frame_len));
            prop_assert_eq!(emitted.concat(), data);
            prop_assert_eq!(reassembler.pending_len(), 0);
        }

        #[test]
        fn prop_remainder_stays_buffered(
            frame_len in 1usize..64,
            total in 0usize..1024,
            cuts in prop::collection::vec(0usize..200, 0..24),
        ) {
            let data: Vec<u8> = (0..total).map(|i| i as u8).collect();
            let spans = split(&data, &cuts);
            let span_refs: Vec<&[u8]> = spans.iter().map(|s| s.as_slice()).collect();

            let mut reassembler = FrameReassembler::new(frame_len, None).unwrap();
            let emitted = collect(&mut reassembler, &span_refs);

            let whole = total / frame_len;
            prop_assert_eq!(emitted.len(), whole);
            prop_assert_eq!(reassembler.pending_len(), total % frame_len);
            prop_assert_eq!(reassembler.pending(), &data[whole * frame_len..]);
        }

        #[test]
        fn prop_chunking_invariance(
            frame_len in 1usize..48,
            data in prop::collection::vec(any::<u8>(), 0..512),
            cuts in prop::collection::vec(0usize..96, 0..32),
        ) {
            let mut whole = FrameReassembler::new(frame_len, None).unwrap();
            let expected = collect(&mut whole, &[data.as_slice()]);

            let spans = split(&data, &cuts);
            let span_refs: Vec<&[u8]> = spans.iter().map(|s| s.as_slice()).collect();
            let mut pieces = FrameReassembler::new(frame_len, None).unwrap();
            let actual = collect(&mut pieces, &span_refs);

            prop_assert_eq!(actual, expected);
            prop_assert_eq!(pieces.pending(), whole.pending());
        }
    }

    #[test]
    fn test_shared_pool_across_reassemblers() {
        let pool = Arc::new(SharedPool::new(4));
        let shared: SharedBufferPool = pool.clone();
        let a = FrameReassembler::new(8, Some(&shared)).unwrap();
        let b = FrameReassembler::new(8, Some(&shared)).unwrap();
        assert_eq!(pool.stats().outstanding, 2);
        drop((a, b));
        assert!(pool.stats().is_balanced());
    }
}
