//! Byte stream sources
//!
//! [`PushSource`] is the entry point for live producers: an audio device
//! callback calls [`PushSource::push`] and the whole downstream chain runs
//! on that thread before the call returns. [`MemoryCapture`] replays a
//! buffer as a fixed sequence of span lengths, which is how irregular
//! device callbacks are simulated.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::format::AudioFormat;
use crate::error::{ConfigurationError, Error};
use crate::pipeline::{AudioOutput, Observer, Subject, Subscription};

/// Manually driven source of PCM spans
pub struct PushSource {
    format: AudioFormat,
    subject: Arc<Subject>,
    disposed: AtomicBool,
    /// Total bytes pushed
    bytes_pushed: AtomicU64,
}

impl PushSource {
    pub fn new(format: AudioFormat) -> Arc<Self> {
        Arc::new(Self {
            format,
            subject: Subject::new(),
            disposed: AtomicBool::new(false),
            bytes_pushed: AtomicU64::new(0),
        })
    }

    /// Deliver one span downstream. Ignored once disposed or terminated.
    pub fn push(&self, span: &[u8]) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        self.bytes_pushed.fetch_add(span.len() as u64, Ordering::Relaxed);
        self.subject.next(span);
    }

    /// Signal the end of the stream
    pub fn complete(&self) {
        if !self.disposed.load(Ordering::Acquire) {
            self.subject.complete();
        }
    }

    /// Terminate the stream with an error
    pub fn fail(&self, error: &Error) {
        if !self.disposed.load(Ordering::Acquire) {
            self.subject.fail(error);
        }
    }

    pub fn bytes_pushed(&self) -> u64 {
        self.bytes_pushed.load(Ordering::Relaxed)
    }

    /// Current number of subscribers
    pub fn observer_count(&self) -> usize {
        self.subject.observer_count()
    }
}

impl AudioOutput for PushSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn subscribe(&self, observer: Observer) -> Subscription {
        self.subject.subscribe(observer)
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Push source disposed ({})", self.format);
            self.subject.close();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Replays in-memory PCM as a scripted sequence of span lengths
pub struct MemoryCapture {
    source: Arc<PushSource>,
    data: Bytes,
    chunk_sizes: Vec<usize>,
}

impl MemoryCapture {
    /// Create a capture that will push `chunk_sizes` spans cut from `data`
    pub fn new(
        data: impl Into<Bytes>,
        chunk_sizes: Vec<usize>,
        format: AudioFormat,
    ) -> Result<Arc<Self>, Error> {
        let data = data.into();
        let needed: usize = chunk_sizes.iter().sum();
        if needed > data.len() {
            return Err(ConfigurationError::InvalidSetting(format!(
                "Span lengths need {} bytes but only {} are available",
                needed,
                data.len()
            ))
            .into());
        }

        Ok(Arc::new(Self {
            source: PushSource::new(format),
            data,
            chunk_sizes,
        }))
    }

    /// Push every scripted span, in order, on the calling thread
    pub fn start(&self) {
        let mut offset = 0;
        for &len in &self.chunk_sizes {
            self.source.push(&self.data[offset..offset + len]);
            offset += len;
        }
    }

    /// Signal completion
    pub fn stop(&self) {
        self.source.complete();
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

impl AudioOutput for MemoryCapture {
    fn format(&self) -> AudioFormat {
        self.source.format()
    }

    fn subscribe(&self, observer: Observer) -> Subscription {
        self.source.subscribe(observer)
    }

    fn dispose(&self) {
        self.source.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.source.is_disposed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sink::CollectingSink;
    use crate::pipeline::AudioOutputExt;

    #[test]
    fn test_memory_capture_rejects_short_data() {
        let result = MemoryCapture::new(vec![0u8; 10], vec![6, 6], AudioFormat::mono(48000));
        assert!(matches!(
            result,
            Err(Error::Configuration(ConfigurationError::InvalidSetting(_)))
        ));
    }

    #[test]
    fn test_memory_capture_replays_spans() {
        let capture =
            MemoryCapture::new(vec![1u8, 2, 3, 4, 5], vec![2, 0, 3], AudioFormat::mono(48000))
                .unwrap();
        let sink = CollectingSink::new(capture.format());
        let _sub = capture.play(sink.clone()).unwrap();

        assert_eq!(&capture.data()[..], &[1, 2, 3, 4, 5]);
        capture.start();
        capture.stop();

        assert_eq!(sink.chunks(), vec![vec![1, 2], vec![], vec![3, 4, 5]]);
        assert!(sink.is_completed());
    }

    #[test]
    fn test_disposed_source_ignores_pushes() {
        let source = PushSource::new(AudioFormat::mono(48000));
        let sink = CollectingSink::new(source.format());
        let _sub = source.play(sink.clone()).unwrap();

        source.push(&[1]);
        source.dispose();
        source.dispose();
        source.push(&[2]);
        source.complete();

        assert_eq!(sink.bytes(), vec![1]);
        assert!(!sink.is_completed());
        assert_eq!(source.bytes_pushed(), 1);
    }
}
