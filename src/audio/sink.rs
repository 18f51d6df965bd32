//! Downstream sinks
//!
//! A sink receives spans that it does not own: the emitting stage may
//! overwrite the memory as soon as [`AudioInput::push`] returns, so every
//! sink copies what it keeps.

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::format::AudioFormat;
use crate::error::{ConfigurationError, Error, Result};
use crate::pipeline::{AudioOutput, Observer, Signal, Subscription};

/// Consumer at the end of a chain
pub trait AudioInput: Send + Sync {
    /// Format the sink expects
    fn format(&self) -> AudioFormat;

    /// Accept one span; must copy anything it retains
    fn push(&self, span: &[u8]);

    fn on_completed(&self) {}

    fn on_failed(&self, _error: &Error) {}
}

/// Subscribe `sink` to `source` after checking that their formats agree
pub fn play(source: &dyn AudioOutput, sink: Arc<dyn AudioInput>) -> Result<Subscription> {
    if source.format() != sink.format() {
        return Err(ConfigurationError::FormatMismatch {
            source_format: source.format().to_string(),
            sink_format: sink.format().to_string(),
        }
        .into());
    }

    let observer: Observer = Arc::new(move |signal: Signal<'_>| match signal {
        Signal::Data(span) => sink.push(span),
        Signal::Completed => sink.on_completed(),
        Signal::Failed(error) => sink.on_failed(error),
    });
    Ok(source.subscribe(observer))
}

/// Copies every span it receives, for inspection
pub struct CollectingSink {
    format: AudioFormat,
    chunks: Mutex<Vec<Vec<u8>>>,
    completed: Mutex<bool>,
    failure: Mutex<Option<String>>,
}

impl CollectingSink {
    pub fn new(format: AudioFormat) -> Arc<Self> {
        Arc::new(Self {
            format,
            chunks: Mutex::new(Vec::new()),
            completed: Mutex::new(false),
            failure: Mutex::new(None),
        })
    }

    /// Received spans in order
    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.chunks.lock().clone()
    }

    /// Concatenation of every received span
    pub fn bytes(&self) -> Vec<u8> {
        self.chunks.lock().concat()
    }

    pub fn is_completed(&self) -> bool {
        *self.completed.lock()
    }

    /// Message of the terminal error, if one arrived
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }
}

impl AudioInput for CollectingSink {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn push(&self, span: &[u8]) {
        self.chunks.lock().push(span.to_vec());
    }

    fn on_completed(&self) {
        *self.completed.lock() = true;
    }

    fn on_failed(&self, error: &Error) {
        *self.failure.lock() = Some(error.to_string());
    }
}

/// Event forwarded by a [`ChannelSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Data(Bytes),
    Completed,
    Failed(String),
}

/// Hands spans to another thread through a bounded channel.
///
/// A full channel never blocks the producing chain: the span is dropped
/// and counted.
pub struct ChannelSink {
    format: AudioFormat,
    tx: Sender<SinkEvent>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub fn bounded(format: AudioFormat, capacity: usize) -> (Arc<Self>, Receiver<SinkEvent>) {
        let (tx, rx) = bounded(capacity);
        let sink = Arc::new(Self {
            format,
            tx,
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });
        (sink, rx)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn send(&self, event: SinkEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    tracing::warn!("Channel sink full, {} spans dropped so far", dropped);
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl AudioInput for ChannelSink {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn push(&self, span: &[u8]) {
        self.send(SinkEvent::Data(Bytes::copy_from_slice(span)));
    }

    fn on_completed(&self) {
        self.send(SinkEvent::Completed);
    }

    fn on_failed(&self, error: &Error) {
        self.send(SinkEvent::Failed(error.to_string()));
    }
}
