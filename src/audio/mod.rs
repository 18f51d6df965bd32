//! Audio formats, buffers, sources and sinks

pub mod format;
pub mod pool;
pub mod sink;
pub mod source;

pub use format::AudioFormat;
pub use pool::{BufferPool, PoolStats, ScratchBuffer, SharedBufferPool, SharedPool};
pub use sink::{play, AudioInput, ChannelSink, CollectingSink, SinkEvent};
pub use source::{MemoryCapture, PushSource};
