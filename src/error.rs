//! Error types for frame chains

use std::fmt;

use thiserror::Error;

use crate::codec::transform::CtlRequest;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),
}

/// Invalid format, settings or frame geometry, detected before any data flows
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    #[error("Unsupported channel count: {0}")]
    UnsupportedChannels(u8),

    #[error("Unsupported bit depth: {0}")]
    UnsupportedBitDepth(u8),

    #[error("Frame length must be positive, got {0} bytes")]
    InvalidFrameLength(usize),

    #[error("Frame size of {samples} samples is not a valid codec duration at {sample_rate} Hz")]
    InvalidFrameSize { samples: usize, sample_rate: u32 },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Failed to create codec handle: {0}")]
    CodecCreate(ErrorCode),

    #[error("Codec control {request:?} rejected: {code}")]
    Control { request: CtlRequest, code: ErrorCode },

    #[error("Format mismatch: source is {source_format}, sink expects {sink_format}")]
    FormatMismatch {
        source_format: String,
        sink_format: String,
    },

    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// A negative result from an encode or decode call
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("Encoding failed: {0}")]
    EncodeFailed(ErrorCode),

    #[error("Decoding failed: {0}")]
    DecodeFailed(ErrorCode),
}

/// Buffer pool exhaustion or allocation failure
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Buffer pool exhausted: {outstanding} of {limit} buffers rented")]
    PoolExhausted { outstanding: usize, limit: usize },

    #[error("Failed to allocate {0} bytes")]
    AllocationFailed(usize),
}

/// Numeric result codes returned by the native codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadArg,
    BufferTooSmall,
    InternalError,
    InvalidPacket,
    Unimplemented,
    InvalidState,
    AllocFail,
    Unknown(i32),
}

impl ErrorCode {
    /// Map a negative native result to its code
    pub fn from_code(code: i32) -> Self {
        match code {
            -1 => ErrorCode::BadArg,
            -2 => ErrorCode::BufferTooSmall,
            -3 => ErrorCode::InternalError,
            -4 => ErrorCode::InvalidPacket,
            -5 => ErrorCode::Unimplemented,
            -6 => ErrorCode::InvalidState,
            -7 => ErrorCode::AllocFail,
            other => ErrorCode::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::BadArg => -1,
            ErrorCode::BufferTooSmall => -2,
            ErrorCode::InternalError => -3,
            ErrorCode::InvalidPacket => -4,
            ErrorCode::Unimplemented => -5,
            ErrorCode::InvalidState => -6,
            ErrorCode::AllocFail => -7,
            ErrorCode::Unknown(code) => *code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::BadArg => write!(f, "invalid or out of range argument"),
            ErrorCode::BufferTooSmall => write!(f, "buffer too small"),
            ErrorCode::InternalError => write!(f, "internal codec error"),
            ErrorCode::InvalidPacket => write!(f, "corrupted packet"),
            ErrorCode::Unimplemented => write!(f, "unimplemented request"),
            ErrorCode::InvalidState => write!(f, "invalid or freed codec state"),
            ErrorCode::AllocFail => write!(f, "codec allocation failed"),
            ErrorCode::Unknown(code) => write!(f, "unknown codec error {}", code),
        }
    }
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
