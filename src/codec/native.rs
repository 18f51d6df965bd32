//! libopus backend
//!
//! The only module that calls into native code. Every call checks slice
//! lengths against the frame geometry first, so a mismatched buffer
//! turns into `BadArg` instead of an out-of-bounds native access.

use audiopus_sys as ffi;
use std::os::raw::c_int;
use std::ptr::{self, NonNull};

use super::transform::{CodecBackend, CtlRequest, DecoderHandle, EncoderHandle};
use crate::config::Application;
use crate::error::ErrorCode;

const OPUS_OK: c_int = 0;
const OPUS_BAD_ARG: i32 = -1;

/// Codec backend over the system (or bundled) libopus
#[derive(Debug, Clone, Copy, Default)]
pub struct OpusBackend;

impl OpusBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CodecBackend for OpusBackend {
    fn create_encoder(
        &self,
        sample_rate: u32,
        channels: u8,
        application: Application,
    ) -> Result<Box<dyn EncoderHandle>, ErrorCode> {
        let mut error: c_int = OPUS_OK;
        // SAFETY: `error` is a valid out-pointer for the duration of the call
        let raw = unsafe {
            ffi::opus_encoder_create(
                sample_rate as i32,
                channels as c_int,
                application.value(),
                &mut error,
            )
        };

        match NonNull::new(raw) {
            Some(state) if error == OPUS_OK => Ok(Box::new(NativeEncoder { state, channels })),
            Some(state) => {
                // SAFETY: the pointer came from opus_encoder_create and is not used again
                unsafe { ffi::opus_encoder_destroy(state.as_ptr()) };
                Err(ErrorCode::from_code(error))
            }
            None => Err(ErrorCode::from_code(error.min(-1))),
        }
    }

    fn create_decoder(
        &self,
        sample_rate: u32,
        channels: u8,
    ) -> Result<Box<dyn DecoderHandle>, ErrorCode> {
        let mut error: c_int = OPUS_OK;
        // SAFETY: `error` is a valid out-pointer for the duration of the call
        let raw =
            unsafe { ffi::opus_decoder_create(sample_rate as i32, channels as c_int, &mut error) };

        match NonNull::new(raw) {
            Some(state) if error == OPUS_OK => Ok(Box::new(NativeDecoder { state, channels })),
            Some(state) => {
                // SAFETY: the pointer came from opus_decoder_create and is not used again
                unsafe { ffi::opus_decoder_destroy(state.as_ptr()) };
                Err(ErrorCode::from_code(error))
            }
            None => Err(ErrorCode::from_code(error.min(-1))),
        }
    }
}

struct NativeEncoder {
    state: NonNull<ffi::OpusEncoder>,
    channels: u8,
}

// SAFETY: the encoder state is only reached through `&mut self`
unsafe impl Send for NativeEncoder {}

impl EncoderHandle for NativeEncoder {
    fn control(&mut self, request: CtlRequest, value: i32) -> i32 {
        // SAFETY: every request in CtlRequest is a setter taking one opus_int32
        unsafe { ffi::opus_encoder_ctl(self.state.as_ptr(), request.id(), value) }
    }

    fn encode(&mut self, pcm: &[i16], frame_size: usize, packet: &mut [u8]) -> i32 {
        if pcm.len() < frame_size * self.channels as usize || packet.is_empty() {
            return OPUS_BAD_ARG;
        }
        let max_bytes = packet.len().min(i32::MAX as usize) as i32;
        // SAFETY: pcm holds frame_size * channels samples and packet holds max_bytes bytes
        unsafe {
            ffi::opus_encode(
                self.state.as_ptr(),
                pcm.as_ptr(),
                frame_size as c_int,
                packet.as_mut_ptr(),
                max_bytes,
            )
        }
    }
}

impl Drop for NativeEncoder {
    fn drop(&mut self) {
        // SAFETY: created by opus_encoder_create, destroyed exactly once here
        unsafe { ffi::opus_encoder_destroy(self.state.as_ptr()) };
    }
}

struct NativeDecoder {
    state: NonNull<ffi::OpusDecoder>,
    channels: u8,
}

// SAFETY: the decoder state is only reached through `&mut self`
unsafe impl Send for NativeDecoder {}

impl DecoderHandle for NativeDecoder {
    fn decode(
        &mut self,
        packet: Option<&[u8]>,
        frame_size: usize,
        pcm: &mut [i16],
        fec: bool,
    ) -> i32 {
        if pcm.len() < frame_size * self.channels as usize {
            return OPUS_BAD_ARG;
        }
        let (data, len) = match packet {
            Some(bytes) if !bytes.is_empty() => (bytes.as_ptr(), bytes.len() as i32),
            _ => (ptr::null(), 0),
        };
        // SAFETY: data is null or points to len bytes; pcm holds frame_size * channels samples
        unsafe {
            ffi::opus_decode(
                self.state.as_ptr(),
                data,
                len,
                pcm.as_mut_ptr(),
                frame_size as c_int,
                fec as c_int,
            )
        }
    }
}

impl Drop for NativeDecoder {
    fn drop(&mut self) {
        // SAFETY: created by opus_decoder_create, destroyed exactly once here
        unsafe { ffi::opus_decoder_destroy(self.state.as_ptr()) };
    }
}
