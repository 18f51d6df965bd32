//! In-process codec backend for tests
//!
//! "Encoding" copies the first bytes of the frame into the packet, and
//! "decoding" fills the frame with the packet's first byte (or zeros when
//! concealing). Creation, destruction and control calls are recorded, and
//! any step can be told to fail.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::transform::{CodecBackend, CtlRequest, DecoderHandle, EncoderHandle};
use crate::config::Application;
use crate::error::ErrorCode;

#[derive(Default)]
pub struct FakeCounters {
    pub encoders_created: AtomicUsize,
    pub encoders_destroyed: AtomicUsize,
    pub decoders_created: AtomicUsize,
    pub decoders_destroyed: AtomicUsize,
    pub controls: Mutex<Vec<(CtlRequest, i32)>>,
    /// (packet present, fec flag) per decode call
    pub decode_calls: Mutex<Vec<(bool, bool)>>,
}

impl FakeCounters {
    pub fn live_encoders(&self) -> usize {
        self.encoders_created.load(Ordering::SeqCst) - self.encoders_destroyed.load(Ordering::SeqCst)
    }

    pub fn live_decoders(&self) -> usize {
        self.decoders_created.load(Ordering::SeqCst) - self.decoders_destroyed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeBackend {
    pub counters: Arc<FakeCounters>,
    packet_len: usize,
    fail_create: Option<ErrorCode>,
    fail_control: Option<(CtlRequest, ErrorCode)>,
    /// Fail the n-th encode/decode call (0-based)
    fail_call: Option<(usize, ErrorCode)>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            packet_len: 4,
            ..Default::default()
        }
    }

    pub fn failing_create(mut self, code: ErrorCode) -> Self {
        self.fail_create = Some(code);
        self
    }

    pub fn failing_control(mut self, request: CtlRequest, code: ErrorCode) -> Self {
        self.fail_control = Some((request, code));
        self
    }

    pub fn failing_call(mut self, index: usize, code: ErrorCode) -> Self {
        self.fail_call = Some((index, code));
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl CodecBackend for FakeBackend {
    fn create_encoder(
        &self,
        _sample_rate: u32,
        channels: u8,
        _application: Application,
    ) -> Result<Box<dyn EncoderHandle>, ErrorCode> {
        if let Some(code) = self.fail_create {
            return Err(code);
        }
        self.counters.encoders_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeEncoder {
            counters: self.counters.clone(),
            channels: channels as usize,
            packet_len: self.packet_len,
            fail_control: self.fail_control,
            fail_call: self.fail_call,
            calls: 0,
        }))
    }

    fn create_decoder(
        &self,
        _sample_rate: u32,
        channels: u8,
    ) -> Result<Box<dyn DecoderHandle>, ErrorCode> {
        if let Some(code) = self.fail_create {
            return Err(code);
        }
        self.counters.decoders_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeDecoder {
            counters: self.counters.clone(),
            channels: channels as usize,
            fail_call: self.fail_call,
            calls: 0,
        }))
    }
}

struct FakeEncoder {
    counters: Arc<FakeCounters>,
    channels: usize,
    packet_len: usize,
    fail_control: Option<(CtlRequest, ErrorCode)>,
    fail_call: Option<(usize, ErrorCode)>,
    calls: usize,
}

impl EncoderHandle for FakeEncoder {
    fn control(&mut self, request: CtlRequest, value: i32) -> i32 {
        self.counters.controls.lock().push((request, value));
        match self.fail_control {
            Some((failing, code)) if failing == request => code.code(),
            _ => 0,
        }
    }

    fn encode(&mut self, pcm: &[i16], frame_size: usize, packet: &mut [u8]) -> i32 {
        let call = self.calls;
        self.calls += 1;
        if let Some((index, code)) = self.fail_call {
            if index == call {
                return code.code();
            }
        }
        if pcm.len() < frame_size * self.channels {
            return ErrorCode::BadArg.code();
        }
        let len = self.packet_len.min(packet.len());
        for (byte, sample) in packet[..len].iter_mut().zip(pcm) {
            *byte = *sample as u8;
        }
        len as i32
    }
}

impl Drop for FakeEncoder {
    fn drop(&mut self) {
        self.counters.encoders_destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeDecoder {
    counters: Arc<FakeCounters>,
    channels: usize,
    fail_call: Option<(usize, ErrorCode)>,
    calls: usize,
}

impl DecoderHandle for FakeDecoder {
    fn decode(
        &mut self,
        packet: Option<&[u8]>,
        frame_size: usize,
        pcm: &mut [i16],
        fec: bool,
    ) -> i32 {
        self.counters.decode_calls.lock().push((packet.is_some(), fec));
        let call = self.calls;
        self.calls += 1;
        if let Some((index, code)) = self.fail_call {
            if index == call {
                return code.code();
            }
        }
        if pcm.len() < frame_size * self.channels {
            return ErrorCode::BadArg.code();
        }
        let value = packet.and_then(|p| p.first()).map_or(0, |b| *b as i16);
        pcm[..frame_size * self.channels].fill(value);
        frame_size as i32
    }
}

impl Drop for FakeDecoder {
    fn drop(&mut self) {
        self.counters.decoders_destroyed.fetch_add(1, Ordering::SeqCst);
    }
}
