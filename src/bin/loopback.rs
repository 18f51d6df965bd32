//! Loopback demo
//!
//! Synthesises a tone, pushes it through encode → lossy link → decode on a
//! producer thread and collects the decoded PCM on the main thread.
//!
//! Usage: `loopback [config.toml] [seconds]`

use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use frame_chain::{
    audio::{ChannelSink, PushSource, SharedBufferPool, SharedPool, SinkEvent},
    codec::{OpusBackend, SharedBackend},
    config::AppConfig,
    pipeline::{AudioOutput, AudioOutputExt, Signal, StageOptions},
};

/// Every n-th packet is lost on the simulated link
const LOSS_INTERVAL: u64 = 25;

/// Producer span length; deliberately not a multiple of the frame duration
const SPAN_MS: u64 = 7;

const TONE_HZ: f32 = 440.0;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            AppConfig::load(&path).with_context(|| format!("Failed to load config {}", path))?
        }
        None => AppConfig::load_or_default()?,
    };
    config.validate().context("Invalid configuration")?;

    let seconds: u64 = match std::env::args().nth(2) {
        Some(arg) => arg.parse().context("Invalid duration")?,
        None => 5,
    };

    let format = config.audio_format();
    tracing::info!("Starting loopback: {}, {}s", format, seconds);

    let pool = config
        .pool
        .enabled
        .then(|| Arc::new(SharedPool::with_limit(config.pool.capacity, config.pool.max_outstanding)));
    let options = match &pool {
        Some(pool) => StageOptions::new().with_pool(pool.clone() as SharedBufferPool),
        None => StageOptions::new(),
    };
    let backend: SharedBackend = Arc::new(OpusBackend::new());

    // Sender side
    let source = PushSource::new(format);
    let encoder = source.encode(&config.encoder, backend.clone(), options.clone())?;
    tracing::info!(
        "Encoder: {} samples/frame ({} PCM bytes), {} bps",
        encoder.frame_size(),
        encoder.frame_bytes(),
        encoder.settings().bitrate
    );

    // Lossy link: an empty packet stands for a lost one
    let link = PushSource::new(format);
    let sent = Arc::new(AtomicU64::new(0));
    let wire = {
        let link = link.clone();
        let sent = sent.clone();
        encoder.tap(
            move |packet| {
                let n = sent.fetch_add(1, Ordering::Relaxed) + 1;
                if n % LOSS_INTERVAL == 0 {
                    link.push(&[]);
                } else {
                    link.push(packet);
                }
            },
            options.clone(),
        )
    };

    // A codec error on the sender side fails the receiver chain too
    let _encoder_failures = {
        let link = link.clone();
        encoder.subscribe(Arc::new(move |signal: Signal<'_>| {
            if let Signal::Failed(error) = signal {
                link.fail(error);
            }
        }))
    };

    // Receiver side
    let decoder = link.decode(&config.decoder, backend, options)?;
    let (sink, rx) = ChannelSink::bounded(format, 256);
    let _playback = decoder.play(sink.clone())?;

    let producer = {
        let source = source.clone();
        thread::spawn(move || produce_tone(&source, Duration::from_secs(seconds)))
    };

    let mut received: u64 = 0;
    let mut link_closed = false;
    let mut last_report = Instant::now();

    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(SinkEvent::Data(pcm)) => received += pcm.len() as u64,
            Ok(SinkEvent::Completed) => break,
            Ok(SinkEvent::Failed(message)) => bail!("Chain failed: {}", message),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if producer.is_finished() && !link_closed {
                    if encoder.is_faulted() {
                        bail!("Encoder faulted before the link was closed");
                    }
                    link.complete();
                    link_closed = true;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            let enc = encoder.stats();
            let dec = decoder.stats();
            tracing::info!(
                "Stats: {} frames encoded (avg {:.0} bytes), {} decoded, {} concealed ({:.1}% loss), {:.1} KB PCM out, {} dropped",
                enc.frames_encoded,
                enc.average_frame_size,
                dec.packets_decoded,
                dec.packets_concealed,
                dec.loss_rate * 100.0,
                received as f64 / 1024.0,
                sink.dropped()
            );
            last_report = Instant::now();
        }
    }

    if producer.join().is_err() {
        bail!("Producer thread panicked");
    }

    decoder.dispose();
    wire.dispose();

    tracing::info!(
        "Done: {} packets sent, {} bytes of PCM received",
        sent.load(Ordering::Relaxed),
        received
    );
    if let Some(pool) = pool {
        let stats = pool.stats();
        tracing::info!(
            "Pool: {} rented, {} returned, balanced: {}",
            stats.rented,
            stats.returned,
            stats.is_balanced()
        );
    }

    Ok(())
}

/// Push a sine tone in real time until `duration` has elapsed
fn produce_tone(source: &PushSource, duration: Duration) {
    let format = source.format();
    let channels = format.channels() as usize;
    let span_frames = format.sample_rate() as u64 * SPAN_MS / 1000;
    let step = std::f32::consts::TAU * TONE_HZ / format.sample_rate() as f32;

    let mut phase = 0.0f32;
    let mut span = Vec::with_capacity(span_frames as usize * channels * 2);
    let deadline = Instant::now() + duration;

    while Instant::now() < deadline {
        span.clear();
        for _ in 0..span_frames {
            let sample = (phase.sin() * 8000.0) as i16;
            phase = (phase + step) % std::f32::consts::TAU;
            for _ in 0..channels {
                span.extend_from_slice(&sample.to_le_bytes());
            }
        }
        source.push(&span);
        thread::sleep(Duration::from_millis(SPAN_MS));
    }

    source.complete();
}
