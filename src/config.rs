//! Configuration for chains and codec stages
//!
//! Settings are plain serde structs with defaults, so a partial TOML file
//! fills in the rest. Validation happens here and again at stage
//! construction; nothing is checked while data flows.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audio::format::AudioFormat;
use crate::codec::transform::CtlRequest;
use crate::constants::{DEFAULT_FRAME_SIZE, DEFAULT_POOL_CAPACITY};
use crate::error::{ConfigurationError, Result};

/// Codec application profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Application {
    #[default]
    Voip,
    Audio,
    RestrictedLowDelay,
}

impl Application {
    pub fn value(&self) -> i32 {
        match self {
            Application::Voip => 2048,
            Application::Audio => 2049,
            Application::RestrictedLowDelay => 2051,
        }
    }
}

/// Maximum coded bandwidth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Bandwidth {
    /// 4 kHz
    #[default]
    Narrowband,
    /// 6 kHz
    Mediumband,
    /// 8 kHz
    Wideband,
    /// 12 kHz
    Superwideband,
    /// 20 kHz
    Fullband,
}

impl Bandwidth {
    pub fn value(&self) -> i32 {
        match self {
            Bandwidth::Narrowband => 1101,
            Bandwidth::Mediumband => 1102,
            Bandwidth::Wideband => 1103,
            Bandwidth::Superwideband => 1104,
            Bandwidth::Fullband => 1105,
        }
    }
}

/// Hint about the content being encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Auto,
    #[default]
    Voice,
    Music,
}

impl SignalType {
    pub fn value(&self) -> i32 {
        match self {
            SignalType::Auto => -1000,
            SignalType::Voice => 3001,
            SignalType::Music => 3002,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForceChannels {
    Auto,
    #[default]
    Mono,
    Stereo,
}

impl ForceChannels {
    pub fn value(&self) -> i32 {
        match self {
            ForceChannels::Auto => -1000,
            ForceChannels::Mono => 1,
            ForceChannels::Stereo => 2,
        }
    }
}

/// In-band forward error correction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InbandFec {
    Disabled,
    #[default]
    EnabledWithSilkSwitch,
    EnabledWithoutSilkSwitch,
}

impl InbandFec {
    pub fn value(&self) -> i32 {
        match self {
            InbandFec::Disabled => 0,
            InbandFec::EnabledWithSilkSwitch => 1,
            InbandFec::EnabledWithoutSilkSwitch => 2,
        }
    }
}

/// Encoder stage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    pub application: Application,
    /// Master switch for in-band FEC and the packet loss hint
    pub forward_error_correction: bool,
    /// Samples per channel per frame
    pub frame_size: usize,
    /// Target bitrate in bits per second
    pub bitrate: i32,
    pub bandwidth: Bandwidth,
    pub signal: SignalType,
    /// 0-10
    pub complexity: u8,
    pub force_channels: ForceChannels,
    pub inband_fec: InbandFec,
    /// Discontinuous transmission
    pub dtx: bool,
    /// Inter-frame prediction
    pub prediction: bool,
    /// Expected packet loss in percent (0-100)
    pub packet_loss_perc: u8,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            application: Application::Voip,
            forward_error_correction: true,
            frame_size: DEFAULT_FRAME_SIZE,
            bitrate: 6000,
            bandwidth: Bandwidth::Narrowband,
            signal: SignalType::Voice,
            complexity: 10,
            force_channels: ForceChannels::Mono,
            inband_fec: InbandFec::EnabledWithSilkSwitch,
            dtx: true,
            prediction: true,
            packet_loss_perc: 0,
        }
    }
}

impl EncoderSettings {
    /// Speech over lossy links
    pub fn voice() -> Self {
        Self::default()
    }

    /// Full-band music at 48 kHz, 20 ms frames
    pub fn music() -> Self {
        Self {
            application: Application::Audio,
            forward_error_correction: false,
            frame_size: 960,
            bitrate: 128_000,
            bandwidth: Bandwidth::Fullband,
            signal: SignalType::Music,
            complexity: 10,
            force_channels: ForceChannels::Auto,
            inband_fec: InbandFec::Disabled,
            dtx: false,
            prediction: true,
            packet_loss_perc: 0,
        }
    }

    /// Lowest algorithmic delay at 48 kHz, 2.5 ms frames
    pub fn low_latency() -> Self {
        Self {
            application: Application::RestrictedLowDelay,
            forward_error_correction: false,
            frame_size: 120,
            bitrate: 96_000,
            bandwidth: Bandwidth::Fullband,
            signal: SignalType::Auto,
            complexity: 5,
            force_channels: ForceChannels::Auto,
            inband_fec: InbandFec::Disabled,
            dtx: false,
            prediction: false,
            packet_loss_perc: 0,
        }
    }

    /// Set the frame size from a duration in microseconds
    pub fn with_frame_duration_us(mut self, format: &AudioFormat, duration_us: u64) -> Self {
        self.frame_size = format.samples_for_duration_us(duration_us);
        self
    }

    /// Check value ranges and the frame size against `format`
    pub fn validate(&self, format: &AudioFormat) -> std::result::Result<(), ConfigurationError> {
        if self.complexity > 10 {
            return Err(ConfigurationError::InvalidSetting(format!(
                "Complexity must be 0-10, got {}",
                self.complexity
            )));
        }
        if !(500..=512_000).contains(&self.bitrate) {
            return Err(ConfigurationError::InvalidSetting(format!(
                "Bitrate must be 500-512000 bps, got {}",
                self.bitrate
            )));
        }
        if self.packet_loss_perc > 100 {
            return Err(ConfigurationError::InvalidSetting(format!(
                "Packet loss must be 0-100%, got {}",
                self.packet_loss_perc
            )));
        }
        if self.force_channels == ForceChannels::Stereo && format.channels() < 2 {
            return Err(ConfigurationError::InvalidSetting(
                "Cannot force stereo coding of a mono stream".to_string(),
            ));
        }
        format.validate_frame_size(self.frame_size)
    }

    /// Control requests in the order they are applied to a new encoder
    pub fn control_plan(&self) -> Vec<(CtlRequest, i32)> {
        let fec_mode = if self.forward_error_correction {
            self.inband_fec.value()
        } else {
            InbandFec::Disabled.value()
        };
        let loss = if self.forward_error_correction {
            self.packet_loss_perc as i32
        } else {
            0
        };

        vec![
            (CtlRequest::SetBitrate, self.bitrate),
            (CtlRequest::SetSignal, self.signal.value()),
            (CtlRequest::SetBandwidth, self.bandwidth.value()),
            (CtlRequest::SetComplexity, self.complexity as i32),
            (CtlRequest::SetForceChannels, self.force_channels.value()),
            (CtlRequest::SetInbandFec, fec_mode),
            (CtlRequest::SetPacketLossPerc, loss),
            (CtlRequest::SetDtx, self.dtx as i32),
            (CtlRequest::SetPredictionDisabled, (!self.prediction) as i32),
        ]
    }
}

/// Decoder stage settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderSettings {
    /// Maximum samples per channel a single packet may decode to
    pub frame_size: usize,
    /// Ask the codec for FEC data when concealing a lost packet
    pub fec_on_loss: bool,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            fec_on_loss: true,
        }
    }
}

impl DecoderSettings {
    pub fn validate(&self, format: &AudioFormat) -> std::result::Result<(), ConfigurationError> {
        format.validate_frame_size(self.frame_size)
    }
}

/// Stream format as written in a config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    pub sample_rate: u32,
    pub bits: u8,
    pub channels: u8,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            bits: 16,
            channels: 1,
        }
    }
}

impl From<FormatConfig> for AudioFormat {
    fn from(config: FormatConfig) -> Self {
        AudioFormat::new(config.sample_rate, config.bits, config.channels)
    }
}

/// Scratch buffer pool settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub enabled: bool,
    /// Idle buffers kept for reuse
    pub capacity: usize,
    /// Upper bound on rented buffers; 0 means unlimited
    pub max_outstanding: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_POOL_CAPACITY,
            max_outstanding: 0,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub format: FormatConfig,
    pub encoder: EncoderSettings,
    pub decoder: DecoderSettings,
    pub pool: PoolConfig,
}

impl AppConfig {
    /// Parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Load(format!("{}: {}", path.display(), e)))?;
        let config: AppConfig = toml::from_str(&text)
            .map_err(|e| ConfigurationError::Load(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from the platform config directory, or fall back to defaults
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/frame-chain/config.toml`, when the platform has one
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "frame-chain")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn audio_format(&self) -> AudioFormat {
        self.format.into()
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        let format = self.audio_format();
        format.validate_for_codec()?;
        self.encoder.validate(&format)?;
        self.decoder.validate(&format)?;
        if self.pool.enabled && self.pool.capacity == 0 {
            return Err(ConfigurationError::InvalidSetting(
                "Pool capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> std::result::Result<String, ConfigurationError> {
        toml::to_string_pretty(self).map_err(|e| ConfigurationError::Load(e.to_string()))
    }
}
