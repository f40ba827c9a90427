//! Configuration for the broadcast sender.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use lancast_core::audio::AudioFormat;
use lancast_core::capture::SourceKind;
use lancast_core::codec::ZstdCodec;
use lancast_core::config::{ConfigOrigin, load_toml};
use lancast_core::error::{LancastError, Result};
use lancast_core::protocol::{
    AUDIO_PORT, DEFAULT_BROADCAST_ADDRESS, DEFAULT_CHUNK_SIZE, MetadataEncoding, VIDEO_PORT, chunk,
};
use lancast_core::session::BroadcastConfig;
use lancast_core::video::FrameSenderConfig;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    pub network: NetworkConfig,
    pub video: VideoConfig,
    pub capture: CaptureConfig,
    pub audio: AudioConfig,
    pub stats: StatsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Destination of every datagram; the subnet broadcast address.
    pub broadcast_address: String,
    pub video_port: u16,
    pub audio_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Source selected at startup.
    pub initial_source: SourceKind,
    /// Largest data datagram, bytes.
    pub chunk_size: usize,
    pub screen_interval_ms: u64,
    pub camera_interval_ms: u64,
    /// Sleep after a capture came back empty.
    pub capture_retry_ms: u64,
    /// zstd level, 1..=19.
    pub compression_level: i32,
    /// Send `_over(W, H)` text metadata for older receivers.
    pub legacy_text_metadata: bool,
}

/// Built-in capture devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Test-pattern screen resolution.
    pub screen_width: u32,
    pub screen_height: u32,
    /// `"test"` for the test-pattern camera, `"none"` for no camera.
    pub camera: String,
    pub camera_width: u32,
    pub camera_height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Stream the microphone from startup.
    pub enabled: bool,
    pub format: AudioFormat,
    /// Frequency of the built-in tone input, Hz.
    pub tone_hz: f64,
}

/// Outgoing bandwidth reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub history_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            broadcast_address: DEFAULT_BROADCAST_ADDRESS.into(),
            video_port: VIDEO_PORT,
            audio_port: AUDIO_PORT,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            initial_source: SourceKind::Screen,
            chunk_size: DEFAULT_CHUNK_SIZE,
            screen_interval_ms: 40,
            camera_interval_ms: 50,
            capture_retry_ms: 100,
            compression_level: ZstdCodec::DEFAULT_LEVEL,
            legacy_text_metadata: false,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            screen_width: 1280,
            screen_height: 720,
            camera: "test".into(),
            camera_width: 640,
            camera_height: 480,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            format: AudioFormat::default(),
            tone_hz: 440.0,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1000,
            history_size: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl SenderConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// The origin is returned for logging once the subscriber is up.
    pub fn load(path: &Path) -> (Self, ConfigOrigin) {
        load_toml(path)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        chunk::validate_chunk_size(self.video.chunk_size)?;
        if self.video.screen_interval_ms == 0 || self.video.camera_interval_ms == 0 {
            return Err(LancastError::Config("pacing intervals must be non-zero".into()));
        }
        if self.video.capture_retry_ms == 0 {
            return Err(LancastError::Config("capture_retry_ms must be non-zero".into()));
        }
        if self.capture.screen_width == 0 || self.capture.screen_height == 0 {
            return Err(LancastError::Config("screen size must be non-zero".into()));
        }
        if !matches!(self.capture.camera.as_str(), "test" | "none") {
            return Err(LancastError::Config(format!(
                "unknown camera {:?} (expected \"test\" or \"none\")",
                self.capture.camera
            )));
        }
        let format = &self.audio.format;
        if format.frames_per_buffer == 0 || format.channels == 0 || format.sample_rate == 0 {
            return Err(LancastError::Config("audio format fields must be non-zero".into()));
        }
        if self.stats.enabled && (self.stats.interval_ms == 0 || self.stats.history_size == 0) {
            return Err(LancastError::Config(
                "stats interval and history size must be non-zero".into(),
            ));
        }
        self.broadcast_ip().map(|_| ())
    }

    fn broadcast_ip(&self) -> Result<IpAddr> {
        self.network.broadcast_address.parse().map_err(|_| {
            LancastError::Config(format!(
                "invalid broadcast address {:?}",
                self.network.broadcast_address
            ))
        })
    }

    /// Settings for the video send loop.
    pub fn frame_sender(&self) -> FrameSenderConfig {
        FrameSenderConfig {
            chunk_size: self.video.chunk_size,
            screen_interval: Duration::from_millis(self.video.screen_interval_ms),
            camera_interval: Duration::from_millis(self.video.camera_interval_ms),
            capture_retry: Duration::from_millis(self.video.capture_retry_ms),
            metadata: if self.video.legacy_text_metadata {
                MetadataEncoding::LegacyText
            } else {
                MetadataEncoding::Binary
            },
        }
    }

    /// Everything [`Broadcaster::start`](lancast_core::Broadcaster::start)
    /// needs from the config.
    pub fn broadcast(&self) -> Result<BroadcastConfig> {
        let ip = self.broadcast_ip()?;
        Ok(BroadcastConfig {
            video_target: SocketAddr::new(ip, self.network.video_port),
            audio_target: SocketAddr::new(ip, self.network.audio_port),
            video: self.frame_sender(),
            audio: self.audio.format,
            audio_enabled: self.audio.enabled,
            initial_source: self.video.initial_source,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────
