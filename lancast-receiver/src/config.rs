//! Configuration for the broadcast receiver.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use lancast_core::audio::AudioFormat;
use lancast_core::config::{ConfigOrigin, load_toml};
use lancast_core::error::{LancastError, Result};
use lancast_core::protocol::{AUDIO_PORT, VIDEO_PORT};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub network: NetworkConfig,
    pub video: VideoConfig,
    pub audio: AudioConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Interface to listen on; all interfaces by default.
    pub bind_address: String,
    pub video_port: u16,
    pub audio_port: u16,
    /// Bind with `SO_REUSEADDR`/`SO_REUSEPORT` so a monitor can listen on
    /// the same ports.
    pub share_ports: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub enabled: bool,
    /// Frames whose compressed size grows past this are dropped.
    pub max_frame_mb: usize,
    /// Write the latest frame here as a binary PPM; empty disables.
    pub snapshot_path: String,
    /// Snapshot and log every N presented frames.
    pub snapshot_every: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    pub format: AudioFormat,
    /// Append received PCM to this raw file; empty disables.
    pub record_path: String,
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
            bind_address: "0.0.0.0".into(),
            video_port: VIDEO_PORT,
            audio_port: AUDIO_PORT,
            share_ports: true,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_frame_mb: 64,
            snapshot_path: String::new(),
            snapshot_every: 25,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: AudioFormat::default(),
            record_path: String::new(),
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

impl ReceiverConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// The origin is returned for logging once the subscriber is up.
    pub fn load(path: &Path) -> (Self, ConfigOrigin) {
        load_toml(path)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.video.enabled && !self.audio.enabled {
            return Err(LancastError::Config("both video and audio are disabled".into()));
        }
        if self.video.max_frame_mb == 0 || self.video.snapshot_every == 0 {
            return Err(LancastError::Config(
                "max_frame_mb and snapshot_every must be non-zero".into(),
            ));
        }
        let format = &self.audio.format;
        if format.frames_per_buffer == 0 || format.channels == 0 || format.sample_rate == 0 {
            return Err(LancastError::Config("audio format fields must be non-zero".into()));
        }
        self.bind_ip().map(|_| ())
    }

    fn bind_ip(&self) -> Result<IpAddr> {
        self.network.bind_address.parse().map_err(|_| {
            LancastError::Config(format!("invalid bind address {:?}", self.network.bind_address))
        })
    }

    pub fn video_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(self.bind_ip()?, self.network.video_port))
    }

    pub fn audio_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(self.bind_ip()?, self.network.audio_port))
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.video.max_frame_mb.saturating_mul(1024 * 1024)
    }

    pub fn snapshot_path(&self) -> Option<PathBuf> {
        non_empty(&self.video.snapshot_path)
    }

    pub fn record_path(&self) -> Option<PathBuf> {
        non_empty(&self.audio.record_path)
    }
}

fn non_empty(path: &str) -> Option<PathBuf> {
    (!path.trim().is_empty()).then(|| PathBuf::from(path))
}

// ── Tests ────────────────────────────────────────────────────────
