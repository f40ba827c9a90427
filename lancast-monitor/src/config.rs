//! Configuration for the bandwidth monitor.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use lancast_core::bandwidth::{DEFAULT_HISTORY_CAPACITY, DEFAULT_SAMPLE_INTERVAL};
use lancast_core::config::{ConfigOrigin, load_toml};
use lancast_core::error::{LancastError, Result};
use lancast_core::protocol::{AUDIO_PORT, VIDEO_PORT};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub network: NetworkConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub video_port: u16,
    pub audio_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Refresh interval in milliseconds.
    pub interval_ms: u64,
    /// Samples kept per stream.
    pub history_size: usize,
    /// Append a sparkline of the total rate to every line.
    pub sparkline: bool,
    /// Emit one JSON snapshot per interval instead of text.
    pub json: bool,
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
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_SAMPLE_INTERVAL.as_millis() as u64,
            history_size: DEFAULT_HISTORY_CAPACITY,
            sparkline: true,
            json: false,
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

impl MonitorConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// The origin is returned for logging once the subscriber is up.
    pub fn load(path: &Path) -> (Self, ConfigOrigin) {
        load_toml(path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.display.interval_ms == 0 {
            return Err(LancastError::Config("interval_ms must be positive".into()));
        }
        if self.display.history_size == 0 {
            return Err(LancastError::Config("history_size must be positive".into()));
        }
        self.bind_ip().map(|_| ())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.display.interval_ms)
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_sample_once_a_second() {
        let cfg = MonitorConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.interval(), Duration::from_secs(1));
        assert_eq!(cfg.display.history_size, 60);
        assert_eq!(cfg.video_addr().unwrap().port(), 22222);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg: MonitorConfig = toml::from_str("[display]\njson = true\n").unwrap();
        assert!(cfg.display.json);
        assert!(cfg.display.sparkline);
        assert_eq!(cfg.network.audio_port, 22223);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut cfg = MonitorConfig::default();
        cfg.display.interval_ms = 0;
        assert!(cfg.validate().is_err());
    }
}
