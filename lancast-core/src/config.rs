//! TOML configuration loading shared by the binaries.
//!
//! Loading happens before the log subscriber exists, so problems are
//! returned as a [`ConfigOrigin`] and logged by the caller once logging
//! is up.

use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{info, warn};

/// Where the configuration in use came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// Parsed from the file.
    File,
    /// No file at the path; defaults in use.
    Missing,
    /// The file could not be read or parsed; defaults in use.
    Invalid(String),
}

impl ConfigOrigin {
    pub fn is_default(&self) -> bool {
        !matches!(self, ConfigOrigin::File)
    }

    /// Report the origin through `tracing`.
    pub fn log(&self, path: &Path) {
        match self {
            ConfigOrigin::File => info!("loaded config from {}", path.display()),
            ConfigOrigin::Missing => info!("no config at {}; using defaults", path.display()),
            ConfigOrigin::Invalid(e) => {
                warn!("invalid config {}: {e}; using defaults", path.display())
            }
        }
    }
}

/// Load `T` from a TOML file, falling back to `T::default()`.
pub fn load_toml<T>(path: &Path) -> (T, ConfigOrigin)
where
    T: DeserializeOwned + Default,
{
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return (T::default(), ConfigOrigin::Missing);
        }
        Err(e) => return (T::default(), ConfigOrigin::Invalid(e.to_string())),
    };
    match toml::from_str(&contents) {
        Ok(config) => (config, ConfigOrigin::File),
        Err(e) => (T::default(), ConfigOrigin::Invalid(e.to_string())),
    }
}
