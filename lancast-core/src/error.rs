//! Error types for the broadcast pipeline.
//!
//! Errors are grouped by how far they are allowed to travel:
//!
//! - **Frame / packet scoped** (`Decode`, `Metadata`): the current frame or
//!   audio packet is dropped and the loop keeps going.
//! - **Device scoped** (`Device`): triggers source fallback or a retry.
//! - **Loop scoped** (`Bind`, `Transport`): the loop that hit it exits; the
//!   rest of the process carries on.

use thiserror::Error;

/// The canonical error type for lancast.
#[derive(Debug, Error)]
pub enum LancastError {
    // ── Network ──────────────────────────────────────────────────
    /// A receive port could not be bound (usually already in use).
    #[error("failed to bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// A send or receive failed on an already-open socket.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    // ── Payload ──────────────────────────────────────────────────
    /// Decompression or pixel decoding failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// The End marker carried unparseable frame dimensions.
    #[error("invalid frame metadata: {0}")]
    Metadata(&'static str),

    // ── Devices ──────────────────────────────────────────────────
    /// A capture or audio device could not be opened or read.
    #[error("device error: {0}")]
    Device(String),

    // ── Application ──────────────────────────────────────────────
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl LancastError {
    /// Whether the error only affects the current frame or packet.
    ///
    /// Loops continue after recoverable errors and exit after the rest.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LancastError::Decode(_) | LancastError::Metadata(_) | LancastError::Device(_)
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for LancastError {
    fn from(s: String) -> Self {
        LancastError::Other(s)
    }
}

impl From<&str> for LancastError {
    fn from(s: &str) -> Self {
        LancastError::Other(s.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, LancastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = LancastError::Bind {
            port: 22222,
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(e.to_string().contains("22222"));

        let e = LancastError::Metadata("missing comma");
        assert!(e.to_string().contains("missing comma"));
    }

    #[test]
    fn recoverability() {
        assert!(LancastError::Decode("bad zstd frame".into()).is_recoverable());
        assert!(LancastError::Device("camera busy".into()).is_recoverable());
        assert!(!LancastError::Config("chunk size".into()).is_recoverable());

        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: LancastError = io_err.into();
        assert!(matches!(e, LancastError::Transport(_)));
        assert!(!e.is_recoverable());
    }

    #[test]
    fn from_string() {
        let e: LancastError = "something broke".into();
        assert!(matches!(e, LancastError::Other(_)));
    }
}
