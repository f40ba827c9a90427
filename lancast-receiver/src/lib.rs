//! # lancast-receiver
//!
//! Listens on the video and audio ports, reassembles frames, hands them
//! to a display sink, and plays audio as it arrives. A `close` from the
//! sender ends the session.
//!
//! Either stream can be unavailable (port in use, device missing); the
//! other keeps running.

pub mod config;
pub mod presenter;
