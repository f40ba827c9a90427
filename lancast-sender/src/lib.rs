//! # lancast-sender
//!
//! Broadcasts the screen (or camera) and optionally the microphone to
//! every host on the local segment.
//!
//! The built-in devices are synthetic: a moving test pattern stands in
//! for the screen grab, a second pattern for the camera, and a sine tone
//! for the microphone. Sources are switched at runtime from stdin.

pub mod config;
pub mod console;
