//! # lancast-monitor
//!
//! Passive bandwidth monitor. Listens on the video and audio ports next
//! to a receiver (the ports are shared with `SO_REUSEADDR`), counts every
//! datagram without decoding it, and prints per-stream rates once per
//! interval.

pub mod config;
pub mod listener;
pub mod render;
