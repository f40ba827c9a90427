//! Interactive control over stdin.
//!
//! ```text
//! screen | camera      switch the video source
//! audio on | audio off toggle the microphone stream
//! status               print source, audio and bandwidth
//! quit                 stop broadcasting
//! ```

use std::io::BufRead;

use tokio::sync::mpsc;

use lancast_core::capture::SourceKind;

/// A parsed console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Source(SourceKind),
    Audio(bool),
    Status,
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace().map(str::to_ascii_lowercase);
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();

    let cmd = match (head.as_str(), arg.as_deref()) {
        ("screen", None) => Command::Source(SourceKind::Screen),
        ("camera", None) => Command::Source(SourceKind::Camera),
        ("source", Some(kind)) => {
            Command::Source(kind.parse().map_err(|e| format!("{e}"))?)
        }
        ("audio", Some("on")) => Command::Audio(true),
        ("audio", Some("off")) => Command::Audio(false),
        ("status", None) => Command::Status,
        ("quit" | "exit" | "q", None) => Command::Quit,
        _ => return Err(format!("unknown command {:?}", line.trim())),
    };
    if words.next().is_some() {
        return Err(format!("unexpected arguments in {:?}", line.trim()));
    }
    Ok(Some(cmd))
}

/// Stdin lines, read on a detached thread.
///
/// A blocking stdin read cannot be cancelled; on the runtime's blocking
/// pool it would hold up shutdown until the next keypress. The channel
/// closes at end of input.
pub fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}
