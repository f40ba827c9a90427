//! Long-running loop bookkeeping.
//!
//! Every network loop runs as its own Tokio task and stops cooperatively
//! through a [`CancellationToken`]. [`LoopSet`] tracks a group of loops
//! that share one token so a session can be stopped and joined as a unit.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::Result;

/// Why a loop returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The peer sent a Close marker.
    Closed,
    /// The local cancellation token fired.
    Cancelled,
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `false` if the sleep was cut short.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

struct NamedLoop {
    name: &'static str,
    handle: JoinHandle<Result<LoopExit>>,
}

/// A group of loops sharing one cancellation token.
pub struct LoopSet {
    cancel: CancellationToken,
    loops: Vec<NamedLoop>,
}

impl LoopSet {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            loops: Vec::new(),
        }
    }

    /// Token shared by every loop in the set.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn `fut` as a named loop.
    pub fn spawn<F>(&mut self, name: &'static str, fut: F)
    where
        F: Future<Output = Result<LoopExit>> + Send + 'static,
    {
        debug!("starting {name} loop");
        self.loops.push(NamedLoop {
            name,
            handle: tokio::spawn(fut),
        });
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Signal every loop to stop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for every loop to finish.
    ///
    /// Loop errors are logged here; the result is [`LoopExit::Closed`]
    /// if any loop saw a Close marker.
    pub async fn join(self) -> LoopExit {
        let mut exit = LoopExit::Cancelled;
        for NamedLoop { name, handle } in self.loops {
            match handle.await {
                Ok(Ok(LoopExit::Closed)) => {
                    debug!("{name} loop closed by peer");
                    exit = LoopExit::Closed;
                }
                Ok(Ok(LoopExit::Cancelled)) => debug!("{name} loop cancelled"),
                Ok(Err(e)) => error!("{name} loop stopped: {e}"),
                Err(e) => error!("{name} loop panicked: {e}"),
            }
        }
        exit
    }
}
