//! Engine-level failures surfaced to the daemon loop.

use thiserror::Error;

/// Failure inside an engine operation or an action handler.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The process host could not launch a child.
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        /// Binary the handler asked for.
        binary: String,
        /// Underlying launcher failure.
        source: std::io::Error,
    },
    /// A handler passed a view whose delay already left the FIFO.
    #[error("stale event view: delay {id} is no longer queued")]
    StaleEvent {
        /// Raw id of the vanished delay.
        id: u64,
    },
}
