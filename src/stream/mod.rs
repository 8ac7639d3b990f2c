//! Stream collaborator traits
//!
//! The detector and the executor never touch a terminal directly; they go
//! through the narrow capability traits defined here. The concrete tmux
//! adapter lives in `tmux.rs` and is injected at wiring time, so tests can
//! substitute scripted implementations.

pub mod tmux;

use thiserror::Error;

pub use tmux::{check_tmux_available, TmuxPane};

/// Failure while reading a snapshot of the watched stream.
///
/// Read failures are fatal to the monitor that hit them; the detector never
/// retries a read on its own.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to invoke capture command: {0}")]
    Io(#[from] std::io::Error),
    #[error("capture command failed: {0}")]
    CommandFailed(String),
}

/// Failure while sending on the shared outbound channel.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to invoke send command: {0}")]
    Io(#[from] std::io::Error),
    #[error("send command failed: {0}")]
    CommandFailed(String),
    #[error("outbound channel is gone: {0}")]
    ChannelClosed(String),
}

impl SendError {
    /// Whether a retry has any chance of succeeding.
    ///
    /// A closed channel (the target pane no longer exists) is terminal;
    /// everything else is treated as a transient hiccup.
    pub fn is_transient(&self) -> bool {
        !matches!(self, SendError::ChannelClosed(_))
    }
}

/// Read one full snapshot of the external stream's recent tail.
pub trait SnapshotStream {
    fn read_snapshot(&self) -> Result<String, ReadError>;
}

/// Deliver text on the single shared outbound channel.
///
/// Implementations are only ever invoked under the send lock and wrapped by
/// the retry policy; they do not retry internally.
pub trait OutboundSender {
    fn send(&self, text: &str) -> Result<(), SendError>;
}
