//! tmux-backed stream adapter
//!
//! Reads pane content with `tmux capture-pane -p` and delivers text with
//! `tmux send-keys`. One `TmuxPane` per target; the same pane can serve as
//! both the watched stream and the outbound channel.

use anyhow::{bail, Result};
use std::process::Command;

use super::{OutboundSender, ReadError, SendError, SnapshotStream};

/// Check that tmux is installed and reachable on PATH.
pub fn check_tmux_available() -> Result<()> {
    if which::which("tmux").is_err() {
        bail!("tmux not found on PATH. Install tmux or point weft at an existing server.");
    }
    Ok(())
}

/// A single tmux pane addressed by target (`session`, `session:window` or
/// `session:window.pane`).
#[derive(Debug, Clone)]
pub struct TmuxPane {
    target: String,
}

impl TmuxPane {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn run_tmux(args: &[&str]) -> std::io::Result<std::process::Output> {
        Command::new("tmux").args(args).output()
    }

    fn missing_target(stderr: &str) -> bool {
        stderr.contains("can't find") || stderr.contains("no server running")
    }
}

impl SnapshotStream for TmuxPane {
    fn read_snapshot(&self) -> Result<String, ReadError> {
        let output = Self::run_tmux(&["capture-pane", "-p", "-t", &self.target])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ReadError::CommandFailed(stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl OutboundSender for TmuxPane {
    fn send(&self, text: &str) -> Result<(), SendError> {
        // Literal text first (-l avoids key-name interpretation), then Enter
        // as a separate key press to submit it.
        let output = Self::run_tmux(&["send-keys", "-t", &self.target, "-l", text])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if Self::missing_target(&stderr) {
                return Err(SendError::ChannelClosed(stderr));
            }
            return Err(SendError::CommandFailed(stderr));
        }

        let output = Self::run_tmux(&["send-keys", "-t", &self.target, "Enter"])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(SendError::CommandFailed(stderr));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pane_target_roundtrip() {
        let pane = TmuxPane::new("weft:0.1");
        assert_eq!(pane.target(), "weft:0.1");
    }

    #[test]
    fn test_missing_target_classification() {
        assert!(TmuxPane::missing_target("can't find pane: weft:9"));
        assert!(TmuxPane::missing_target(
            "no server running on /tmp/tmux-1000/default"
        ));
        assert!(!TmuxPane::missing_target("usage: send-keys ..."));
    }
}
