//! Agent-forwarding collaborators
//!
//! The gateway composes outbound messages and drives the two logical
//! channels: the code-fixing agent and the analysis agent. The agent's
//! actual reply arrives later through the watched stream; the response
//! returned here only acknowledges what was dispatched.

use std::collections::BTreeMap;
use tracing::debug;

use crate::stream::{OutboundSender, SendError, SnapshotStream};
use crate::workitems::WorkItem;

/// Acknowledgement of a dispatched message.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub dispatched_items: usize,
    pub text: String,
}

pub trait AgentGateway {
    /// Compose an instruction plus the outstanding items and deliver it to
    /// the code-fixing agent.
    fn send_work_to_agent(
        &self,
        instruction: Option<&str>,
        items: &[WorkItem],
        params: &BTreeMap<String, String>,
    ) -> Result<AgentResponse, SendError>;

    /// Capture the fixer's recent output and hand it to the analysis agent.
    fn forward_response_to_agent(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<bool, SendError>;
}

/// Gateway over a source stream and two outbound channels.
pub struct SenderGateway<S, F, A> {
    source: S,
    fixer: F,
    analysis: A,
    forward_tail_lines: usize,
}

impl<S, F, A> SenderGateway<S, F, A> {
    pub fn new(source: S, fixer: F, analysis: A, forward_tail_lines: usize) -> Self {
        Self {
            source,
            fixer,
            analysis,
            forward_tail_lines,
        }
    }
}

impl<S, F, A> AgentGateway for SenderGateway<S, F, A>
where
    S: SnapshotStream,
    F: OutboundSender,
    A: OutboundSender,
{
    fn send_work_to_agent(
        &self,
        instruction: Option<&str>,
        items: &[WorkItem],
        params: &BTreeMap<String, String>,
    ) -> Result<AgentResponse, SendError> {
        let message = compose_work_message(instruction, items, params);
        self.fixer.send(&message)?;
        debug!(items = items.len(), "work message delivered to fixer channel");
        Ok(AgentResponse {
            dispatched_items: items.len(),
            text: message,
        })
    }

    fn forward_response_to_agent(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<bool, SendError> {
        let snapshot = self
            .source
            .read_snapshot()
            .map_err(|err| SendError::CommandFailed(format!("capture for forward failed: {err}")))?;
        let tail = last_lines(&snapshot, self.forward_tail_lines);

        let mut message = String::new();
        if let Some(preamble) = params.get("preamble") {
            message.push_str(preamble);
            message.push_str("\n\n");
        }
        message.push_str(&tail);

        self.analysis.send(&message)?;
        debug!(lines = self.forward_tail_lines, "response forwarded to analysis channel");
        Ok(true)
    }
}

fn compose_work_message(
    instruction: Option<&str>,
    items: &[WorkItem],
    params: &BTreeMap<String, String>,
) -> String {
    let mut message = String::new();
    if let Some(instruction) = instruction {
        message.push_str(instruction);
        message.push('\n');
    }
    if !items.is_empty() {
        message.push_str("Outstanding items:\n");
        for item in items {
            message.push_str(&format!("- {}\n", item.text));
        }
    }
    if let Some(suffix) = params.get("suffix") {
        message.push_str(suffix);
        message.push('\n');
    }
    message.trim_end().to_string()
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= count {
        return text.trim_end().to_string();
    }
    lines[lines.len() - count..].join("\n")
}
