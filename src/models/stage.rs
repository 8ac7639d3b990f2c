//! Chain stage definitions
//!
//! Loaded once from configuration and immutable for the lifetime of a run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One node in the ordered chain: a trigger keyword with an optional action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStage {
    pub name: String,
    /// Substring awaited in the watched stream.
    pub keyword: String,
    /// Free-form text composed into the outbound message.
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub action: Option<ActionDescriptor>,
    /// Stage to await next after this one fires. Absent means the stage
    /// keeps awaiting its own keyword until a loop check terminates the run.
    #[serde(default)]
    pub next_stage: Option<String>,
    #[serde(default)]
    pub loop_check: Option<LoopCheck>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub kind: ActionKind,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    SendWorkToAgent,
    ForwardResponseToAgent,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::SendWorkToAgent => write!(f, "send-work-to-agent"),
            ActionKind::ForwardResponseToAgent => write!(f, "forward-response-to-agent"),
        }
    }
}

/// Per-stage termination bookkeeping, evaluated before the stage action.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopCheck {
    pub increment_iteration: bool,
    pub check_max_iterations: bool,
    pub check_all_resolved: bool,
}
