//! Action execution against the external collaborators
//!
//! Maps a stage's action descriptor to a gateway call, guarded by the send
//! lock and wrapped in the retry policy. The whole send-and-await exchange
//! runs while the permit is held so no competing holder can interleave a
//! send on the shared channel; the permit's drop covers every exit path.

use thiserror::Error;
use tracing::debug;

use crate::agents::AgentGateway;
use crate::models::{ActionDescriptor, ActionKind, ChainStage};
use crate::retry::{FailureKind, RetryPolicy};
use crate::sendlock::{LockError, SendLock};
use crate::stream::SendError;
use crate::workitems::{WorkItemError, WorkItemSource};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("send failed after retries: {0}")]
    Send(#[from] SendError),
    #[error("send lock state unavailable: {0}")]
    Lock(#[from] LockError),
    #[error("work items unavailable: {0}")]
    WorkItems(#[from] WorkItemError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Executed,
    /// The send lock rejected the attempt. Expected control flow, never an
    /// error: the attempt is dropped, not queued.
    SkippedDuplicate,
}

/// Seam between the state machine and the real executor, so chain logic is
/// testable with scripted runners.
pub trait ActionRunner {
    fn execute(
        &mut self,
        stage: &ChainStage,
        action: &ActionDescriptor,
    ) -> Result<ActionOutcome, ActionError>;
}

pub struct ActionExecutor<'a> {
    lock: &'a SendLock,
    retry: RetryPolicy,
    gateway: &'a dyn AgentGateway,
    work_items: &'a dyn WorkItemSource,
    holder_id: String,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(
        lock: &'a SendLock,
        retry: RetryPolicy,
        gateway: &'a dyn AgentGateway,
        work_items: &'a dyn WorkItemSource,
        holder_id: impl Into<String>,
    ) -> Self {
        Self {
            lock,
            retry,
            gateway,
            work_items,
            holder_id: holder_id.into(),
        }
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    fn classify(err: &SendError) -> FailureKind {
        if err.is_transient() {
            FailureKind::Transient
        } else {
            FailureKind::Terminal
        }
    }
}

impl ActionRunner for ActionExecutor<'_> {
    fn execute(
        &mut self,
        stage: &ChainStage,
        action: &ActionDescriptor,
    ) -> Result<ActionOutcome, ActionError> {
        let Some(permit) = self.lock.permit(&self.holder_id)? else {
            return Ok(ActionOutcome::SkippedDuplicate);
        };

        // Failures below propagate with `?`; dropping the permit on that
        // path releases the lock.
        match action.kind {
            ActionKind::SendWorkToAgent => {
                let items = self.work_items.unresolved_items()?;
                let instruction = stage.instruction.as_deref();
                let response = self.retry.run(
                    |_| {
                        self.gateway
                            .send_work_to_agent(instruction, &items, &action.params)
                    },
                    Self::classify,
                )?;
                debug!(
                    stage = %stage.name,
                    items = items.len(),
                    dispatched = response.dispatched_items,
                    "work sent to agent"
                );
            }
            ActionKind::ForwardResponseToAgent => {
                let forwarded = self.retry.run(
                    |_| self.gateway.forward_response_to_agent(&action.params),
                    Self::classify,
                )?;
                debug!(stage = %stage.name, forwarded, "response forwarded to agent");
            }
        }

        permit.release()?;
        Ok(ActionOutcome::Executed)
    }
}
