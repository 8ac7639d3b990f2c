//! Structured chain and monitor events
//!
//! Every stage and lock transition is reported to an `EventSink`
//! collaborator. The default sink logs through `tracing`; none of the core
//! correctness depends on a sink being attached.

use tracing::{debug, error, info, warn};

/// Why a monitor reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOutcome {
    AllResolved,
    MaxIterationsReached,
    Timeout,
    FatalError,
}

impl std::fmt::Display for TerminalOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalOutcome::AllResolved => write!(f, "all work items resolved"),
            TerminalOutcome::MaxIterationsReached => write!(f, "max iterations reached"),
            TerminalOutcome::Timeout => write!(f, "deadline exceeded"),
            TerminalOutcome::FatalError => write!(f, "fatal error"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ChainEvent {
    Detected {
        keyword: String,
        stage: String,
        position: usize,
    },
    IterationRecorded {
        iteration: u32,
    },
    ActionExecuted {
        stage: String,
        kind: String,
        iteration: u32,
    },
    /// The execution log already holds this (keyword, stage, iteration).
    ActionDeduplicated {
        stage: String,
        iteration: u32,
    },
    /// The send lock rejected the attempt; dropped, not queued.
    DuplicateSendBlocked {
        stage: String,
    },
    ActionFailed {
        stage: String,
        error: String,
    },
    StageAdvanced {
        from: String,
        to: String,
    },
    StreamFailed {
        error: String,
    },
    Terminated {
        outcome: TerminalOutcome,
    },
}

pub trait EventSink {
    fn emit(&self, event: &ChainEvent);
}

/// Default sink: structured tracing output, severities per the error
/// taxonomy (expected control flow at debug, leaks and failures louder).
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &ChainEvent) {
        match event {
            ChainEvent::Detected {
                keyword,
                stage,
                position,
            } => info!(%keyword, %stage, position, "keyword detected"),
            ChainEvent::IterationRecorded { iteration } => {
                info!(iteration, "iteration recorded");
            }
            ChainEvent::ActionExecuted {
                stage,
                kind,
                iteration,
            } => info!(%stage, %kind, iteration, "stage action executed"),
            ChainEvent::ActionDeduplicated { stage, iteration } => {
                debug!(%stage, iteration, "action already executed this iteration, skipping");
            }
            ChainEvent::DuplicateSendBlocked { stage } => {
                debug!(%stage, "send lock unavailable, attempt dropped");
            }
            ChainEvent::ActionFailed { stage, error } => {
                warn!(%stage, %error, "stage action failed, not advancing");
            }
            ChainEvent::StageAdvanced { from, to } => info!(%from, %to, "stage advanced"),
            ChainEvent::StreamFailed { error } => error!(%error, "stream read failed"),
            ChainEvent::Terminated { outcome } => info!(%outcome, "monitor terminated"),
        }
    }
}

/// Sink that drops everything. Useful where observability is wired later.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &ChainEvent) {}
}
