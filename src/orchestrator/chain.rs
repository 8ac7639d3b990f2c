//! Chain state machine
//!
//! Owns the ordered stage list and the current `(stage, awaited keyword)`
//! state. Detection events come in from the monitor; actions go out through
//! an injected [`ActionRunner`]. Loop checks run before the stage action so
//! a terminal verdict wins over one more send.

use tracing::debug;

use crate::models::{ChainEvent, ChainStage, EventSink, ExecutionLog, TerminalOutcome};
use crate::orchestrator::detector::DetectionEvent;
use crate::orchestrator::executor::{ActionOutcome, ActionRunner};
use crate::orchestrator::iteration::{IterationController, TerminationReason};
use crate::workitems::WorkItemSource;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain has no stages")]
    Empty,
    #[error("duplicate stage name: {0}")]
    DuplicateStage(String),
    #[error("stage '{stage}' points at unknown next stage '{next}'")]
    UnknownNextStage { stage: String, next: String },
}

/// Result of feeding one detection into the machine.
#[derive(Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Still awaiting the same keyword (no `next_stage`, a dropped send, or
    /// a failed action).
    Stayed,
    Advanced { from: usize, to: usize },
    Terminal(TerminalOutcome),
}

pub struct ChainStateMachine {
    stages: Vec<ChainStage>,
    index_by_name: HashMap<String, usize>,
    active: usize,
    executed: ExecutionLog,
    controller: IterationController,
}

impl ChainStateMachine {
    pub fn new(
        stages: Vec<ChainStage>,
        controller: IterationController,
    ) -> Result<Self, ChainError> {
        if stages.is_empty() {
            return Err(ChainError::Empty);
        }
        let mut index_by_name = HashMap::new();
        for (idx, stage) in stages.iter().enumerate() {
            if index_by_name.insert(stage.name.clone(), idx).is_some() {
                return Err(ChainError::DuplicateStage(stage.name.clone()));
            }
        }
        for stage in &stages {
            if let Some(next) = &stage.next_stage {
                if !index_by_name.contains_key(next) {
                    return Err(ChainError::UnknownNextStage {
                        stage: stage.name.clone(),
                        next: next.clone(),
                    });
                }
            }
        }
        Ok(Self {
            stages,
            index_by_name,
            active: 0,
            executed: ExecutionLog::new(),
            controller,
        })
    }

    pub fn awaited_keyword(&self) -> &str {
        &self.stages[self.active].keyword
    }

    pub fn active_stage(&self) -> &ChainStage {
        &self.stages[self.active]
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn iterations(&self) -> u32 {
        self.controller.iterations()
    }

    pub fn executed(&self) -> &ExecutionLog {
        &self.executed
    }

    /// Consume one detection of the awaited keyword.
    pub fn on_detection(
        &mut self,
        event: &DetectionEvent,
        runner: &mut dyn ActionRunner,
        work_items: &dyn WorkItemSource,
        sink: &dyn EventSink,
    ) -> StepOutcome {
        let stage = self.stages[self.active].clone();
        if event.keyword != stage.keyword {
            debug!(
                got = %event.keyword,
                awaited = %stage.keyword,
                "detection for a keyword the machine is not awaiting, ignoring"
            );
            return StepOutcome::Stayed;
        }

        sink.emit(&ChainEvent::Detected {
            keyword: event.keyword.clone(),
            stage: stage.name.clone(),
            position: event.position,
        });

        if let Some(check) = &stage.loop_check {
            if check.increment_iteration {
                let iteration = self.controller.record_iteration();
                sink.emit(&ChainEvent::IterationRecorded { iteration });
            }
            if let Some(reason) = self.controller.should_terminate(check, work_items) {
                let outcome = match reason {
                    TerminationReason::MaxIterations => TerminalOutcome::MaxIterationsReached,
                    TerminationReason::AllResolved => TerminalOutcome::AllResolved,
                };
                sink.emit(&ChainEvent::Terminated { outcome });
                return StepOutcome::Terminal(outcome);
            }
        }

        if let Some(action) = &stage.action {
            let iteration = self.controller.iterations();
            if self.executed.contains(&stage.keyword, self.active, iteration) {
                // Same keyword, stage and iteration: never re-fire.
                sink.emit(&ChainEvent::ActionDeduplicated {
                    stage: stage.name.clone(),
                    iteration,
                });
            } else {
                match runner.execute(&stage, action) {
                    Ok(ActionOutcome::Executed) => {
                        self.executed.record(&stage.keyword, self.active, iteration);
                        sink.emit(&ChainEvent::ActionExecuted {
                            stage: stage.name.clone(),
                            kind: action.kind.to_string(),
                            iteration,
                        });
                    }
                    Ok(ActionOutcome::SkippedDuplicate) => {
                        // Dropped, not queued; a future detection may retry.
                        sink.emit(&ChainEvent::DuplicateSendBlocked {
                            stage: stage.name.clone(),
                        });
                        return StepOutcome::Stayed;
                    }
                    Err(err) => {
                        sink.emit(&ChainEvent::ActionFailed {
                            stage: stage.name.clone(),
                            error: err.to_string(),
                        });
                        return StepOutcome::Stayed;
                    }
                }
            }
        }

        match &stage.next_stage {
            Some(next) => {
                let from = self.active;
                let to = self.index_by_name[next];
                self.active = to;
                sink.emit(&ChainEvent::StageAdvanced {
                    from: stage.name.clone(),
                    to: next.clone(),
                });
                StepOutcome::Advanced { from, to }
            }
            None => StepOutcome::Stayed,
        }
    }
}
