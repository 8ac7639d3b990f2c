//! Iteration counting and termination checks
//!
//! The controller owns the bounded loop counter and answers "should this run
//! stop" from a stage's loop check. It has no idea what a resolved work item
//! is; that question is delegated to the injected collaborator.

use tracing::{info, warn};

use crate::models::LoopCheck;
use crate::workitems::WorkItemSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    MaxIterations,
    AllResolved,
}

#[derive(Debug)]
pub struct IterationController {
    iterations: u32,
    max_iterations: u32,
    check_all_resolved: bool,
    exit_on_all_resolved: bool,
}

impl IterationController {
    pub fn new(max_iterations: u32, check_all_resolved: bool, exit_on_all_resolved: bool) -> Self {
        Self {
            iterations: 0,
            max_iterations,
            check_all_resolved,
            exit_on_all_resolved,
        }
    }

    /// Increment the bounded counter; returns the new count.
    pub fn record_iteration(&mut self) -> u32 {
        self.iterations = self.iterations.saturating_add(1);
        self.iterations
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Evaluate a stage's loop check. Reaching the iteration ceiling is a
    /// defined, reported outcome, not an error. A failing resolution probe
    /// is logged and treated as "not resolved yet" for this cycle.
    pub fn should_terminate(
        &self,
        check: &LoopCheck,
        work_items: &dyn WorkItemSource,
    ) -> Option<TerminationReason> {
        if check.check_max_iterations && self.iterations >= self.max_iterations {
            return Some(TerminationReason::MaxIterations);
        }

        if check.check_all_resolved && self.check_all_resolved {
            match work_items.all_resolved() {
                Ok(true) => {
                    if self.exit_on_all_resolved {
                        return Some(TerminationReason::AllResolved);
                    }
                    info!("all work items resolved, continuing per configuration");
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(error = %err, "resolution probe failed, assuming unresolved");
                }
            }
        }

        None
    }
}
