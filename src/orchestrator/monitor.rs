//! Monitor runtime
//!
//! One cooperative polling loop per monitor. The loop is an explicitly
//! scheduled repeating task: every tick does a bounded amount of work (one
//! stream read, one scan) and then waits out the cadence while staying
//! responsive to cancellation. Stopping suppresses future polls only;
//! an in-flight action execution is never aborted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::{ChainEvent, EventSink, TerminalOutcome};
use crate::orchestrator::chain::{ChainStateMachine, StepOutcome};
use crate::orchestrator::detector::{PollingKeywordDetector, PollSignal};
use crate::orchestrator::executor::ActionRunner;
use crate::stream::SnapshotStream;
use crate::workitems::WorkItemSource;

/// Granularity of the cancellation check while waiting out the cadence.
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Shared cancellation token; cloning hands the same flag around.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the monitor loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStop {
    Terminal(TerminalOutcome),
    Cancelled,
}

#[derive(Debug)]
pub struct MonitorReport {
    pub monitor_id: String,
    pub stop: MonitorStop,
    pub polls: u64,
    pub iterations: u32,
    pub executed_actions: usize,
}

pub struct Monitor<S> {
    id: String,
    detector: PollingKeywordDetector<S>,
    chain: ChainStateMachine,
    poll_interval: Duration,
    cancel: CancellationFlag,
}

impl<S: SnapshotStream> Monitor<S> {
    pub fn new(
        id: impl Into<String>,
        detector: PollingKeywordDetector<S>,
        chain: ChainStateMachine,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            detector,
            chain,
            poll_interval,
            cancel: CancellationFlag::new(),
        }
    }

    /// Token for stopping this monitor from another thread or a signal
    /// handler.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Run until a terminal signal or cancellation. Blocking.
    pub fn run(
        &mut self,
        runner: &mut dyn ActionRunner,
        work_items: &dyn WorkItemSource,
        sink: &dyn EventSink,
    ) -> MonitorReport {
        info!(
            monitor = %self.id,
            awaiting = %self.chain.awaited_keyword(),
            "monitor started"
        );

        loop {
            if self.cancel.is_cancelled() {
                info!(monitor = %self.id, "monitor cancelled");
                return self.report(MonitorStop::Cancelled);
            }

            let keyword = self.chain.awaited_keyword().to_string();
            match self.detector.poll(&keyword) {
                Some(PollSignal::Timeout) => {
                    warn!(monitor = %self.id, "deadline exceeded");
                    sink.emit(&ChainEvent::Terminated {
                        outcome: TerminalOutcome::Timeout,
                    });
                    return self.report(MonitorStop::Terminal(TerminalOutcome::Timeout));
                }
                Some(PollSignal::StreamFailed(err)) => {
                    sink.emit(&ChainEvent::StreamFailed {
                        error: err.to_string(),
                    });
                    sink.emit(&ChainEvent::Terminated {
                        outcome: TerminalOutcome::FatalError,
                    });
                    return self.report(MonitorStop::Terminal(TerminalOutcome::FatalError));
                }
                Some(PollSignal::Detection(event)) => {
                    if let StepOutcome::Terminal(outcome) =
                        self.chain.on_detection(&event, runner, work_items, sink)
                    {
                        return self.report(MonitorStop::Terminal(outcome));
                    }
                }
                None => {}
            }

            self.wait_out_cadence();
        }
    }

    /// Sleep for the poll interval in small slices so `stop()` takes effect
    /// promptly.
    fn wait_out_cadence(&self) {
        let mut remaining = self.poll_interval;
        while remaining > Duration::ZERO && !self.cancel.is_cancelled() {
            let slice = remaining.min(CANCEL_CHECK_INTERVAL);
            std::thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
    }

    fn report(&self, stop: MonitorStop) -> MonitorReport {
        MonitorReport {
            monitor_id: self.id.clone(),
            stop,
            polls: self.detector.poll_count(),
            iterations: self.chain.iterations(),
            executed_actions: self.chain.executed().len(),
        }
    }
}
