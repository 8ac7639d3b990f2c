//! Full-loop flows: detector -> chain -> executor -> gateway

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};

use weft::agents::SenderGateway;
use weft::models::{
    ActionDescriptor, ActionKind, ChainStage, LoopCheck, NullSink, TerminalOutcome,
};
use weft::orchestrator::{
    ActionExecutor, ChainStateMachine, IterationController, Monitor, MonitorStop,
    PollingKeywordDetector,
};
use weft::retry::RetryPolicy;
use weft::sendlock::{SendLock, SendLockConfig};
use weft::stream::{OutboundSender, ReadError, SendError, SnapshotStream};
use weft::workitems::MarkdownChecklist;

/// Stream over a shared buffer a test thread can append to.
#[derive(Clone)]
struct SharedStream(Arc<Mutex<String>>);

impl SnapshotStream for SharedStream {
    fn read_snapshot(&self) -> Result<String, ReadError> {
        Ok(self.0.lock().unwrap().clone())
    }
}

/// Sender recording everything delivered on the shared channel.
#[derive(Clone)]
struct RecordingSender(Arc<Mutex<Vec<String>>>);

impl OutboundSender for RecordingSender {
    fn send(&self, text: &str) -> Result<(), SendError> {
        self.0.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        initial_delay: Duration::from_millis(2),
        multiplier: 2.0,
        max_delay: Duration::from_millis(10),
        max_retries: 3,
        jitter_fraction: 0.0,
    }
}

fn no_cooldown_lock(dir: &TempDir) -> SendLock {
    SendLock::new(
        dir.path(),
        SendLockConfig {
            cooldown: Duration::ZERO,
            force_release_after: Duration::from_secs(300),
        },
    )
    .unwrap()
}

fn checklist(content: &str) -> (NamedTempFile, MarkdownChecklist) {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    let list = MarkdownChecklist::new(file.path());
    (file, list)
}

fn looping_stage(check: LoopCheck) -> ChainStage {
    ChainStage {
        name: "fix".to_string(),
        keyword: "TASK_FINISHED".to_string(),
        instruction: Some("Work through the outstanding items.".to_string()),
        action: Some(ActionDescriptor {
            kind: ActionKind::SendWorkToAgent,
            params: BTreeMap::new(),
        }),
        next_stage: None,
        loop_check: Some(check),
    }
}

#[test]
fn test_loop_runs_until_max_iterations() {
    let dir = TempDir::new().unwrap();
    let lock = no_cooldown_lock(&dir);
    let (_items_file, work_items) = checklist("- [ ] fix the build\n");

    let buffer = Arc::new(Mutex::new(String::from("booting\n")));
    let stream = SharedStream(Arc::clone(&buffer));
    let sent = Arc::new(Mutex::new(Vec::new()));
    let sender = RecordingSender(Arc::clone(&sent));
    let gateway = SenderGateway::new(stream.clone(), sender.clone(), sender.clone(), 10);

    let mut runner = ActionExecutor::new(&lock, fast_retry(), &gateway, &work_items, "m1");

    let check = LoopCheck {
        increment_iteration: true,
        check_max_iterations: true,
        check_all_resolved: false,
    };
    let controller = IterationController::new(3, false, false);
    let chain = ChainStateMachine::new(vec![looping_stage(check)], controller).unwrap();
    let detector = PollingKeywordDetector::new(stream, 400, Duration::from_secs(30));
    let mut monitor = Monitor::new("m1", detector, chain, Duration::from_millis(5));

    let writer = Arc::clone(&buffer);
    std::thread::scope(|scope| {
        scope.spawn(move || {
            for round in 1..=3 {
                std::thread::sleep(Duration::from_millis(40));
                writer
                    .lock()
                    .unwrap()
                    .push_str(&format!("agent output {round}\nTASK_FINISHED\n"));
            }
        });

        let report = monitor.run(&mut runner, &work_items, &NullSink);
        assert_eq!(
            report.stop,
            MonitorStop::Terminal(TerminalOutcome::MaxIterationsReached)
        );
        assert_eq!(report.iterations, 3);
        // The third detection terminated before acting.
        assert_eq!(report.executed_actions, 2);
    });

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].contains("fix the build"));

    // Every guarded send released the shared lock.
    let state = lock.state().unwrap();
    assert_eq!(state.holder, None);
    assert_eq!(state.metrics.acquisitions, 2);
    assert_eq!(state.metrics.releases, 2);
}

#[test]
fn test_loop_terminates_when_all_items_resolved() {
    let dir = TempDir::new().unwrap();
    let lock = no_cooldown_lock(&dir);
    let (_items_file, work_items) = checklist("- [x] fix the build\n- [x] green the tests\n");

    let buffer = Arc::new(Mutex::new(String::from("agent output\nTASK_FINISHED\n")));
    let stream = SharedStream(Arc::clone(&buffer));
    let sent = Arc::new(Mutex::new(Vec::new()));
    let sender = RecordingSender(Arc::clone(&sent));
    let gateway = SenderGateway::new(stream.clone(), sender.clone(), sender.clone(), 10);

    let mut runner = ActionExecutor::new(&lock, fast_retry(), &gateway, &work_items, "m1");

    let check = LoopCheck {
        increment_iteration: true,
        check_max_iterations: true,
        check_all_resolved: true,
    };
    let controller = IterationController::new(10, true, true);
    let chain = ChainStateMachine::new(vec![looping_stage(check)], controller).unwrap();
    let detector = PollingKeywordDetector::new(stream, 400, Duration::from_secs(30));
    let mut monitor = Monitor::new("m1", detector, chain, Duration::from_millis(5));

    let report = monitor.run(&mut runner, &work_items, &NullSink);
    assert_eq!(
        report.stop,
        MonitorStop::Terminal(TerminalOutcome::AllResolved)
    );
    // Nothing was sent: the loop check short-circuited the action.
    assert!(sent.lock().unwrap().is_empty());
}

#[test]
fn test_two_stage_chain_alternates_channels() {
    let dir = TempDir::new().unwrap();
    let lock = no_cooldown_lock(&dir);
    let (_items_file, work_items) = checklist("- [ ] open item\n");

    let buffer = Arc::new(Mutex::new(String::from("start\n")));
    let stream = SharedStream(Arc::clone(&buffer));
    let fixer_sent = Arc::new(Mutex::new(Vec::new()));
    let analysis_sent = Arc::new(Mutex::new(Vec::new()));
    let gateway = SenderGateway::new(
        stream.clone(),
        RecordingSender(Arc::clone(&fixer_sent)),
        RecordingSender(Arc::clone(&analysis_sent)),
        10,
    );

    let mut runner = ActionExecutor::new(&lock, fast_retry(), &gateway, &work_items, "m1");

    let mut forward_params = BTreeMap::new();
    forward_params.insert("preamble".to_string(), "Review this:".to_string());
    let stages = vec![
        ChainStage {
            name: "fix".to_string(),
            keyword: "TASK_FINISHED".to_string(),
            instruction: None,
            action: Some(ActionDescriptor {
                kind: ActionKind::ForwardResponseToAgent,
                params: forward_params,
            }),
            next_stage: Some("analyze".to_string()),
            loop_check: None,
        },
        ChainStage {
            name: "analyze".to_string(),
            keyword: "ANALYSIS_DONE".to_string(),
            instruction: Some("Next round.".to_string()),
            action: Some(ActionDescriptor {
                kind: ActionKind::SendWorkToAgent,
                params: BTreeMap::new(),
            }),
            next_stage: Some("fix".to_string()),
            loop_check: Some(LoopCheck {
                increment_iteration: true,
                check_max_iterations: true,
                check_all_resolved: false,
            }),
        },
    ];
    let controller = IterationController::new(1, false, false);
    let chain = ChainStateMachine::new(stages, controller).unwrap();
    let detector = PollingKeywordDetector::new(stream, 400, Duration::from_secs(30));
    let mut monitor = Monitor::new("m1", detector, chain, Duration::from_millis(5));

    let writer = Arc::clone(&buffer);
    std::thread::scope(|scope| {
        scope.spawn(move || {
            std::thread::sleep(Duration::from_millis(40));
            writer
                .lock()
                .unwrap()
                .push_str("fixer says TASK_FINISHED\n");
            std::thread::sleep(Duration::from_millis(40));
            writer
                .lock()
                .unwrap()
                .push_str("analysis says ANALYSIS_DONE\n");
        });

        let report = monitor.run(&mut runner, &work_items, &NullSink);
        // The analyze stage's loop check fired on its first iteration.
        assert_eq!(
            report.stop,
            MonitorStop::Terminal(TerminalOutcome::MaxIterationsReached)
        );
        assert_eq!(report.executed_actions, 1);
    });

    // Stage one forwarded to the analysis channel; the terminal detection
    // on stage two never sent.
    assert_eq!(analysis_sent.lock().unwrap().len(), 1);
    assert!(analysis_sent.lock().unwrap()[0].starts_with("Review this:"));
    assert!(fixer_sent.lock().unwrap().is_empty());
}

#[test]
fn test_unchanged_buffer_never_double_fires() {
    let dir = TempDir::new().unwrap();
    let lock = no_cooldown_lock(&dir);
    let (_items_file, work_items) = checklist("- [ ] open item\n");

    let buffer = Arc::new(Mutex::new(String::from("output\nTASK_FINISHED\n")));
    let stream = SharedStream(Arc::clone(&buffer));
    let sent = Arc::new(Mutex::new(Vec::new()));
    let sender = RecordingSender(Arc::clone(&sent));
    let gateway = SenderGateway::new(stream.clone(), sender.clone(), sender.clone(), 10);

    let mut runner = ActionExecutor::new(&lock, fast_retry(), &gateway, &work_items, "m1");

    // No loop check: the stage would re-fire on every detection if the
    // detector mistook the unchanged buffer for a new occurrence.
    let stage = ChainStage {
        loop_check: None,
        ..looping_stage(LoopCheck::default())
    };
    let controller = IterationController::new(10, false, false);
    let chain = ChainStateMachine::new(vec![stage], controller).unwrap();
    let detector = PollingKeywordDetector::new(stream, 400, Duration::from_millis(400));
    let mut monitor = Monitor::new("m1", detector, chain, Duration::from_millis(5));

    // Runs until the short deadline; the buffer never changes after the
    // first detection.
    let report = monitor.run(&mut runner, &work_items, &NullSink);
    assert_eq!(report.stop, MonitorStop::Terminal(TerminalOutcome::Timeout));
    assert_eq!(sent.lock().unwrap().len(), 1);
}
