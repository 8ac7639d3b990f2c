//! `weft run`: start a monitor and drive the chain.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::Path;

use crate::agents::SenderGateway;
use crate::config::WeftConfig;
use crate::models::{TerminalOutcome, TracingSink};
use crate::orchestrator::{
    ActionExecutor, ChainStateMachine, IterationController, Monitor, MonitorStop,
    PollingKeywordDetector,
};
use crate::retry::RetryPolicy;
use crate::sendlock::{SendLock, SendLockConfig};
use crate::stream::{check_tmux_available, TmuxPane};
use crate::workitems::MarkdownChecklist;

pub fn execute(work_dir: &Path, config_path: &Path, monitor_id: Option<String>) -> Result<()> {
    let config = WeftConfig::load(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    check_tmux_available()?;

    let monitor_id =
        monitor_id.unwrap_or_else(|| format!("monitor-{}", uuid::Uuid::new_v4().simple()));

    let lock = SendLock::new(
        work_dir,
        SendLockConfig {
            cooldown: config.lock.cooldown(),
            force_release_after: config.lock.force_release_after(),
        },
    )
    .context("failed to open send lock state")?;

    let fixer_pane = TmuxPane::new(&config.agents.fixer_target);
    let analysis_pane = TmuxPane::new(
        config
            .agents
            .analysis_target
            .as_deref()
            .unwrap_or(&config.agents.fixer_target),
    );
    let work_items = MarkdownChecklist::new(&config.agents.work_items);
    let gateway = SenderGateway::new(
        fixer_pane.clone(),
        fixer_pane.clone(),
        analysis_pane,
        config.agents.forward_tail_lines,
    );

    let mut runner = ActionExecutor::new(
        &lock,
        RetryPolicy::default(),
        &gateway,
        &work_items,
        monitor_id.clone(),
    );

    let controller = IterationController::new(
        config.run.max_iterations,
        config.run.check_all_resolved,
        config.run.exit_on_all_resolved,
    );
    let chain = ChainStateMachine::new(config.stages.clone(), controller)
        .context("invalid stage chain")?;
    let detector = PollingKeywordDetector::new(
        fixer_pane,
        config.run.tail_lines,
        config.run.deadline(),
    );

    let mut monitor = Monitor::new(
        monitor_id.clone(),
        detector,
        chain,
        config.run.poll_interval(),
    );

    let flag = monitor.cancellation();
    ctrlc::set_handler(move || {
        eprintln!("stopping after the current tick...");
        flag.cancel();
    })
    .context("failed to install interrupt handler")?;

    println!(
        "{} {} watching {}",
        "weft".bold(),
        monitor_id.dimmed(),
        config.agents.fixer_target
    );

    let report = monitor.run(&mut runner, &work_items, &TracingSink);

    println!();
    match report.stop {
        MonitorStop::Terminal(outcome) => {
            let label = match outcome {
                TerminalOutcome::AllResolved => "all work items resolved".green().bold(),
                TerminalOutcome::MaxIterationsReached => "max iterations reached".yellow().bold(),
                TerminalOutcome::Timeout => "deadline exceeded".yellow().bold(),
                TerminalOutcome::FatalError => "fatal stream error".red().bold(),
            };
            println!("{label}");
        }
        MonitorStop::Cancelled => println!("{}", "stopped".yellow()),
    }
    println!(
        "  polls: {}  iterations: {}  actions: {}",
        report.polls, report.iterations, report.executed_actions
    );

    if report.stop == MonitorStop::Terminal(TerminalOutcome::FatalError) {
        bail!("monitor stopped on a fatal stream error");
    }
    Ok(())
}
