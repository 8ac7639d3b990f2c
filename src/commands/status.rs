//! `weft status`: chain overview and lock health.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use crate::config::WeftConfig;
use crate::sendlock::{SendLock, SendLockConfig};

pub fn execute(work_dir: &Path, config_path: &Path) -> Result<()> {
    println!("{}", "Weft Status".bold().blue());
    println!("{}", "=".repeat(50));

    match WeftConfig::load(config_path) {
        Ok(config) => {
            println!("\n{}", "Chain".bold());
            for (idx, stage) in config.stages.iter().enumerate() {
                let action = stage
                    .action
                    .as_ref()
                    .map(|a| a.kind.to_string())
                    .unwrap_or_else(|| "wait".to_string());
                let next = stage.next_stage.as_deref().unwrap_or("(self)");
                println!(
                    "  {idx}. {} awaits '{}' -> {action} -> {next}",
                    stage.name.bold(),
                    stage.keyword
                );
            }
            println!(
                "\n  max_iterations: {}  poll: {}ms  deadline: {}s",
                config.run.max_iterations, config.run.poll_interval_ms, config.run.deadline_secs
            );
        }
        Err(err) => {
            println!(
                "\n{} {err}",
                "no usable chain config:".yellow()
            );
        }
    }

    let lock = SendLock::new(work_dir, SendLockConfig::default())
        .context("failed to open send lock state")?;
    let state = lock.state().context("failed to read lock state")?;

    println!("\n{}", "Send Lock".bold());
    match &state.holder {
        Some(holder) => println!("  holder: {}", holder.red()),
        None => println!("  holder: {}", "none".green()),
    }
    let metrics = &state.metrics;
    println!(
        "  acquisitions: {}  releases: {}  duplicates blocked: {}  forced releases: {}",
        metrics.acquisitions,
        metrics.releases,
        metrics.duplicates_blocked,
        metrics.forced_releases
    );
    println!(
        "  efficiency: {:.2}  duplicate rate: {:.2}",
        metrics.efficiency(),
        metrics.duplicate_rate()
    );

    println!();
    Ok(())
}
