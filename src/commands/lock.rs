//! `weft lock`: inspect or reset the shared send lock.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use crate::cli::LockAction;
use crate::sendlock::{SendLock, SendLockConfig};

pub fn execute(work_dir: &Path, action: LockAction) -> Result<()> {
    let lock = SendLock::new(work_dir, SendLockConfig::default())
        .context("failed to open send lock state")?;

    match action {
        LockAction::Show => show(&lock),
        LockAction::Reset => reset(&lock),
    }
}

fn show(lock: &SendLock) -> Result<()> {
    let state = lock.state().context("failed to read lock state")?;

    match &state.holder {
        Some(holder) => {
            println!("holder: {}", holder.red().bold());
            if let Some(acquired_at) = state.acquired_at {
                println!("acquired at: {acquired_at}");
            }
        }
        None => println!("holder: {}", "none".green()),
    }
    println!("cooldown until: {}", state.cooldown_until);

    let metrics = &state.metrics;
    println!("\nacquisitions:       {}", metrics.acquisitions);
    println!("releases:           {}", metrics.releases);
    println!("duplicates blocked: {}", metrics.duplicates_blocked);
    println!("forced releases:    {}", metrics.forced_releases);
    println!("efficiency:         {:.2}", metrics.efficiency());
    println!("duplicate rate:     {:.2}", metrics.duplicate_rate());

    if !metrics.recent.is_empty() {
        println!("\nrecent events:");
        for event in &metrics.recent {
            println!("  {} {:?} {}", event.at, event.kind, event.holder);
        }
    }
    Ok(())
}

fn reset(lock: &SendLock) -> Result<()> {
    lock.reset().context("failed to reset lock state")?;
    println!("{}", "send lock state reset".green());
    Ok(())
}
