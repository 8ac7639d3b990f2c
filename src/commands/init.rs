//! `weft init`: write starter configuration.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

const STARTER_CONFIG: &str = r#"# weft chain configuration
#
# Two agents in tmux panes: the fixer works through WORK_ITEMS.md and prints
# TASK_FINISHED when it stops; the analysis agent reviews the output and
# prints ANALYSIS_DONE. weft shuttles between them until every item is
# checked off or the iteration ceiling is hit.

[run]
max_iterations = 10
check_all_resolved = true
exit_on_all_resolved = true
poll_interval_ms = 2000
deadline_secs = 3600
tail_lines = 400

[lock]
cooldown_ms = 3000
force_release_after_secs = 300

[agents]
fixer_target = "weft:0"
analysis_target = "weft:1"
work_items = "WORK_ITEMS.md"
forward_tail_lines = 40

[[stage]]
name = "fix"
keyword = "TASK_FINISHED"
instruction = "Continue with the outstanding work items below. Print TASK_FINISHED when done."
next_stage = "analyze"

[stage.action]
kind = "forward-response-to-agent"

[stage.action.params]
preamble = "Review the fixer output below and print ANALYSIS_DONE with your verdict."

[stage.loop_check]
increment_iteration = true
check_max_iterations = true
check_all_resolved = true

[[stage]]
name = "analyze"
keyword = "ANALYSIS_DONE"
next_stage = "fix"

[stage.action]
kind = "send-work-to-agent"
"#;

const STARTER_ITEMS: &str = r#"# Work items

- [ ] example: make the test suite pass
- [ ] example: fix the reported lint warnings
"#;

pub fn execute(work_dir: &Path, config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    fs::create_dir_all(work_dir)
        .with_context(|| format!("failed to create {}", work_dir.display()))?;
    fs::write(config_path, STARTER_CONFIG)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    let items_path = Path::new("WORK_ITEMS.md");
    if !items_path.exists() {
        fs::write(items_path, STARTER_ITEMS).context("failed to write WORK_ITEMS.md")?;
    }

    println!("wrote {}", config_path.display());
    println!("initialized {}", work_dir.display());
    Ok(())
}
