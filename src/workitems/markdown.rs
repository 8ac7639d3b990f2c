//! Markdown checkbox adapter
//!
//! Reads a `- [ ]` / `- [x]` checklist. Anything fancier than that is out of
//! scope here; the trait boundary keeps the core honest about it.

use std::fs;
use std::path::PathBuf;

use super::{WorkItem, WorkItemError, WorkItemSource};

#[derive(Debug, Clone)]
pub struct MarkdownChecklist {
    path: PathBuf,
}

impl MarkdownChecklist {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn scan(&self) -> Result<(Vec<WorkItem>, usize), WorkItemError> {
        let content = fs::read_to_string(&self.path)?;
        let mut unresolved = Vec::new();
        let mut total = 0usize;

        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix("- [ ]") {
                total += 1;
                unresolved.push(WorkItem {
                    line: idx + 1,
                    text: rest.trim().to_string(),
                });
            } else if trimmed.starts_with("- [x]") || trimmed.starts_with("- [X]") {
                total += 1;
            }
        }

        Ok((unresolved, total))
    }
}

impl WorkItemSource for MarkdownChecklist {
    fn unresolved_items(&self) -> Result<Vec<WorkItem>, WorkItemError> {
        Ok(self.scan()?.0)
    }

    fn all_resolved(&self) -> Result<bool, WorkItemError> {
        Ok(self.scan()?.0.is_empty())
    }
}
