//! Work-item collaborator
//!
//! The core has no opinion on what a work item is or when it counts as
//! resolved; it only asks the questions below. The bundled adapter in
//! `markdown.rs` answers them from a checkbox list.

pub mod markdown;

use thiserror::Error;

pub use markdown::MarkdownChecklist;

#[derive(Debug, Error)]
pub enum WorkItemError {
    #[error("failed to read work items: {0}")]
    Io(#[from] std::io::Error),
}

/// One unit of tracked, outstanding work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// 1-based source line the item came from.
    pub line: usize,
    pub text: String,
}

pub trait WorkItemSource {
    fn unresolved_items(&self) -> Result<Vec<WorkItem>, WorkItemError>;

    /// Whether every tracked item is resolved. Completion semantics belong
    /// entirely to the collaborator.
    fn all_resolved(&self) -> Result<bool, WorkItemError>;
}
