//! Core data model for the chain loop

pub mod events;
pub mod record;
pub mod stage;

pub use events::{ChainEvent, EventSink, NullSink, TerminalOutcome, TracingSink};
pub use record::{ExecutionLog, ExecutionRecord};
pub use stage::{ActionDescriptor, ActionKind, ChainStage, LoopCheck};
