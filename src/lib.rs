//! Chain-driven agent loop orchestration
//!
//! Watches an agent's terminal output for stage keywords and shuttles
//! instructions between a code-fixing agent and an analysis agent until the
//! tracked work items are resolved, an iteration ceiling is reached, or a
//! deadline expires. A cross-process send lock guarantees the shared
//! outbound channel never carries duplicate sends.

pub mod agents;
pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod retry;
pub mod sendlock;
pub mod stream;
pub mod workitems;
