//! Cross-component integration tests
//!
//! Wires real components together (send lock, executor, gateway, detector,
//! monitor) with scripted stream and sender stand-ins instead of tmux.

mod chain_flow;
mod lock_contention;
