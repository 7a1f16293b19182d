//! Container-lifecycle orchestration: config loading, the runtime client,
//! the deploy state machine and the on-disk state tracker.
//!
//! The CLI crate is thin glue over [`lifecycle::Orchestrator`]; everything
//! testable lives here, behind the [`runtime::Engine`] and
//! [`health::Prober`] seams.

pub mod config;
pub mod health;
pub mod lifecycle;
pub mod runtime;
pub mod state;
