//! Target execution module
//!
//! This module handles running targets in resolved order: process invocation,
//! the helpers actions use inside the workspace, and the marker-aware executor.

pub mod command;
pub mod context;
pub mod runner;

pub use command::{CommandOutput, CommandRunner, Invocation, ProcessCommandRunner, RecordingRunner};
pub use context::ActionContext;
pub use runner::Executor;
