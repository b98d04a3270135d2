//! Kiln Core Library
//!
//! This is the core library for the kiln provisioning runner. It provides a
//! dependency-ordered, resumable task graph: targets are resolved into a
//! linear order, run one at a time, and recorded as done with marker files so
//! that repeated invocations skip work that already finished.
//!
//! ## Architecture
//!
//! - [`orchestrator`] - High-level interface used by the CLI
//! - [`registry`] - Target definitions and the registry holding them
//! - [`resolver`] - Depth-first dependency resolution with cycle detection
//! - [`execution`] - Executor, action helpers and process invocation
//! - [`markers`] - Completion marker storage
//! - [`variants`] - Toolchain variant selection for execution-time branches
//! - [`configs`] - Settings resolution and the YAML target manifest
//! - [`toolchain`] - Built-in speech-recognition provisioning recipe
//! - [`results`] - Result types for orchestrator operations
//! - [`types`] - Common error types and type aliases
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kiln_core::orchestrator::{Orchestrator, OrchestratorConfig};
//! use std::path::PathBuf;
//!
//! # fn example() -> kiln_core::types::KilnResult<()> {
//! let orchestrator = Orchestrator::new(OrchestratorConfig {
//!     invocation_dir: PathBuf::from("."),
//!     ..Default::default()
//! })?;
//!
//! let report = orchestrator.run(&["kaldi".to_string()])?;
//! println!("ran {:?}, skipped {:?}", report.executed, report.skipped);
//! # Ok(())
//! # }
//! ```

pub mod configs;
pub mod execution;
pub mod markers;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod results;
pub mod toolchain;
pub mod types;
pub mod variants;

// Re-export the main types for easier usage
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use types::{ActionError, KilnError, KilnResult};
