//! Kiln Core Library
//!
//! This is the core library for the Kiln build automation tool. Its heart is a
//! dependency execution engine: named, idempotent actions run either serially
//! or concurrently, and each uniquely identified action executes at most once
//! per run no matter how many call sites request it.
//!
//! ## Architecture
//!
//! - [`execution`] - Actions, the function adapter, the run-once store, the
//!   serial/parallel runner and the external command runner
//! - [`context`] - The run context threaded through every action
//! - [`registry`] - Explicit `group:name` target registry
//! - [`target_manager`] - Loads `kiln.yml` and runs configured targets
//! - [`configs`] - Configuration parsing and validation
//! - [`types`] - Error types and type aliases
//!
//! ## Usage
//!
//! ```rust
//! use kiln_core::context::RunContext;
//! use kiln_core::execution::{func, DependencyRun};
//!
//! async fn install(tool: &'static str) -> anyhow::Result<()> {
//!     Ok(())
//! }
//!
//! # async fn example() -> kiln_core::types::KilnResult<()> {
//! let run = DependencyRun::new();
//! let ctx = RunContext::new();
//!
//! // The second request for the same tool is served from the store.
//! run.parallel(&ctx, vec![
//!     func(install, ("golangci-lint",)).into_dep(),
//!     func(install, ("golangci-lint",)).into_dep(),
//! ])
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod colors;
pub mod configs;
pub mod context;
pub mod execution;
pub mod registry;
pub mod target_manager;
pub mod types;

// Re-export the main types for easier usage
pub use context::RunContext;
pub use types::{ActionFailure, KilnError, KilnResult};
pub use target_manager::{TargetManager, TargetManagerConfig};
