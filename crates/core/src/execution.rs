//! Dependency execution module
//!
//! This module holds the run-once dependency engine: actions and the adapter
//! that builds them from plain functions, the memoization store, the serial and
//! parallel runner, and the command runner dependency bodies shell out with.

pub mod action;
pub mod adapter;
pub mod command;
pub mod runner;
pub mod store;

pub use action::{Action, Dep, FnAction};
pub use adapter::{func, func_ctx};
pub use command::{CommandRunner, OutputMode};
pub use runner::{parallel_deps, reset_deps, serial_deps, DependencyRun};
pub use store::{DependencyStore, OnceAction};
