//! # neura-motor
//!
//! Executor dispatcher for Neura's action-authorization pipeline.
//!
//! A [`Dispatcher`] takes an [`ActionRequest`](neura_policy::ActionRequest)
//! together with a [`Clearance`] and runs it on exactly one executor from a
//! fixed [`ExecutorRegistry`]. A clearance can only be granted for an
//! allowed verdict with any required confirmation approved, so there is no
//! way to dispatch an action that policy or the user turned down.
//!
//! ## Executors
//!
//! - [`AppleScriptExecutor`]: macOS automation via `osascript`.
//! - [`DesktopExecutor`]: Linux desktop tools (`xdg-open`, `wmctrl`, `xdotool`).
//! - [`ProcessExecutor`]: configured argv templates, run without a shell.
//! - [`DryRunExecutor`]: records what would run, with no side effects.
//!
//! Every dispatch is bounded by a per-action timeout (the child process is
//! killed when it fires) and by a concurrency limit.

pub mod clearance;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod kind;
pub mod registry;
mod runner;

pub use clearance::Clearance;
pub use dispatch::{DispatchConfig, Dispatcher};
pub use error::{ClearanceError, DispatchError, ExecutorError};
pub use executor::{
    AppleScriptExecutor, DesktopExecutor, DryRunExecutor, DryRunRecord, Executor,
    ProcessExecutor,
};
pub use kind::ExecutorKind;
pub use registry::ExecutorRegistry;
