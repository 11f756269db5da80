//! # neura-policy
//!
//! Rule set and policy engine for Neura's action-authorization pipeline.
//!
//! Every system-affecting action an agent wants to perform is described as an
//! [`ActionRequest`] and evaluated by the [`PolicyEngine`] against a versioned
//! [`RuleSet`], producing a [`PolicyVerdict`].
//!
//! ## Key invariants
//!
//! - **Default deny**: kinds not on the allow list are denied.
//! - **Hard blocks**: `execute_command` is denied unconditionally; no rule
//!   set can whitelist it.
//! - **Pure evaluation**: `evaluate()` does no I/O and reads no clock; the
//!   same request and rules always give the same verdict.
//! - **Exhaustive diagnostics**: every failed check is listed in
//!   `violations`; `reason` names the first.

pub mod action;
pub mod engine;
pub mod error;
pub mod rules;
pub mod verdict;

pub use action::{ActionKind, ActionRequest, OsType, ScreenPoint};
pub use engine::{EvaluationStep, EvaluationTrace, PolicyEngine};
pub use error::PolicyError;
pub use rules::{ForbiddenPattern, RuleSet};
pub use verdict::{PolicyVerdict, RiskLevel, Violation};
