// error.rs — Error types for clearance, dispatch and executors.
//
// `DispatchError` is an internal fault (registry misconfiguration, clearance
// mix-up). `ExecutorError` is an action that ran and failed; the dispatcher
// turns it into an unsuccessful `ExecutionOutcome` rather than propagating it.

use neura_audit::ConfirmationDecision;
use thiserror::Error;
use uuid::Uuid;

use crate::kind::ExecutorKind;

/// Why a clearance to dispatch could not be granted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClearanceError {
    #[error("policy denied the action: {0}")]
    NotAllowed(String),

    #[error("action requires confirmation but none was recorded")]
    ConfirmationMissing,

    #[error("confirmation was not approved ({0:?})")]
    ConfirmationNotApproved(ConfirmationDecision),
}

/// Dispatcher faults. None of these mean the action itself failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no executor route for action '{action}'")]
    NoRoute { action: String },

    #[error("executor '{executor}' routed for action '{action}' is not installed")]
    ExecutorMissing {
        executor: ExecutorKind,
        action: String,
    },

    #[error("executor '{executor}' cannot handle action '{action}'")]
    Unsupported {
        executor: ExecutorKind,
        action: String,
    },

    #[error("clearance was granted for request {granted}, not {requested}")]
    ClearanceMismatch { granted: Uuid, requested: Uuid },

    #[error("dispatcher is shut down")]
    Closed,
}

/// Failures while running one action.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("{action} requires a {field}")]
    MissingField {
        action: String,
        field: &'static str,
    },

    #[error("executor '{executor}' cannot handle action '{action}'")]
    Unsupported {
        executor: ExecutorKind,
        action: String,
    },

    #[error("required tool '{program}' was not found on PATH")]
    ToolNotFound { program: String },

    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("invalid command template for '{action}': {reason}")]
    InvalidTemplate { action: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
