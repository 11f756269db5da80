// error.rs — Error types for the confirmation gate and the pipeline.
//
// Policy denials, rejected confirmations and failed actions are not errors:
// they are `Completion`s and are journaled like any other outcome. Only
// infrastructure faults surface here.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use neura_audit::AuditError;
use neura_motor::{ClearanceError, DispatchError, ExecutorError};
use neura_policy::PolicyError;

/// Errors from `ConfirmationGate::open` and `ConfirmationGate::resolve`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// The verdict does not allow the action or does not ask for a prompt.
    #[error("request {0} is not awaiting confirmation")]
    NotConfirmable(Uuid),

    #[error("no pending confirmation with handle {0}")]
    UnknownHandle(Uuid),

    #[error("confirmation {0} has expired")]
    Expired(Uuid),

    #[error("confirmation gate lock poisoned")]
    LockPoisoned,
}

/// Infrastructure faults in the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The journal could not record the request. Nothing is dispatched
    /// while the journal is unwritable.
    #[error("journal write failed: {0}")]
    JournalWriteFailed(#[source] AuditError),

    /// The journal writer is poisoned by an earlier failure; the pipeline
    /// refuses to run actions it cannot record.
    #[error("journal is unwritable after an earlier failure; refusing to dispatch")]
    JournalUnavailable,

    /// The request id was already submitted.
    #[error("request {0} was already submitted")]
    DuplicateRequest(Uuid),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Clearance(#[from] ClearanceError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("invalid executor configuration: {0}")]
    Executor(#[from] ExecutorError),

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },
}
