// error.rs — Error types for the audit journal.
//
// Uses `thiserror` to derive the standard Rust `Error` trait automatically.
// Each variant maps to a specific failure mode of the journal.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during journal operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to open or create the journal file.
    #[error("failed to open audit journal at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write or flush an entry. Durability cannot be guaranteed.
    #[error("failed to append journal entry: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// Failed to serialize or deserialize an entry.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A line of an existing journal could not be parsed at open time.
    #[error("unreadable journal entry at line {line}: {reason}")]
    Unreadable { line: usize, reason: String },

    /// The last line of the journal has no terminating newline: a write was
    /// interrupted. Requires administrative remediation.
    #[error("journal at {path} ends in a torn write at line {line}")]
    TornTail { path: PathBuf, line: usize },

    /// The hash chain is broken.
    #[error("integrity check failed at line {line} (entry {entry}): {detail}")]
    IntegrityViolation {
        line: usize,
        entry: String,
        detail: String,
    },

    /// The request already has a journal entry.
    #[error("request {0} is already journaled")]
    DuplicateRequest(Uuid),

    /// A previous write failed part-way; the writer refuses further appends.
    #[error("journal writer is poisoned by an earlier failed write")]
    WriterPoisoned,

    /// The writer mutex was poisoned by a panicking thread.
    #[error("journal lock poisoned")]
    LockPoisoned,

    /// A time specification could not be parsed.
    #[error("invalid time specification '{0}'")]
    InvalidTimeSpec(String),
}
