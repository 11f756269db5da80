//! # neura-audit
//!
//! Append-only, hash-chained audit journal for Neura's action-authorization
//! pipeline.
//!
//! Every action request produces exactly one [`JournalEntry`] at its
//! terminal state (denied, confirmation rejected or timed out, succeeded,
//! failed). Entries are stored as JSONL and linked by SHA-256 hashes:
//! each entry's `previous_hash` is the `content_hash` of the entry before
//! it, so editing, inserting or deleting a line is detected by
//! [`Journal::verify_integrity`].
//!
//! The journal also answers operator questions: [`Journal::search`],
//! [`Journal::export`] and [`Journal::stats`] all work over a point-in-time
//! snapshot and never block writers for longer than it takes to read the
//! committed length.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use neura_audit::{Journal, NewEntry};
//! use neura_policy::{ActionKind, ActionRequest, PolicyEngine};
//!
//! let journal = Journal::open("/tmp/journal.jsonl").unwrap();
//! let request = ActionRequest::new(ActionKind::ExecuteCommand).with_payload("ls");
//! let verdict = PolicyEngine::with_default_rules().evaluate(&request);
//! journal.append(NewEntry::denied(request, verdict)).unwrap();
//! assert!(journal.verify_integrity().unwrap().ok);
//! ```

pub mod entry;
pub mod error;
pub mod hasher;
pub mod journal;
pub mod query;
pub mod verify;

pub use entry::{
    ConfirmationDecision, ConfirmationRecord, Disposition, ExecutionOutcome, JournalEntry,
    NewEntry,
};
pub use error::AuditError;
pub use journal::{Journal, JournalHealth};
pub use query::{parse_since, ExportFormat, ExportRange, JournalExport, JournalQuery, JournalStats};
pub use verify::{BreakKind, BrokenEntry, IntegrityReport};
