// verify.rs — Hash-chain verification.
//
// Walks journal bytes from the first line, recomputing each entry's content
// hash and checking its link to the entry before it. Stops at the first
// break: once one entry is untrustworthy, every later link is too.

use serde::Serialize;
use uuid::Uuid;

use crate::entry::JournalEntry;
use crate::error::AuditError;

/// How an entry failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// The line is not a valid journal entry.
    Unparseable,
    /// The recomputed hash differs from the stored `content_hash`.
    HashMismatch,
    /// `previous_hash` does not match the preceding entry's hash.
    LinkMismatch,
    /// `seq` does not follow the preceding entry's.
    SequenceGap,
    /// The last line has no terminating newline.
    TornTail,
    /// The file ends before the head the writer committed.
    TruncatedTail,
}

impl std::fmt::Display for BreakKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BreakKind::Unparseable => "unparseable",
            BreakKind::HashMismatch => "hash mismatch",
            BreakKind::LinkMismatch => "link mismatch",
            BreakKind::SequenceGap => "sequence gap",
            BreakKind::TornTail => "torn tail",
            BreakKind::TruncatedTail => "truncated tail",
        };
        f.write_str(s)
    }
}

/// The first entry that failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenEntry {
    /// 1-based line number in the journal file.
    pub line: usize,
    /// Present whenever the id could be read from the line.
    pub entry_id: Option<Uuid>,
    pub kind: BreakKind,
    pub detail: String,
}

/// Result of walking the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub ok: bool,
    /// Entries verified before the first break (all of them when `ok`).
    pub entries_checked: usize,
    /// Hash of the last verified entry.
    pub head_hash: Option<String>,
    pub first_broken: Option<BrokenEntry>,
}

impl IntegrityReport {
    /// Turn a failed report into `AuditError::IntegrityViolation`.
    pub fn into_result(self) -> Result<Self, AuditError> {
        match &self.first_broken {
            None => Ok(self),
            Some(broken) => Err(AuditError::IntegrityViolation {
                line: broken.line,
                entry: broken
                    .entry_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                detail: format!("{}: {}", broken.kind, broken.detail),
            }),
        }
    }
}

/// Verify newline-terminated journal bytes.
pub fn verify_bytes(bytes: &[u8]) -> IntegrityReport {
    let mut pieces: Vec<&[u8]> = if bytes.is_empty() {
        Vec::new()
    } else {
        bytes.split(|b| *b == b'\n').collect()
    };
    let tail = pieces.pop().filter(|rest| !rest.is_empty());

    let mut previous: Option<String> = None;
    let mut checked = 0usize;

    for (index, line) in pieces.iter().enumerate() {
        let line_no = index + 1;
        let entry: JournalEntry = match serde_json::from_slice(line) {
            Ok(entry) => entry,
            Err(e) => {
                return broken(checked, previous, line_no, sniff_entry_id(line), BreakKind::Unparseable, e.to_string());
            }
        };

        let recomputed = match entry.compute_hash() {
            Ok(hash) => hash,
            Err(e) => {
                return broken(checked, previous, line_no, Some(entry.entry_id), BreakKind::Unparseable, e.to_string());
            }
        };
        if recomputed != entry.content_hash {
            return broken(
                checked,
                previous,
                line_no,
                Some(entry.entry_id),
                BreakKind::HashMismatch,
                format!("stored {}, recomputed {}", entry.content_hash, recomputed),
            );
        }

        if entry.previous_hash != previous {
            return broken(
                checked,
                previous.clone(),
                line_no,
                Some(entry.entry_id),
                BreakKind::LinkMismatch,
                format!(
                    "expected previous hash {}, found {}",
                    previous.as_deref().unwrap_or("none"),
                    entry.previous_hash.as_deref().unwrap_or("none")
                ),
            );
        }

        if entry.seq != checked as u64 {
            return broken(
                checked,
                previous,
                line_no,
                Some(entry.entry_id),
                BreakKind::SequenceGap,
                format!("expected seq {}, found {}", checked, entry.seq),
            );
        }

        previous = Some(entry.content_hash);
        checked += 1;
    }

    if let Some(rest) = tail {
        return broken(
            checked,
            previous,
            pieces.len() + 1,
            sniff_entry_id(rest),
            BreakKind::TornTail,
            "last line has no terminating newline".to_string(),
        );
    }

    IntegrityReport {
        ok: true,
        entries_checked: checked,
        head_hash: previous,
        first_broken: None,
    }
}

fn broken(
    checked: usize,
    head_hash: Option<String>,
    line: usize,
    entry_id: Option<Uuid>,
    kind: BreakKind,
    detail: String,
) -> IntegrityReport {
    IntegrityReport {
        ok: false,
        entries_checked: checked,
        head_hash,
        first_broken: Some(BrokenEntry {
            line,
            entry_id,
            kind,
            detail,
        }),
    }
}

/// Best-effort recovery of the entry id from a line that does not parse.
fn sniff_entry_id(line: &[u8]) -> Option<Uuid> {
    const KEY: &str = "\"entry_id\":\"";
    let text = String::from_utf8_lossy(line);
    let start = text.find(KEY)? + KEY.len();
    let candidate = text.get(start..start + 36)?;
    Uuid::parse_str(candidate).ok()
}
