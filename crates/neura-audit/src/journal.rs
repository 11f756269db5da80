// journal.rs — Append-only, hash-chained JSONL journal.
//
// The journal is stored as a JSONL file: one JournalEntry per line. Each
// entry carries the content hash of the entry before it, so inserting,
// deleting or editing any line breaks the chain and is caught by
// `verify_integrity()`.
//
// Appends are serialized by a mutex around the single writer. Readers take
// the committed byte length under the lock, then read that prefix without
// it, so they always see a point-in-time snapshot and never a partial line.
// Verification also compares that snapshot with the writer's head, so a file
// cut back to an earlier entry does not pass as a shorter valid chain.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::entry::{JournalEntry, NewEntry};
use crate::error::AuditError;
use crate::query::{ExportFormat, ExportRange, JournalExport, JournalQuery, JournalStats};
use crate::verify::{self, BreakKind, BrokenEntry, IntegrityReport};

/// Writer state, only touched under the journal mutex.
struct Writer {
    file: BufWriter<File>,
    /// `content_hash` of the last committed entry.
    last_hash: Option<String>,
    next_seq: u64,
    /// Byte length of the fully written, newline-terminated prefix.
    committed_len: u64,
    seen_requests: HashSet<Uuid>,
    /// Set when a write failed part-way; no further appends are accepted.
    poisoned: bool,
}

/// Writer state copied out for a snapshot.
struct Cursor {
    committed_len: u64,
    next_seq: u64,
    last_hash: Option<String>,
}

impl Writer {
    fn write_line(&mut self, line: &[u8], fsync: bool) -> std::io::Result<()> {
        self.file.write_all(line)?;
        self.file.flush()?;
        if fsync {
            self.file.get_ref().sync_data()?;
        }
        Ok(())
    }
}

/// A summary of the writer's state, for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalHealth {
    pub path: PathBuf,
    pub entries: u64,
    pub head_hash: Option<String>,
    pub poisoned: bool,
}

/// An append-only audit journal backed by a JSONL file.
///
/// `Journal` is `Send + Sync`; share it behind an `Arc`.
pub struct Journal {
    path: PathBuf,
    fsync: bool,
    writer: Mutex<Writer>,
}

impl Journal {
    /// Open (or create) a journal at the given path.
    ///
    /// An existing file is read once to recover the chain cursor (last hash,
    /// next sequence number, journaled request ids). A file whose last line
    /// has no terminating newline fails with `TornTail`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| AuditError::OpenFailed {
                    path: path.clone(),
                    source,
                })?;
            }
        }

        let existing = if path.exists() {
            fs::read(&path).map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?
        } else {
            Vec::new()
        };

        let mut last_hash = None;
        let mut next_seq = 0;
        let mut seen_requests = HashSet::new();
        for (index, line) in split_lines(&existing, &path)?.into_iter().enumerate() {
            let entry: JournalEntry =
                serde_json::from_slice(line).map_err(|e| AuditError::Unreadable {
                    line: index + 1,
                    reason: e.to_string(),
                })?;
            seen_requests.insert(entry.request_id());
            next_seq = entry.seq + 1;
            last_hash = Some(entry.content_hash);
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(
            path = %path.display(),
            entries = seen_requests.len(),
            next_seq,
            "opened audit journal"
        );

        Ok(Self {
            path,
            fsync: true,
            writer: Mutex::new(Writer {
                file: BufWriter::new(file),
                last_hash,
                next_seq,
                committed_len: existing.len() as u64,
                seen_requests,
                poisoned: false,
            }),
        })
    }

    /// Whether each append is followed by `fsync` (default: true).
    pub fn with_fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and return it as persisted.
    ///
    /// Assigns the sequence number, entry id and timestamp, links
    /// `previous_hash`, computes `content_hash`, and writes the line durably
    /// before returning. A request id that is already journaled is refused.
    ///
    /// Blocks on the write and, with fsync on, on the disk flush. Async
    /// callers should run it on the blocking pool.
    pub fn append(&self, entry: NewEntry) -> Result<JournalEntry, AuditError> {
        let mut writer = self.lock()?;
        if writer.poisoned {
            return Err(AuditError::WriterPoisoned);
        }

        let request_id = entry.request.request_id();
        if writer.seen_requests.contains(&request_id) {
            return Err(AuditError::DuplicateRequest(request_id));
        }

        let mut record = JournalEntry {
            seq: writer.next_seq,
            entry_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            request: entry.request,
            verdict: entry.verdict,
            confirmation: entry.confirmation,
            disposition: entry.disposition,
            outcome: entry.outcome,
            previous_hash: writer.last_hash.clone(),
            content_hash: String::new(),
        };
        record.content_hash = record.compute_hash()?;

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        if let Err(e) = writer.write_line(line.as_bytes(), self.fsync) {
            writer.poisoned = true;
            tracing::error!(
                path = %self.path.display(),
                seq = record.seq,
                error = %e,
                "journal write failed; writer poisoned"
            );
            return Err(AuditError::WriteFailed(e));
        }

        writer.committed_len += line.len() as u64;
        writer.next_seq += 1;
        writer.last_hash = Some(record.content_hash.clone());
        writer.seen_requests.insert(request_id);

        tracing::debug!(
            seq = record.seq,
            request_id = %request_id,
            disposition = %record.disposition,
            "journal entry appended"
        );
        Ok(record)
    }

    /// Whether an earlier write failure has poisoned the writer.
    pub fn is_poisoned(&self) -> bool {
        self.writer.lock().map(|w| w.poisoned).unwrap_or(true)
    }

    /// Whether the request already has an entry.
    pub fn contains_request(&self, request_id: Uuid) -> Result<bool, AuditError> {
        Ok(self.lock()?.seen_requests.contains(&request_id))
    }

    pub fn health(&self) -> Result<JournalHealth, AuditError> {
        let writer = self.lock()?;
        Ok(JournalHealth {
            path: self.path.clone(),
            entries: writer.next_seq,
            head_hash: writer.last_hash.clone(),
            poisoned: writer.poisoned,
        })
    }

    /// Recompute every hash and link over a snapshot of the journal, then
    /// check the chain still reaches the writer's committed head.
    pub fn verify_integrity(&self) -> Result<IntegrityReport, AuditError> {
        let (snapshot, cursor) = self.snapshot_with_cursor()?;
        let mut report = verify::verify_bytes(&snapshot);
        if report.ok
            && ((snapshot.len() as u64) < cursor.committed_len
                || report.entries_checked as u64 != cursor.next_seq
                || report.head_hash != cursor.last_hash)
        {
            report.ok = false;
            report.first_broken = Some(BrokenEntry {
                line: report.entries_checked + 1,
                entry_id: None,
                kind: BreakKind::TruncatedTail,
                detail: format!(
                    "file ends after {} entries ({} bytes), writer committed {} entries ({} bytes) ending at {}",
                    report.entries_checked,
                    snapshot.len(),
                    cursor.next_seq,
                    cursor.committed_len,
                    cursor.last_hash.as_deref().unwrap_or("none"),
                ),
            });
        }
        if !report.ok {
            tracing::warn!(
                path = %self.path.display(),
                broken = ?report.first_broken,
                "journal integrity check failed"
            );
        }
        Ok(report)
    }

    /// Verify a journal file without opening it for writing.
    ///
    /// Unlike `verify_integrity()`, this reads the whole file, so a torn
    /// last line is reported rather than excluded.
    pub fn verify_path(path: impl AsRef<Path>) -> Result<IntegrityReport, AuditError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| AuditError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(verify::verify_bytes(&bytes))
    }

    /// Entries matching the query, oldest first.
    ///
    /// Lines that fail to parse are skipped; `verify_integrity()` reports them.
    pub fn search(&self, query: &JournalQuery) -> Result<Vec<JournalEntry>, AuditError> {
        let entries = self.read_entries()?;
        Ok(query.apply(entries.into_iter().map(|(_, entry)| entry)))
    }

    /// Every entry in the snapshot, oldest first.
    pub fn entries(&self) -> Result<Vec<JournalEntry>, AuditError> {
        Ok(self
            .read_entries()?
            .into_iter()
            .map(|(_, entry)| entry)
            .collect())
    }

    /// Export a range of the journal as a JSON document or as raw JSONL.
    pub fn export(&self, range: &ExportRange, format: ExportFormat) -> Result<Vec<u8>, AuditError> {
        let snapshot = self.snapshot()?;
        let mut head_hash = None;
        let mut selected: Vec<(&[u8], JournalEntry)> = Vec::new();
        for line in split_lines(&snapshot, &self.path)? {
            if let Ok(entry) = serde_json::from_slice::<JournalEntry>(line) {
                head_hash = Some(entry.content_hash.clone());
                if range.contains(&entry) {
                    selected.push((line, entry));
                }
            }
        }

        match format {
            ExportFormat::Jsonl => {
                let mut out = Vec::new();
                for (line, _) in &selected {
                    out.extend_from_slice(line);
                    out.push(b'\n');
                }
                Ok(out)
            }
            ExportFormat::Json => {
                let entries: Vec<JournalEntry> = selected.into_iter().map(|(_, e)| e).collect();
                let export = JournalExport {
                    exported_at: Utc::now(),
                    range: range.clone(),
                    entry_count: entries.len(),
                    anchor_hash: entries.first().and_then(|e| e.previous_hash.clone()),
                    head_hash,
                    entries,
                };
                Ok(serde_json::to_vec_pretty(&export)?)
            }
        }
    }

    /// Totals by disposition and action over the whole snapshot.
    pub fn stats(&self) -> Result<JournalStats, AuditError> {
        let entries = self.read_entries()?;
        Ok(JournalStats::from_entries(entries.iter().map(|(_, e)| e)))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Writer>, AuditError> {
        self.writer.lock().map_err(|_| AuditError::LockPoisoned)
    }

    /// The committed prefix of the file at this instant.
    fn snapshot(&self) -> Result<Vec<u8>, AuditError> {
        Ok(self.snapshot_with_cursor()?.0)
    }

    /// The committed prefix together with the writer state it should match.
    /// Bytes come back short if the file was truncated underneath us.
    fn snapshot_with_cursor(&self) -> Result<(Vec<u8>, Cursor), AuditError> {
        let cursor = {
            let writer = self.lock()?;
            Cursor {
                committed_len: writer.committed_len,
                next_seq: writer.next_seq,
                last_hash: writer.last_hash.clone(),
            }
        };
        let file = File::open(&self.path).map_err(|source| AuditError::OpenFailed {
            path: self.path.clone(),
            source,
        })?;
        let mut bytes = Vec::with_capacity(cursor.committed_len as usize);
        file.take(cursor.committed_len).read_to_end(&mut bytes)?;
        Ok((bytes, cursor))
    }

    /// Parsed entries of the snapshot with their 1-based line numbers.
    fn read_entries(&self) -> Result<Vec<(usize, JournalEntry)>, AuditError> {
        let snapshot = self.snapshot()?;
        let mut entries = Vec::new();
        for (index, line) in split_lines(&snapshot, &self.path)?.into_iter().enumerate() {
            match serde_json::from_slice::<JournalEntry>(line) {
                Ok(entry) => entries.push((index + 1, entry)),
                Err(e) => {
                    tracing::warn!(line = index + 1, error = %e, "skipping unreadable journal line");
                }
            }
        }
        Ok(entries)
    }
}

/// Split newline-terminated journal bytes into lines (without the `\n`).
fn split_lines<'a>(bytes: &'a [u8], path: &Path) -> Result<Vec<&'a [u8]>, AuditError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let mut lines: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();
    // A newline-terminated buffer ends in one empty piece.
    match lines.pop() {
        Some(rest) if rest.is_empty() => Ok(lines),
        _ => Err(AuditError::TornTail {
            path: path.to_path_buf(),
            line: lines.len() + 1,
        }),
    }
}
