// query.rs — Search filters, export ranges and statistics over the journal.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use neura_policy::ActionKind;

use crate::entry::{Disposition, JournalEntry};
use crate::error::AuditError;

/// Filter for `Journal::search`. All set fields must match.
#[derive(Debug, Clone, Default)]
pub struct JournalQuery {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub action: Option<ActionKind>,
    pub disposition: Option<Disposition>,
    pub request_id: Option<Uuid>,
    /// Keep only the most recent N matches.
    pub limit: Option<usize>,
}

impl JournalQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_action(mut self, action: impl Into<ActionKind>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = Some(disposition);
        self
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &JournalEntry) -> bool {
        if self.since.is_some_and(|since| entry.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| entry.timestamp > until) {
            return false;
        }
        if let Some(action) = &self.action {
            if entry.request.action() != action {
                return false;
            }
        }
        if let Some(disposition) = self.disposition {
            if entry.disposition != disposition {
                return false;
            }
        }
        if let Some(request_id) = self.request_id {
            if entry.request_id() != request_id {
                return false;
            }
        }
        true
    }

    /// Filter entries (oldest first) and apply the limit.
    pub(crate) fn apply(&self, entries: impl Iterator<Item = JournalEntry>) -> Vec<JournalEntry> {
        let mut matched: Vec<JournalEntry> = entries.filter(|e| self.matches(e)).collect();
        if let Some(limit) = self.limit {
            if matched.len() > limit {
                matched.drain(..matched.len() - limit);
            }
        }
        matched
    }
}

/// Which entries an export covers. Bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
}

impl ExportRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn seqs(from_seq: Option<u64>, to_seq: Option<u64>) -> Self {
        Self {
            from_seq,
            to_seq,
            ..Self::default()
        }
    }

    pub fn between(since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        Self {
            since,
            until,
            ..Self::default()
        }
    }

    pub fn contains(&self, entry: &JournalEntry) -> bool {
        self.from_seq.map_or(true, |from| entry.seq >= from)
            && self.to_seq.map_or(true, |to| entry.seq <= to)
            && self.since.map_or(true, |since| entry.timestamp >= since)
            && self.until.map_or(true, |until| entry.timestamp <= until)
    }
}

/// Output format for `Journal::export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// A single JSON document with chain anchors.
    #[default]
    Json,
    /// The stored lines, byte for byte.
    Jsonl,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "jsonl" | "ndjson" => Ok(ExportFormat::Jsonl),
            other => Err(format!("unknown export format '{}' (expected json or jsonl)", other)),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Jsonl => write!(f, "jsonl"),
        }
    }
}

/// The JSON export document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalExport {
    pub exported_at: DateTime<Utc>,
    pub range: ExportRange,
    pub entry_count: usize,
    /// `previous_hash` of the first exported entry, linking the export back
    /// into the full chain.
    pub anchor_hash: Option<String>,
    /// `content_hash` of the journal's last entry at export time.
    pub head_hash: Option<String>,
    pub entries: Vec<JournalEntry>,
}

/// Aggregate counts over the journal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JournalStats {
    pub total: usize,
    pub by_disposition: BTreeMap<String, usize>,
    pub by_action: BTreeMap<String, usize>,
    /// Entries that reached an executor.
    pub executed: usize,
    pub succeeded: usize,
    /// `succeeded / executed`; None when nothing was executed.
    pub success_rate: Option<f64>,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl JournalStats {
    pub fn from_entries<'a>(entries: impl Iterator<Item = &'a JournalEntry>) -> Self {
        let mut stats = JournalStats::default();
        for entry in entries {
            stats.total += 1;
            *stats
                .by_disposition
                .entry(entry.disposition.to_string())
                .or_insert(0) += 1;
            *stats
                .by_action
                .entry(entry.request.action().to_string())
                .or_insert(0) += 1;
            if entry.disposition.was_executed() {
                stats.executed += 1;
            }
            if entry.disposition == Disposition::Succeeded {
                stats.succeeded += 1;
            }
            if stats.first_timestamp.is_none() {
                stats.first_timestamp = Some(entry.timestamp);
            }
            stats.last_timestamp = Some(entry.timestamp);
        }
        if stats.executed > 0 {
            stats.success_rate = Some(stats.succeeded as f64 / stats.executed as f64);
        }
        stats
    }
}

/// Upper bound for relative time specs (100 years).
const MAX_RELATIVE_SECS: i64 = 100 * 365 * 86_400;

/// Parse a time bound relative to `now`.
///
/// Accepts `<n>m`, `<n>h`, `<n>d`, `<n>w`, `today`, `yesterday`, an RFC 3339
/// timestamp, or a `YYYY-MM-DD` date (midnight UTC).
pub fn parse_since(spec: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, AuditError> {
    let spec = spec.trim();
    let invalid = || AuditError::InvalidTimeSpec(spec.to_string());

    match spec.to_ascii_lowercase().as_str() {
        "today" => return midnight(now.date_naive()).ok_or_else(invalid),
        "yesterday" => {
            let day = now.date_naive().pred_opt().ok_or_else(invalid)?;
            return midnight(day).ok_or_else(invalid);
        }
        _ => {}
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(spec) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(spec, "%Y-%m-%d") {
        return midnight(date).ok_or_else(invalid);
    }

    let unit_secs = match spec.chars().last() {
        Some('m') => 60,
        Some('h') => 3_600,
        Some('d') => 86_400,
        Some('w') => 7 * 86_400,
        _ => return Err(invalid()),
    };
    let amount: i64 = spec[..spec.len() - 1].parse().map_err(|_| invalid())?;
    let secs = amount
        .checked_mul(unit_secs)
        .filter(|s| (0..=MAX_RELATIVE_SECS).contains(s))
        .ok_or_else(invalid)?;
    Ok(now - Duration::seconds(secs))
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}
