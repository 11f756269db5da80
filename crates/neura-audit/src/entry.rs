// entry.rs — Journal entry data model.
//
// One JournalEntry is written per action request, at the request's terminal
// state: denied by policy, confirmation rejected or timed out, or executed
// (successfully or not). Entries form a chain: `previous_hash` holds the
// `content_hash` of the entry before it, and `content_hash` covers every
// other field of the entry including that link.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use neura_policy::{ActionRequest, PolicyVerdict};

use crate::hasher;

/// What an executor reported for one dispatched action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Which executor ran the action (e.g. "apple_script", "dry_run").
    pub executor: String,
}

impl ExecutionOutcome {
    pub fn succeeded(executor: impl Into<String>, output: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
            duration_ms,
            executor: executor.into(),
        }
    }

    pub fn failed(executor: impl Into<String>, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            duration_ms,
            executor: executor.into(),
        }
    }
}

/// The external decision on a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationDecision {
    Approved,
    Rejected,
    TimedOut,
}

/// How a confirmation prompt was settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRecord {
    /// Handle the external channel used to answer.
    pub handle: Uuid,
    pub decision: ConfirmationDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// Terminal state of one request's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Denied by the policy engine; never dispatched.
    Denied,
    /// The confirmation prompt was rejected (or abandoned).
    ConfirmationRejected,
    /// Nobody answered the confirmation prompt in time.
    ConfirmationTimedOut,
    /// Dispatched and the executor reported success.
    Succeeded,
    /// Dispatched and the executor reported failure or timed out.
    Failed,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Denied => "denied",
            Disposition::ConfirmationRejected => "confirmation_rejected",
            Disposition::ConfirmationTimedOut => "confirmation_timed_out",
            Disposition::Succeeded => "succeeded",
            Disposition::Failed => "failed",
        }
    }

    /// Whether the action reached an executor.
    pub fn was_executed(&self) -> bool {
        matches!(self, Disposition::Succeeded | Disposition::Failed)
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Disposition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "denied" => Ok(Disposition::Denied),
            "confirmation_rejected" | "rejected" => Ok(Disposition::ConfirmationRejected),
            "confirmation_timed_out" | "timed_out" => Ok(Disposition::ConfirmationTimedOut),
            "succeeded" | "success" => Ok(Disposition::Succeeded),
            "failed" | "failure" => Ok(Disposition::Failed),
            other => Err(format!("unknown disposition '{}'", other)),
        }
    }
}

/// The fields a caller supplies; the journal adds sequence, id, timestamp
/// and hashes.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub request: ActionRequest,
    pub verdict: PolicyVerdict,
    pub confirmation: Option<ConfirmationRecord>,
    pub disposition: Disposition,
    pub outcome: Option<ExecutionOutcome>,
}

impl NewEntry {
    /// A request denied by policy before any dispatch.
    pub fn denied(request: ActionRequest, verdict: PolicyVerdict) -> Self {
        Self {
            request,
            verdict,
            confirmation: None,
            disposition: Disposition::Denied,
            outcome: None,
        }
    }

    /// A request whose confirmation was rejected or timed out.
    pub fn unconfirmed(
        request: ActionRequest,
        verdict: PolicyVerdict,
        confirmation: ConfirmationRecord,
    ) -> Self {
        let disposition = match confirmation.decision {
            ConfirmationDecision::TimedOut => Disposition::ConfirmationTimedOut,
            _ => Disposition::ConfirmationRejected,
        };
        Self {
            request,
            verdict,
            confirmation: Some(confirmation),
            disposition,
            outcome: None,
        }
    }

    /// A request that reached an executor.
    pub fn executed(
        request: ActionRequest,
        verdict: PolicyVerdict,
        confirmation: Option<ConfirmationRecord>,
        outcome: ExecutionOutcome,
    ) -> Self {
        let disposition = if outcome.success {
            Disposition::Succeeded
        } else {
            Disposition::Failed
        };
        Self {
            request,
            verdict,
            confirmation,
            disposition,
            outcome: Some(outcome),
        }
    }
}

/// A persisted journal record: one line in the JSONL journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in the journal, starting at 0, with no gaps.
    pub seq: u64,
    pub entry_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub request: ActionRequest,
    pub verdict: PolicyVerdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<ConfirmationRecord>,
    pub disposition: Disposition,
    /// Absent when the request never reached an executor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ExecutionOutcome>,
    /// `content_hash` of the preceding entry; None for the first entry.
    pub previous_hash: Option<String>,
    /// SHA-256 over every field above.
    pub content_hash: String,
}

/// The hashed view of an entry: everything except `content_hash`.
#[derive(Serialize)]
struct HashedFields<'a> {
    seq: u64,
    entry_id: &'a Uuid,
    timestamp: &'a DateTime<Utc>,
    request: &'a ActionRequest,
    verdict: &'a PolicyVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    confirmation: &'a Option<ConfirmationRecord>,
    disposition: Disposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: &'a Option<ExecutionOutcome>,
    previous_hash: &'a Option<String>,
}

impl JournalEntry {
    /// Recompute the content hash from the entry's fields.
    pub fn compute_hash(&self) -> Result<String, serde_json::Error> {
        hasher::hash_json(&HashedFields {
            seq: self.seq,
            entry_id: &self.entry_id,
            timestamp: &self.timestamp,
            request: &self.request,
            verdict: &self.verdict,
            confirmation: &self.confirmation,
            disposition: self.disposition,
            outcome: &self.outcome,
            previous_hash: &self.previous_hash,
        })
    }

    pub fn request_id(&self) -> Uuid {
        self.request.request_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neura_policy::{ActionKind, PolicyEngine};

    fn sample(disposition_outcome: Option<ExecutionOutcome>) -> JournalEntry {
        let request = ActionRequest::new(ActionKind::OpenApp)
            .with_target("Notes")
            .with_os("mac");
        let verdict = PolicyEngine::with_default_rules().evaluate(&request);
        JournalEntry {
            seq: 0,
            entry_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            request,
            verdict,
            confirmation: None,
            disposition: Disposition::Succeeded,
            outcome: disposition_outcome,
            previous_hash: None,
            content_hash: String::new(),
        }
    }

    #[test]
    fn hash_ignores_stored_content_hash() {
        let mut entry = sample(Some(ExecutionOutcome::succeeded("dry_run", "ok", 3)));
        let before = entry.compute_hash().unwrap();
        entry.content_hash = "tampered".into();
        assert_eq!(before, entry.compute_hash().unwrap());
    }

    #[test]
    fn hash_survives_json_round_trip() {
        let mut entry = sample(Some(ExecutionOutcome::succeeded("dry_run", "ok", 3)));
        entry.content_hash = entry.compute_hash().unwrap();
        let json = serde_json::to_string(&entry).unwrap();
        let restored: JournalEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.compute_hash().unwrap(), entry.content_hash);
    }

    #[test]
    fn hash_covers_previous_link() {
        let mut entry = sample(None);
        let unlinked = entry.compute_hash().unwrap();
        entry.previous_hash = Some("abc".into());
        assert_ne!(unlinked, entry.compute_hash().unwrap());
    }

    #[test]
    fn disposition_follows_outcome() {
        let request = ActionRequest::new(ActionKind::Click);
        let verdict = PolicyEngine::with_default_rules().evaluate(&request);
        let ok = NewEntry::executed(
            request.clone(),
            verdict.clone(),
            None,
            ExecutionOutcome::succeeded("dry_run", "", 1),
        );
        assert_eq!(ok.disposition, Disposition::Succeeded);
        let failed = NewEntry::executed(
            request,
            verdict,
            None,
            ExecutionOutcome::failed("dry_run", "boom", 1),
        );
        assert_eq!(failed.disposition, Disposition::Failed);
    }

    #[test]
    fn timed_out_confirmation_maps_to_its_own_disposition() {
        let request = ActionRequest::new(ActionKind::TypeText).with_payload("hi");
        let verdict = PolicyEngine::with_default_rules().evaluate(&request);
        let entry = NewEntry::unconfirmed(
            request,
            verdict,
            ConfirmationRecord {
                handle: Uuid::new_v4(),
                decision: ConfirmationDecision::TimedOut,
                reason: None,
                decided_at: Utc::now(),
            },
        );
        assert_eq!(entry.disposition, Disposition::ConfirmationTimedOut);
    }

    #[test]
    fn disposition_parses_aliases() {
        assert_eq!("success".parse::<Disposition>().unwrap(), Disposition::Succeeded);
        assert_eq!(
            "timed_out".parse::<Disposition>().unwrap(),
            Disposition::ConfirmationTimedOut
        );
        assert!("nope".parse::<Disposition>().is_err());
    }
}
