// pipeline.rs — Request → Policy → Confirmation → Dispatch → Journal.
//
// Every submitted request ends in exactly one journal entry, on every path:
// denied by policy, confirmation rejected / timed out / abandoned, executed
// (successfully or not), or cancelled mid-dispatch. Nothing is dispatched
// while the journal is unwritable.
//
// Appends fsync, so async paths run them on the blocking pool. Only the
// Drop paths (cancelled dispatch, abandoned confirmation) append inline.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use neura_audit::{
    AuditError, ConfirmationDecision, ConfirmationRecord, Disposition, ExecutionOutcome, Journal,
    JournalEntry, NewEntry,
};
use neura_motor::{Clearance, Dispatcher};
use neura_policy::{ActionRequest, OsType, PolicyEngine, PolicyVerdict};

use crate::config::NeuraConfig;
use crate::error::PipelineError;
use crate::gate::{
    ConfirmationGate, ConfirmationNotifier, ConfirmationOutcome, ConfirmationPrompt, Decision,
    LogNotifier, PendingConfirmation,
};

/// Executor name recorded when dispatch never reached an executor.
const NO_EXECUTOR: &str = "none";

/// Terminal result of one request.
#[derive(Debug, Clone)]
pub enum Completion {
    /// Policy or the confirmation step said no; nothing ran.
    Denied {
        verdict: PolicyVerdict,
        reason: String,
        entry: JournalEntry,
    },
    /// The action ran; `outcome.success` says how it went.
    Executed {
        outcome: ExecutionOutcome,
        entry: JournalEntry,
    },
}

impl Completion {
    pub fn entry(&self) -> &JournalEntry {
        match self {
            Completion::Denied { entry, .. } | Completion::Executed { entry, .. } => entry,
        }
    }

    pub fn disposition(&self) -> Disposition {
        self.entry().disposition
    }

    /// Whether the action ran and succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Completion::Executed { outcome, .. } if outcome.success)
    }
}

/// What `submit` returns.
#[derive(Debug)]
pub enum Submission {
    Finished(Completion),
    /// The action needs a human decision; hand `handle()` to the confirmation
    /// channel and call `finish()`.
    AwaitingConfirmation(PendingAction),
}

struct Inner {
    engine: PolicyEngine,
    gate: ConfirmationGate,
    dispatcher: Dispatcher,
    journal: Arc<Journal>,
    /// Requests submitted but not yet journaled.
    in_flight: Mutex<HashSet<Uuid>>,
}

/// The action-authorization pipeline. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ActionPipeline {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ActionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionPipeline")
            .field("journal", &self.inner.journal.path())
            .field("rule_set_version", &self.inner.engine.rule_set().version)
            .finish_non_exhaustive()
    }
}

impl ActionPipeline {
    pub fn new(
        engine: PolicyEngine,
        gate: ConfirmationGate,
        dispatcher: Dispatcher,
        journal: Arc<Journal>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                gate,
                dispatcher,
                journal,
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Build from configuration, logging prompts through `tracing`.
    pub fn from_config(config: &NeuraConfig) -> Result<Self, PipelineError> {
        Self::from_config_with_notifier(config, Arc::new(LogNotifier))
    }

    /// Build from configuration with a custom confirmation notifier.
    pub fn from_config_with_notifier(
        config: &NeuraConfig,
        notifier: Arc<dyn ConfirmationNotifier>,
    ) -> Result<Self, PipelineError> {
        let engine = PolicyEngine::new(config.load_rules()?)?;
        let journal = Journal::open(config.journal_file())?.with_fsync(config.journal.fsync);
        let registry = config.executor_registry(&OsType::current())?;
        let dispatcher = Dispatcher::new(registry, config.dispatch_config());
        let gate = ConfirmationGate::new(config.confirmation_timeout()).with_notifier(notifier);

        tracing::info!(
            journal = %journal.path().display(),
            rule_set = %engine.rule_set().name,
            rule_set_version = engine.rule_set().version,
            dry_run = config.dispatch.dry_run,
            "action pipeline ready"
        );
        Ok(Self::new(engine, gate, dispatcher, Arc::new(journal)))
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.inner.engine
    }

    pub fn journal(&self) -> &Arc<Journal> {
        &self.inner.journal
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Prompts waiting for an answer.
    pub fn pending_confirmations(&self) -> Vec<ConfirmationPrompt> {
        self.inner.gate.pending()
    }

    /// Evaluate a request and either finish it or hand back a pending
    /// confirmation.
    ///
    /// Policy denials are `Ok(Submission::Finished(Completion::Denied))`;
    /// only infrastructure faults are `Err`.
    pub async fn submit(&self, request: ActionRequest) -> Result<Submission, PipelineError> {
        if self.inner.journal.is_poisoned() {
            return Err(PipelineError::JournalUnavailable);
        }
        self.reserve(request.request_id())?;

        let verdict = self.inner.engine.evaluate(&request);
        tracing::info!(
            request_id = %request.request_id(),
            action = %request.action(),
            risk = %verdict.risk_level,
            allowed = verdict.allowed,
            requires_confirmation = verdict.requires_confirmation,
            "policy evaluated"
        );
        tracing::debug!(
            request_id = %request.request_id(),
            payload = %request.payload_preview(),
            "request payload"
        );

        if !verdict.allowed {
            tracing::warn!(
                request_id = %request.request_id(),
                reason = %verdict.reason,
                "action denied by policy"
            );
            let reason = verdict.reason.clone();
            let entry = self.record(NewEntry::denied(request, verdict.clone())).await?;
            return Ok(Submission::Finished(Completion::Denied {
                verdict,
                reason,
                entry,
            }));
        }

        if verdict.requires_confirmation {
            let pending = match self.inner.gate.open(&request, &verdict, None) {
                Ok(pending) => pending,
                Err(e) => {
                    self.release(request.request_id());
                    return Err(e.into());
                }
            };
            return Ok(Submission::AwaitingConfirmation(PendingAction {
                pipeline: self.clone(),
                handle: pending.handle(),
                request,
                verdict,
                confirmation: Some(pending),
                handed_off: false,
            }));
        }

        let completion = self.execute(&request, &verdict, None).await?;
        Ok(Submission::Finished(completion))
    }

    /// Submit and, if needed, wait for the confirmation to be answered
    /// through `confirm()`.
    pub async fn run(&self, request: ActionRequest) -> Result<Completion, PipelineError> {
        match self.submit(request).await? {
            Submission::Finished(completion) => Ok(completion),
            Submission::AwaitingConfirmation(pending) => pending.finish().await,
        }
    }

    /// Answer a pending confirmation.
    pub fn confirm(&self, handle: Uuid, decision: Decision) -> Result<(), PipelineError> {
        Ok(self.inner.gate.resolve(handle, decision)?)
    }

    /// Dispatch a request that policy allowed (and, if required, a human
    /// approved), then journal the outcome.
    async fn execute(
        &self,
        request: &ActionRequest,
        verdict: &PolicyVerdict,
        confirmation: Option<ConfirmationRecord>,
    ) -> Result<Completion, PipelineError> {
        let clearance = match Clearance::grant(request, verdict, confirmation.as_ref()) {
            Ok(clearance) => clearance,
            Err(e) => {
                self.record(NewEntry::denied(request.clone(), verdict.clone()))
                    .await?;
                return Err(e.into());
            }
        };

        if self.inner.journal.is_poisoned() {
            self.release(request.request_id());
            return Err(PipelineError::JournalUnavailable);
        }

        let mut guard = CancelGuard {
            pipeline: self,
            request,
            verdict,
            confirmation: confirmation.clone(),
            armed: true,
        };
        let dispatched = self.inner.dispatcher.dispatch(request, clearance).await;
        guard.armed = false;

        match dispatched {
            Ok(outcome) => {
                let entry = self
                    .record(NewEntry::executed(
                        request.clone(),
                        verdict.clone(),
                        confirmation,
                        outcome.clone(),
                    ))
                    .await?;
                Ok(Completion::Executed { outcome, entry })
            }
            Err(e) => {
                tracing::error!(
                    request_id = %request.request_id(),
                    error = %e,
                    "dispatcher fault"
                );
                let outcome =
                    ExecutionOutcome::failed(NO_EXECUTOR, format!("dispatch fault: {}", e), 0);
                self.record(NewEntry::executed(
                    request.clone(),
                    verdict.clone(),
                    confirmation,
                    outcome,
                ))
                .await?;
                Err(e.into())
            }
        }
    }

    /// Entry and denial reason for a request whose confirmation did not
    /// approve it.
    fn unconfirmed(
        request: &ActionRequest,
        verdict: &PolicyVerdict,
        record: ConfirmationRecord,
    ) -> (NewEntry, String) {
        let reason = match record.decision {
            ConfirmationDecision::TimedOut => "confirmation timed out".to_string(),
            _ => format!(
                "confirmation rejected: {}",
                record.reason.as_deref().unwrap_or("rejected by user")
            ),
        };
        tracing::info!(
            request_id = %request.request_id(),
            reason = %reason,
            "action not confirmed"
        );
        let entry = NewEntry::unconfirmed(request.clone(), verdict.clone(), record);
        (entry, reason)
    }

    /// Append on the blocking pool and release the request's reservation.
    ///
    /// The append finishes even if the caller is dropped mid-await, so the
    /// request still gets its entry.
    async fn record(&self, entry: NewEntry) -> Result<JournalEntry, PipelineError> {
        let request_id = entry.request.request_id();
        let pipeline = self.clone();
        match tokio::task::spawn_blocking(move || pipeline.record_blocking(entry)).await {
            Ok(result) => result,
            Err(e) => {
                self.release(request_id);
                tracing::error!(request_id = %request_id, error = %e, "journal task failed");
                Err(PipelineError::JournalWriteFailed(AuditError::WriteFailed(
                    std::io::Error::other(e.to_string()),
                )))
            }
        }
    }

    /// Append on the calling thread and release the request's reservation.
    /// Blocks for the write and its fsync.
    fn record_blocking(&self, entry: NewEntry) -> Result<JournalEntry, PipelineError> {
        let request_id = entry.request.request_id();
        let result = self.inner.journal.append(entry);
        self.release(request_id);
        result.map_err(|e| {
            tracing::error!(request_id = %request_id, error = %e, "journal write failed");
            PipelineError::JournalWriteFailed(e)
        })
    }

    fn reserve(&self, request_id: Uuid) -> Result<(), PipelineError> {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .map_err(|_| PipelineError::Audit(AuditError::LockPoisoned))?;
        if in_flight.contains(&request_id) || self.inner.journal.contains_request(request_id)? {
            return Err(PipelineError::DuplicateRequest(request_id));
        }
        in_flight.insert(request_id);
        Ok(())
    }

    fn release(&self, request_id: Uuid) {
        if let Ok(mut in_flight) = self.inner.in_flight.lock() {
            in_flight.remove(&request_id);
        }
    }
}

/// Journals a failed outcome if the dispatch future is dropped before the
/// executor returns.
struct CancelGuard<'a> {
    pipeline: &'a ActionPipeline,
    request: &'a ActionRequest,
    verdict: &'a PolicyVerdict,
    confirmation: Option<ConfirmationRecord>,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!(
            request_id = %self.request.request_id(),
            "dispatch cancelled before the executor returned"
        );
        let outcome = ExecutionOutcome::failed(NO_EXECUTOR, "cancelled before completion", 0);
        let entry = NewEntry::executed(
            self.request.clone(),
            self.verdict.clone(),
            self.confirmation.take(),
            outcome,
        );
        if let Err(e) = self.pipeline.record_blocking(entry) {
            tracing::error!(error = %e, "could not journal cancelled dispatch");
        }
    }
}

/// A request waiting for its confirmation.
///
/// Dropping it unfinished journals the request as rejected
/// ("confirmation abandoned").
pub struct PendingAction {
    pipeline: ActionPipeline,
    handle: Uuid,
    request: ActionRequest,
    verdict: PolicyVerdict,
    confirmation: Option<PendingConfirmation>,
    /// Set once `finish` has taken over journaling.
    handed_off: bool,
}

impl std::fmt::Debug for PendingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAction")
            .field("handle", &self.handle)
            .field("request_id", &self.request.request_id())
            .field("action", self.request.action())
            .finish_non_exhaustive()
    }
}

impl PendingAction {
    /// Handle for the confirmation channel.
    pub fn handle(&self) -> Uuid {
        self.handle
    }

    pub fn request(&self) -> &ActionRequest {
        &self.request
    }

    pub fn verdict(&self) -> &PolicyVerdict {
        &self.verdict
    }

    pub fn prompt(&self) -> Option<&ConfirmationPrompt> {
        self.confirmation.as_ref().map(|c| c.prompt())
    }

    /// Wait for the decision, then dispatch or journal the refusal.
    pub async fn finish(mut self) -> Result<Completion, PipelineError> {
        let outcome = match self.confirmation.take() {
            Some(pending) => pending.wait().await,
            None => ConfirmationOutcome::Rejected {
                reason: "confirmation abandoned".to_string(),
            },
        };
        self.handed_off = true;

        let (decision, reason) = match outcome {
            ConfirmationOutcome::Approved => (ConfirmationDecision::Approved, None),
            ConfirmationOutcome::Rejected { reason } => {
                (ConfirmationDecision::Rejected, Some(reason))
            }
            ConfirmationOutcome::TimedOut => (ConfirmationDecision::TimedOut, None),
        };
        let record = ConfirmationRecord {
            handle: self.handle,
            decision,
            reason,
            decided_at: Utc::now(),
        };

        if decision == ConfirmationDecision::Approved {
            self.pipeline
                .execute(&self.request, &self.verdict, Some(record))
                .await
        } else {
            let (entry, reason) = ActionPipeline::unconfirmed(&self.request, &self.verdict, record);
            let entry = self.pipeline.record(entry).await?;
            Ok(Completion::Denied {
                verdict: self.verdict.clone(),
                reason,
                entry,
            })
        }
    }
}

impl Drop for PendingAction {
    fn drop(&mut self) {
        if self.handed_off {
            return;
        }
        // Withdraw the prompt before journaling.
        self.confirmation.take();
        let record = ConfirmationRecord {
            handle: self.handle,
            decision: ConfirmationDecision::Rejected,
            reason: Some("confirmation abandoned".to_string()),
            decided_at: Utc::now(),
        };
        let (entry, _) = ActionPipeline::unconfirmed(&self.request, &self.verdict, record);
        if let Err(e) = self.pipeline.record_blocking(entry) {
            tracing::error!(
                request_id = %self.request.request_id(),
                error = %e,
                "could not journal abandoned confirmation"
            );
        }
    }
}
