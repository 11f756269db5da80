// gate.rs — Confirmation gate for actions that need a human "yes".
//
// `open()` registers a pending prompt and hands back a PendingConfirmation.
// The requester awaits `wait()`; some other channel (terminal, chat, UI)
// answers through `resolve(handle, decision)`. Only the waiting task is
// suspended. Unanswered prompts time out, and a prompt whose waiter went
// away is removed from the pending set.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use neura_policy::{ActionKind, ActionRequest, PolicyVerdict, RiskLevel};

use crate::error::GateError;

/// Answer from the confirmation channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject { reason: Option<String> },
}

impl Decision {
    pub fn reject(reason: impl Into<String>) -> Self {
        Decision::Reject {
            reason: Some(reason.into()),
        }
    }
}

/// How a pending confirmation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Approved,
    Rejected { reason: String },
    TimedOut,
}

/// What the human is asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationPrompt {
    pub handle: Uuid,
    pub request_id: Uuid,
    pub action: ActionKind,
    /// The question, e.g. "Send email to bob@example.com?".
    pub message: String,
    pub risk_level: RiskLevel,
    /// Critical actions should be confirmed twice.
    pub double_check: bool,
    /// Redacted payload preview, empty when there is no payload.
    pub payload_preview: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ConfirmationPrompt {
    fn new(request: &ActionRequest, verdict: &PolicyVerdict, expiry: Duration) -> Self {
        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(expiry)
            .ok()
            .and_then(|d| created_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            handle: Uuid::new_v4(),
            request_id: request.request_id(),
            action: request.action().clone(),
            message: prompt_message(request),
            risk_level: verdict.risk_level,
            double_check: verdict.risk_level == RiskLevel::Critical,
            payload_preview: request.payload_preview(),
            created_at,
            expires_at,
        }
    }
}

/// The question to ask for a request.
pub fn prompt_message(request: &ActionRequest) -> String {
    let resource = request.resource().unwrap_or("this");
    match request.action() {
        ActionKind::SendEmail => format!("Send email to {}?", resource),
        ActionKind::DeleteFile => format!("Delete {}? This cannot be undone.", resource),
        ActionKind::DeleteAll => "Delete everything? This cannot be undone.".to_string(),
        ActionKind::FormatDisk => format!("Format {}? All data will be lost.", resource),
        ActionKind::OpenUrl => format!("Open {} in browser?", resource),
        ActionKind::CreateFolder => format!("Create folder '{}'?", resource),
        ActionKind::CreateNote => format!(
            "Create note '{}'?",
            request.resource().unwrap_or("untitled")
        ),
        ActionKind::SetVolume => format!(
            "Set volume to {}%?",
            request.payload().map(str::trim).unwrap_or("?")
        ),
        ActionKind::TypeText => format!("Type \"{}\"?", request.payload_preview()),
        other => format!("Proceed with {}?", other.as_str().replace('_', " ")),
    }
}

/// Told about each new prompt so it can reach a human.
pub trait ConfirmationNotifier: Send + Sync {
    fn notify(&self, prompt: &ConfirmationPrompt);

    /// Called once the prompt is answered, times out or is abandoned.
    fn settled(&self, _handle: Uuid, _outcome: &ConfirmationOutcome) {}
}

/// Logs prompts through `tracing`; the default notifier.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl ConfirmationNotifier for LogNotifier {
    fn notify(&self, prompt: &ConfirmationPrompt) {
        tracing::info!(
            handle = %prompt.handle,
            request_id = %prompt.request_id,
            action = %prompt.action,
            risk = %prompt.risk_level,
            expires_at = %prompt.expires_at,
            "confirmation required: {}",
            prompt.message
        );
    }

    fn settled(&self, handle: Uuid, outcome: &ConfirmationOutcome) {
        tracing::info!(handle = %handle, outcome = ?outcome, "confirmation settled");
    }
}

struct Slot {
    prompt: ConfirmationPrompt,
    sender: oneshot::Sender<Decision>,
}

type Slots = Arc<Mutex<HashMap<Uuid, Slot>>>;

/// Registry of prompts awaiting an answer.
pub struct ConfirmationGate {
    slots: Slots,
    notifier: Arc<dyn ConfirmationNotifier>,
    default_expiry: Duration,
}

impl ConfirmationGate {
    pub fn new(default_expiry: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            notifier: Arc::new(LogNotifier),
            default_expiry,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ConfirmationNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn default_expiry(&self) -> Duration {
        self.default_expiry
    }

    /// Register a prompt for `request`. `expiry` overrides the default wait.
    ///
    /// Only verdicts that allow the action and ask for confirmation can be
    /// prompted; anything else is refused with `GateError::NotConfirmable`.
    pub fn open(
        &self,
        request: &ActionRequest,
        verdict: &PolicyVerdict,
        expiry: Option<Duration>,
    ) -> Result<PendingConfirmation, GateError> {
        if !(verdict.allowed && verdict.requires_confirmation) {
            return Err(GateError::NotConfirmable(request.request_id()));
        }
        let expiry = expiry.unwrap_or(self.default_expiry);
        let prompt = ConfirmationPrompt::new(request, verdict, expiry);
        let (sender, receiver) = oneshot::channel();

        self.slots
            .lock()
            .map_err(|_| GateError::LockPoisoned)?
            .insert(
                prompt.handle,
                Slot {
                    prompt: prompt.clone(),
                    sender,
                },
            );
        self.notifier.notify(&prompt);

        Ok(PendingConfirmation {
            prompt,
            receiver: Some(receiver),
            expiry,
            slots: Arc::clone(&self.slots),
            notifier: Arc::clone(&self.notifier),
        })
    }

    /// Deliver a decision for `handle`.
    pub fn resolve(&self, handle: Uuid, decision: Decision) -> Result<(), GateError> {
        let slot = {
            let mut slots = self.slots.lock().map_err(|_| GateError::LockPoisoned)?;
            match slots.get(&handle) {
                None => return Err(GateError::UnknownHandle(handle)),
                // Left in place: the waiter's own timeout settles it.
                Some(slot) if Utc::now() > slot.prompt.expires_at => {
                    return Err(GateError::Expired(handle));
                }
                Some(_) => {}
            }
            slots.remove(&handle).ok_or(GateError::UnknownHandle(handle))?
        };

        // A closed receiver means the waiter already timed out or left.
        slot.sender
            .send(decision)
            .map_err(|_| GateError::Expired(handle))
    }

    /// Prompts still awaiting an answer, oldest first.
    pub fn pending(&self) -> Vec<ConfirmationPrompt> {
        let mut prompts: Vec<ConfirmationPrompt> = match self.slots.lock() {
            Ok(slots) => slots.values().map(|s| s.prompt.clone()).collect(),
            Err(_) => Vec::new(),
        };
        prompts.sort_by_key(|p| p.created_at);
        prompts
    }
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

/// The requester's side of an open prompt.
///
/// Dropping it without waiting withdraws the prompt.
pub struct PendingConfirmation {
    prompt: ConfirmationPrompt,
    receiver: Option<oneshot::Receiver<Decision>>,
    expiry: Duration,
    slots: Slots,
    notifier: Arc<dyn ConfirmationNotifier>,
}

impl std::fmt::Debug for PendingConfirmation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingConfirmation")
            .field("handle", &self.prompt.handle)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

impl PendingConfirmation {
    pub fn handle(&self) -> Uuid {
        self.prompt.handle
    }

    pub fn prompt(&self) -> &ConfirmationPrompt {
        &self.prompt
    }

    /// Suspend until the prompt is answered or the wait elapses.
    pub async fn wait(mut self) -> ConfirmationOutcome {
        let outcome = match self.receiver.take() {
            None => ConfirmationOutcome::Rejected {
                reason: "confirmation abandoned".to_string(),
            },
            Some(receiver) => match tokio::time::timeout(self.expiry, receiver).await {
                Ok(Ok(Decision::Approve)) => ConfirmationOutcome::Approved,
                Ok(Ok(Decision::Reject { reason })) => ConfirmationOutcome::Rejected {
                    reason: reason.unwrap_or_else(|| "rejected by user".to_string()),
                },
                Ok(Err(_)) => ConfirmationOutcome::Rejected {
                    reason: "confirmation abandoned".to_string(),
                },
                Err(_elapsed) => ConfirmationOutcome::TimedOut,
            },
        };
        self.withdraw();
        self.notifier.settled(self.prompt.handle, &outcome);
        outcome
    }

    fn withdraw(&self) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(&self.prompt.handle);
        }
    }
}

impl Drop for PendingConfirmation {
    fn drop(&mut self) {
        self.withdraw();
    }
}
