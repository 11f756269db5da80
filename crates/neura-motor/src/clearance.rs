// clearance.rs — Proof that an action may be dispatched.
//
// The dispatcher only accepts a `Clearance`, and the only way to obtain one
// is `Clearance::grant`, which checks the policy verdict and, when the
// verdict asks for it, an approved confirmation. Dispatching an action that
// was denied or not confirmed therefore does not type-check.

use std::time::Instant;

use neura_audit::{ConfirmationDecision, ConfirmationRecord};
use neura_policy::{ActionKind, ActionRequest, PolicyVerdict};
use uuid::Uuid;

use crate::error::ClearanceError;

/// A one-shot permission to dispatch a specific request.
///
/// Not `Clone`: each clearance is consumed by exactly one dispatch.
#[derive(Debug)]
pub struct Clearance {
    request_id: Uuid,
    action: ActionKind,
    confirmation: Option<Uuid>,
    granted_at: Instant,
}

impl Clearance {
    /// Grant clearance for `request` given its verdict and the confirmation
    /// outcome, if one was needed.
    pub fn grant(
        request: &ActionRequest,
        verdict: &PolicyVerdict,
        confirmation: Option<&ConfirmationRecord>,
    ) -> Result<Self, ClearanceError> {
        if !verdict.allowed {
            return Err(ClearanceError::NotAllowed(verdict.reason.clone()));
        }

        let confirmation = match (verdict.requires_confirmation, confirmation) {
            (true, None) => return Err(ClearanceError::ConfirmationMissing),
            (_, Some(record)) if record.decision != ConfirmationDecision::Approved => {
                return Err(ClearanceError::ConfirmationNotApproved(record.decision));
            }
            (_, Some(record)) => Some(record.handle),
            (false, None) => None,
        };

        Ok(Self {
            request_id: request.request_id(),
            action: request.action().clone(),
            confirmation,
            granted_at: Instant::now(),
        })
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn action(&self) -> &ActionKind {
        &self.action
    }

    /// Handle of the approving confirmation, if one was required.
    pub fn confirmation(&self) -> Option<Uuid> {
        self.confirmation
    }

    pub fn granted_at(&self) -> Instant {
        self.granted_at
    }
}
