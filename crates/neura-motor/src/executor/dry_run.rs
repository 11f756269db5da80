// executor/dry_run.rs — Records what would run, touches nothing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use neura_policy::{ActionKind, ActionRequest};
use uuid::Uuid;

use crate::error::ExecutorError;

/// One action the dry-run executor accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunRecord {
    pub request_id: Uuid,
    pub action: ActionKind,
    pub summary: String,
}

/// Succeeds without side effects. Clones share one history, so a test can
/// keep a handle and inspect what the dispatcher sent.
#[derive(Debug, Clone, Default)]
pub struct DryRunExecutor {
    history: Arc<Mutex<Vec<DryRunRecord>>>,
    delay: Option<Duration>,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an action that takes `delay` to complete.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn execute(&self, request: &ActionRequest) -> Result<String, ExecutorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let summary = request.summary();
        tracing::info!(
            request_id = %request.request_id(),
            action = %request.action(),
            "dry run: {}",
            summary
        );
        if let Ok(mut history) = self.history.lock() {
            history.push(DryRunRecord {
                request_id: request.request_id(),
                action: request.action().clone(),
                summary: summary.clone(),
            });
        }
        Ok(format!("[dry run] would {}", summary))
    }

    /// Everything executed so far, oldest first.
    pub fn history(&self) -> Vec<DryRunRecord> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }
}
