// dispatch.rs — Runs cleared actions on their executor.
//
// Dispatch is the only path from an approved request to a side effect. It
// needs a `Clearance`, resolves exactly one executor from the registry,
// waits for a concurrency permit, and bounds the run with a per-action
// timeout. Executor failures and timeouts become unsuccessful outcomes; no
// action is retried.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use neura_audit::ExecutionOutcome;
use neura_policy::{ActionKind, ActionRequest};
use tokio::sync::Semaphore;

use crate::clearance::Clearance;
use crate::error::DispatchError;
use crate::registry::ExecutorRegistry;

/// Timeouts and concurrency for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub default_timeout: Duration,
    /// Per-kind overrides of `default_timeout`.
    pub timeouts: BTreeMap<ActionKind, Duration>,
    /// Actions running at once, at most.
    pub max_concurrent: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            timeouts: BTreeMap::new(),
            max_concurrent: 4,
        }
    }
}

impl DispatchConfig {
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_timeout(mut self, action: impl Into<ActionKind>, timeout: Duration) -> Self {
        self.timeouts.insert(action.into(), timeout);
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn timeout_for(&self, action: &ActionKind) -> Duration {
        self.timeouts
            .get(action)
            .copied()
            .unwrap_or(self.default_timeout)
    }
}

/// Routes cleared requests to executors.
#[derive(Debug)]
pub struct Dispatcher {
    registry: ExecutorRegistry,
    config: DispatchConfig,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(registry: ExecutorRegistry, config: DispatchConfig) -> Self {
        // A zero limit would deadlock every dispatch.
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            registry,
            config,
            permits,
        }
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Execute `request` under `clearance`.
    ///
    /// Returns `Err` only for dispatcher faults (no route, executor missing,
    /// clearance for another request). A failing or slow action is
    /// `Ok(outcome)` with `success = false`.
    pub async fn dispatch(
        &self,
        request: &ActionRequest,
        clearance: Clearance,
    ) -> Result<ExecutionOutcome, DispatchError> {
        if clearance.request_id() != request.request_id() {
            return Err(DispatchError::ClearanceMismatch {
                granted: clearance.request_id(),
                requested: request.request_id(),
            });
        }

        let executor = self.registry.resolve(request.action())?;
        let executor_name = executor.kind().to_string();
        let timeout = self.config.timeout_for(request.action());

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| DispatchError::Closed)?;

        tracing::info!(
            request_id = %request.request_id(),
            action = %request.action(),
            executor = %executor_name,
            timeout_ms = timeout.as_millis() as u64,
            "dispatching action"
        );

        let started = Instant::now();
        let result = tokio::time::timeout(timeout, executor.execute(request)).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(Ok(output)) => ExecutionOutcome::succeeded(&executor_name, output, duration_ms),
            Ok(Err(e)) => {
                tracing::warn!(
                    request_id = %request.request_id(),
                    executor = %executor_name,
                    error = %e,
                    "action failed"
                );
                ExecutionOutcome::failed(&executor_name, e.to_string(), duration_ms)
            }
            Err(_elapsed) => {
                tracing::warn!(
                    request_id = %request.request_id(),
                    executor = %executor_name,
                    timeout_ms = timeout.as_millis() as u64,
                    "action timed out; executor cancelled"
                );
                ExecutionOutcome::failed(
                    &executor_name,
                    format!("timed out after {}ms", timeout.as_millis()),
                    duration_ms,
                )
            }
        };

        tracing::info!(
            request_id = %request.request_id(),
            success = outcome.success,
            duration_ms,
            "action finished"
        );
        Ok(outcome)
    }

    /// Free permits right now.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{DryRunExecutor, ProcessExecutor};
    use crate::kind::ExecutorKind;
    use neura_policy::PolicyEngine;

    fn cleared(request: &ActionRequest) -> Clearance {
        let verdict = PolicyEngine::with_default_rules().evaluate(request);
        Clearance::grant(request, &verdict, None).unwrap()
    }

    fn open_notes() -> ActionRequest {
        ActionRequest::new(ActionKind::OpenApp)
            .with_target("Notes")
            .with_os("mac")
    }

    #[tokio::test]
    async fn dry_run_dispatch_succeeds() {
        let dry = DryRunExecutor::new();
        let dispatcher = Dispatcher::new(
            ExecutorRegistry::dry_run(dry.clone()),
            DispatchConfig::default(),
        );
        let request = open_notes();
        let outcome = dispatcher.dispatch(&request, cleared(&request)).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.executor, "dry_run");
        assert_eq!(dry.history().len(), 1);
    }

    #[tokio::test]
    async fn clearance_is_bound_to_its_request() {
        let dispatcher = Dispatcher::new(
            ExecutorRegistry::dry_run(DryRunExecutor::new()),
            DispatchConfig::default(),
        );
        let request = open_notes();
        let other = open_notes();
        let err = dispatcher
            .dispatch(&other, cleared(&request))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::ClearanceMismatch { .. }));
    }

    #[tokio::test]
    async fn missing_route_is_a_dispatch_error() {
        let dispatcher = Dispatcher::new(ExecutorRegistry::new(), DispatchConfig::default());
        let request = open_notes();
        let err = dispatcher
            .dispatch(&request, cleared(&request))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoRoute { .. }));
    }

    #[tokio::test]
    async fn timeout_yields_failed_outcome() {
        let dry = DryRunExecutor::new().with_delay(Duration::from_secs(5));
        let dispatcher = Dispatcher::new(
            ExecutorRegistry::dry_run(dry.clone()),
            DispatchConfig::default().with_timeout(ActionKind::OpenApp, Duration::from_millis(50)),
        );
        let request = open_notes();
        let started = Instant::now();
        let outcome = dispatcher.dispatch(&request, cleared(&request)).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("timed out after 50ms"));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(dry.history().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timed_out_process_is_killed() {
        let process = ProcessExecutor::new()
            .with_command(ActionKind::OpenApp, ["sleep", "5"])
            .unwrap();
        let registry = ExecutorRegistry::new()
            .with_executor(process)
            .with_routes_for(ExecutorKind::Process);
        let dispatcher = Dispatcher::new(
            registry,
            DispatchConfig::default().with_default_timeout(Duration::from_millis(100)),
        );
        let request = open_notes();
        let started = Instant::now();
        let outcome = dispatcher.dispatch(&request, cleared(&request)).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.executor, "process");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_process_is_reported_not_raised() {
        let process = ProcessExecutor::new()
            .with_command(ActionKind::OpenApp, ["false"])
            .unwrap();
        let registry = ExecutorRegistry::new()
            .with_executor(process)
            .with_routes_for(ExecutorKind::Process);
        let dispatcher = Dispatcher::new(registry, DispatchConfig::default());
        let request = open_notes();
        let outcome = dispatcher.dispatch(&request, cleared(&request)).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("'false' exited with status 1"));
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let dry = DryRunExecutor::new().with_delay(Duration::from_millis(100));
        let dispatcher = Arc::new(Dispatcher::new(
            ExecutorRegistry::dry_run(dry.clone()),
            DispatchConfig::default().with_max_concurrent(1),
        ));

        let started = Instant::now();
        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    let request = open_notes();
                    let clearance = cleared(&request);
                    dispatcher.dispatch(&request, clearance).await
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap().success);
        }

        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(dispatcher.available_permits(), 1);
        assert_eq!(dry.history().len(), 3);
    }
}
